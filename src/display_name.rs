//! Human labels for channels, including direct channels whose raw name only
//! encodes the two participant ids.

use cache_store::BoundedStore;
use chat_client::{Channel, RemoteClient, User};

/// Joins the two participant ids in a direct channel's raw name.
pub const DIRECT_CHANNEL_SEPARATOR: &str = "__";

/// Label shown when the other participant cannot be identified.
pub const UNKNOWN_USER_LABEL: &str = "Unknown user";

/// Picks the best label for a user: nickname, full name, first name, username.
///
/// Name fields are trimmed, so a whitespace-only nickname counts as unset.
#[must_use]
pub fn user_label(user: &User) -> String {
    let nickname = non_empty(user.nickname.as_deref());
    let first_name = non_empty(user.first_name.as_deref());
    let last_name = non_empty(user.last_name.as_deref());

    match (nickname, first_name, last_name) {
        (Some(nickname), _, _) => nickname.to_string(),
        (None, Some(first), Some(last)) => format!("{first} {last}"),
        (None, Some(first), None) => first.to_string(),
        _ => user.username.clone(),
    }
}

/// Returns the participant of a direct channel that is not `own_user_id`.
///
/// A self-conversation (`me__me`) yields the caller's own id. Names that do
/// not hold exactly two ids, or do not include `own_user_id`, yield `None`.
#[must_use]
pub fn direct_counterpart<'a>(raw_name: &'a str, own_user_id: &str) -> Option<&'a str> {
    let (first, second) = raw_name.split_once(DIRECT_CHANNEL_SEPARATOR)?;
    if first.is_empty() || second.is_empty() || second.contains(DIRECT_CHANNEL_SEPARATOR) {
        return None;
    }

    if first == own_user_id {
        Some(second)
    } else if second == own_user_id {
        Some(first)
    } else {
        None
    }
}

pub struct DisplayNameResolver<'a> {
    client: &'a dyn RemoteClient,
    users: &'a BoundedStore<User>,
    own_user_id: &'a str,
}

impl<'a> DisplayNameResolver<'a> {
    #[must_use]
    pub fn new(
        client: &'a dyn RemoteClient,
        users: &'a BoundedStore<User>,
        own_user_id: &'a str,
    ) -> Self {
        Self {
            client,
            users,
            own_user_id,
        }
    }

    /// Label for `channel`. Never fails: direct channels that cannot be
    /// resolved get [`UNKNOWN_USER_LABEL`].
    #[must_use]
    pub fn resolve(&self, channel: &Channel) -> String {
        if !channel.is_direct() {
            return channel
                .display_name
                .clone()
                .unwrap_or_else(|| channel.name.clone());
        }

        let Some(counterpart) = direct_counterpart(&channel.name, self.own_user_id) else {
            tracing::warn!(
                channel_id = %channel.id,
                name = %channel.name,
                "direct channel name does not encode this user"
            );
            return UNKNOWN_USER_LABEL.to_string();
        };

        self.lookup_user(counterpart)
            .map(|user| user_label(&user))
            .unwrap_or_else(|| UNKNOWN_USER_LABEL.to_string())
    }

    /// Fills in `display_name` for every channel.
    pub fn resolve_all(&self, channels: &mut [Channel]) {
        for channel in channels {
            let label = self.resolve(channel);
            channel.display_name = Some(label);
        }
    }

    fn lookup_user(&self, user_id: &str) -> Option<User> {
        if let Some(user) = self.users.get(user_id) {
            return Some(user);
        }

        match self.client.fetch_user(user_id) {
            Ok(user) => {
                if let Err(error) = self.users.put(user_id, user.clone()) {
                    tracing::warn!(user_id, %error, "failed to cache fetched user");
                }
                Some(user)
            }
            Err(error) if error.is_not_found() => {
                tracing::debug!(user_id, "direct channel counterpart is unknown to the server");
                None
            }
            Err(error) => {
                tracing::warn!(user_id, %error, "failed to fetch direct channel counterpart");
                None
            }
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
