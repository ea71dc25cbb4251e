//! Mattermost-backed implementation of the blocking `chat_client` contract.
//!
//! This adapter drives the async `mattermost_api` transport on a private
//! current-thread runtime and translates wire payloads into the shared entity
//! types. Pagination cursors are normalized so that a page reports a
//! continuation exactly when the server has more posts in that direction.

use std::sync::Arc;
use std::time::Duration;

use chat_client::{
    Channel, ChannelType, Post, PostCursor, PostPage, RemoteClient, RemoteError, Team, User,
};
use mattermost_api::payload::DEFAULT_PER_PAGE;
use mattermost_api::{
    CancellationSignal, ChannelPayload, LoginRequest, MattermostApiClient, MattermostApiError, MattermostConfig,
    PostListPayload, PostPayload, PostsQuery, TeamPayload, UserPayload,
};
use thiserror::Error;
use tokio::runtime::Runtime;

/// How the adapter authenticates against the server.
#[derive(Debug, Clone)]
pub enum Credentials {
    /// Personal access token or a session token from an earlier login.
    Token(String),
    /// Password login, optionally with an MFA code.
    Password(LoginRequest),
}

/// Runtime configuration for the Mattermost adapter.
#[derive(Debug, Clone)]
pub struct MattermostRemoteConfig {
    pub server_url: String,
    pub credentials: Credentials,
    pub per_page: u32,
    pub timeout: Option<Duration>,
    pub cancel: Option<CancellationSignal>,
}

impl MattermostRemoteConfig {
    #[must_use]
    pub fn new(server_url: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            server_url: server_url.into(),
            credentials,
            per_page: DEFAULT_PER_PAGE,
            timeout: None,
            cancel: None,
        }
    }

    #[must_use]
    pub fn with_per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Flag observed by the login request and every later call.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationSignal) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn into_api_config(self) -> MattermostConfig {
        let mut config = MattermostConfig::new(self.server_url);
        if let Credentials::Token(token) = self.credentials {
            config = config.with_token(token);
        }
        if let Some(timeout) = self.timeout {
            config = config.with_timeout(timeout);
        }
        config
    }
}

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("failed to initialize tokio runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("invalid Mattermost configuration: {0}")]
    Config(#[source] MattermostApiError),

    #[error("login failed: {0}")]
    Login(#[source] MattermostApiError),
}

trait ApiTransport: Send + Sync {
    fn posts(
        &self,
        channel_id: &str,
        query: &PostsQuery,
        cancel: Option<&CancellationSignal>,
    ) -> Result<PostListPayload, MattermostApiError>;

    fn user(
        &self,
        user_id: &str,
        cancel: Option<&CancellationSignal>,
    ) -> Result<UserPayload, MattermostApiError>;

    fn teams(
        &self,
        user_id: &str,
        cancel: Option<&CancellationSignal>,
    ) -> Result<Vec<TeamPayload>, MattermostApiError>;

    fn channels(
        &self,
        user_id: &str,
        team_id: &str,
        cancel: Option<&CancellationSignal>,
    ) -> Result<Vec<ChannelPayload>, MattermostApiError>;
}

#[derive(Debug)]
struct DefaultTransport {
    client: MattermostApiClient,
    runtime: Runtime,
}

impl ApiTransport for DefaultTransport {
    fn posts(
        &self,
        channel_id: &str,
        query: &PostsQuery,
        cancel: Option<&CancellationSignal>,
    ) -> Result<PostListPayload, MattermostApiError> {
        self.runtime
            .block_on(self.client.get_posts_for_channel(channel_id, query, cancel))
    }

    fn user(
        &self,
        user_id: &str,
        cancel: Option<&CancellationSignal>,
    ) -> Result<UserPayload, MattermostApiError> {
        self.runtime.block_on(self.client.get_user(user_id, cancel))
    }

    fn teams(
        &self,
        user_id: &str,
        cancel: Option<&CancellationSignal>,
    ) -> Result<Vec<TeamPayload>, MattermostApiError> {
        self.runtime
            .block_on(self.client.get_user_teams(user_id, cancel))
    }

    fn channels(
        &self,
        user_id: &str,
        team_id: &str,
        cancel: Option<&CancellationSignal>,
    ) -> Result<Vec<ChannelPayload>, MattermostApiError> {
        self.runtime
            .block_on(self.client.get_channels_for_user(user_id, team_id, cancel))
    }
}

/// `RemoteClient` backed by the Mattermost REST API.
///
/// Requests observe the flag installed with [`MattermostRemote::with_cancel`]:
/// once it is raised, pending and later calls fail with
/// [`RemoteError::Cancelled`] instead of running to their timeout.
pub struct MattermostRemote {
    transport: Arc<dyn ApiTransport>,
    per_page: u32,
    token: String,
    cancel: Option<CancellationSignal>,
}

impl MattermostRemote {
    /// Builds the transport and, for password credentials, logs in.
    pub fn connect(config: MattermostRemoteConfig) -> Result<Self, ConnectError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(ConnectError::Runtime)?;
        let per_page = config.per_page;
        let credentials = config.credentials.clone();
        let cancel = config.cancel.clone();
        let client =
            MattermostApiClient::new(config.into_api_config()).map_err(ConnectError::Config)?;

        let (client, token) = match credentials {
            Credentials::Token(token) => (client, token),
            Credentials::Password(login) => {
                let session = runtime
                    .block_on(client.login(&login, cancel.as_ref()))
                    .map_err(ConnectError::Login)?;
                tracing::info!(user = %session.user.username, "logged in with password");
                (client.with_token(session.token.clone()), session.token)
            }
        };

        Ok(Self {
            transport: Arc::new(DefaultTransport { client, runtime }),
            per_page,
            token,
            cancel,
        })
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationSignal) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Bearer token in use; after a password login this is the new session token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    fn posts_query(&self, cursor: Option<&PostCursor>) -> PostsQuery {
        let query = PostsQuery::latest(self.per_page);
        match cursor {
            None => query,
            Some(PostCursor::Before(post_id)) => query.before(post_id.clone()),
            Some(PostCursor::After(post_id)) => query.after(post_id.clone()),
        }
    }

    #[cfg(test)]
    fn with_transport_for_tests(transport: Arc<dyn ApiTransport>, per_page: u32) -> Self {
        Self {
            transport,
            per_page,
            token: String::new(),
            cancel: None,
        }
    }
}

impl RemoteClient for MattermostRemote {
    fn fetch_posts(
        &self,
        channel_id: &str,
        cursor: Option<&PostCursor>,
    ) -> Result<PostPage, RemoteError> {
        let query = self.posts_query(cursor);
        let payload = self
            .transport
            .posts(channel_id, &query, self.cancel.as_ref())
            .map_err(|error| map_api_error("channel", channel_id, error))?;

        Ok(post_page_from_payload(
            channel_id,
            payload,
            cursor,
            query.per_page,
        ))
    }

    fn fetch_user(&self, user_id: &str) -> Result<User, RemoteError> {
        self.transport
            .user(user_id, self.cancel.as_ref())
            .map(user_from_payload)
            .map_err(|error| map_api_error("user", user_id, error))
    }

    fn fetch_teams(&self, user_id: &str) -> Result<Vec<Team>, RemoteError> {
        let teams = self
            .transport
            .teams(user_id, self.cancel.as_ref())
            .map_err(|error| map_api_error("user", user_id, error))?;
        Ok(teams
            .into_iter()
            .map(|team| Team {
                id: team.id,
                name: team.name,
                display_name: team.display_name,
            })
            .collect())
    }

    fn fetch_channels(&self, user_id: &str, team_id: &str) -> Result<Vec<Channel>, RemoteError> {
        let channels = self
            .transport
            .channels(user_id, team_id, self.cancel.as_ref())
            .map_err(|error| map_api_error("team", team_id, error))?;
        Ok(channels.into_iter().filter_map(channel_from_payload).collect())
    }
}

fn map_api_error(resource: &'static str, id: &str, error: MattermostApiError) -> RemoteError {
    if matches!(error, MattermostApiError::Cancelled) {
        return RemoteError::Cancelled;
    }
    match error.status().map(|status| status.as_u16()) {
        Some(404) => RemoteError::not_found(resource, id),
        Some(401 | 403) => RemoteError::Unauthorized(error.to_string()),
        _ => RemoteError::transport(error.to_string()),
    }
}

/// Converts a wire page and derives continuation cursors from it.
///
/// The server leaves `prev_post_id`/`next_post_id` empty on plain cursor
/// queries, so more data is also assumed when the page came back full. The
/// continuation always points at the edge post of this page: the oldest one
/// going back, the newest one going forward.
fn post_page_from_payload(
    channel_id: &str,
    payload: PostListPayload,
    cursor: Option<&PostCursor>,
    per_page: u32,
) -> PostPage {
    let PostListPayload {
        order,
        mut posts,
        next_post_id,
        prev_post_id,
        has_next,
    } = payload;

    let full_page = order.len() >= per_page as usize;
    let forward = matches!(cursor, Some(PostCursor::After(_)));
    let more_older = !forward && (!prev_post_id.is_empty() || full_page);
    let more_newer = forward && (!next_post_id.is_empty() || has_next == Some(true) || full_page);

    let mut page = PostPage {
        order: Vec::with_capacity(order.len()),
        ..PostPage::default()
    };
    for post_id in order {
        match posts.remove(&post_id) {
            Some(post) => {
                page.posts
                    .insert(post_id.clone(), post_from_payload(channel_id, post));
            }
            None => {
                tracing::warn!(channel_id, post_id = %post_id, "post listed in order without a body");
            }
        }
        page.order.push(post_id);
    }

    if more_older {
        page.prev_post_id = page.order.last().cloned();
    }
    if more_newer {
        page.next_post_id = page.order.first().cloned();
    }
    page
}

fn post_from_payload(channel_id: &str, post: PostPayload) -> Post {
    let channel_id = if post.channel_id.is_empty() {
        channel_id.to_string()
    } else {
        post.channel_id
    };
    Post {
        id: post.id,
        channel_id,
        user_id: post.user_id,
        create_at: post.create_at,
        message: post.message,
        props: post.props,
    }
}

fn user_from_payload(user: UserPayload) -> User {
    User {
        id: user.id,
        username: user.username,
        nickname: non_empty(user.nickname),
        first_name: non_empty(user.first_name),
        last_name: non_empty(user.last_name),
    }
}

fn channel_from_payload(channel: ChannelPayload) -> Option<Channel> {
    let Some(channel_type) = ChannelType::from_code(&channel.channel_type) else {
        tracing::warn!(
            channel_id = %channel.id,
            channel_type = %channel.channel_type,
            "skipping channel of unknown type"
        );
        return None;
    };

    Some(Channel {
        id: channel.id,
        team_id: channel.team_id,
        channel_type,
        name: channel.name,
        display_name: non_empty(channel.display_name),
    })
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Mutex, MutexGuard};

    use mattermost_api::error::parse_error_message;
    use mattermost_api::StatusCode;

    use super::*;

    #[derive(Default)]
    struct FakeTransport {
        pages: Mutex<Vec<Result<PostListPayload, MattermostApiError>>>,
        queries: Mutex<Vec<PostsQuery>>,
        users: HashMap<String, UserPayload>,
        channels: Vec<ChannelPayload>,
    }

    fn raised(cancel: Option<&CancellationSignal>) -> bool {
        cancel.is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    impl ApiTransport for FakeTransport {
        fn posts(
            &self,
            _channel_id: &str,
            query: &PostsQuery,
            cancel: Option<&CancellationSignal>,
        ) -> Result<PostListPayload, MattermostApiError> {
            if raised(cancel) {
                return Err(MattermostApiError::Cancelled);
            }
            lock_unpoisoned(&self.queries).push(query.clone());
            let mut pages = lock_unpoisoned(&self.pages);
            if pages.is_empty() {
                return Ok(PostListPayload::default());
            }
            pages.remove(0)
        }

        fn user(
            &self,
            user_id: &str,
            cancel: Option<&CancellationSignal>,
        ) -> Result<UserPayload, MattermostApiError> {
            if raised(cancel) {
                return Err(MattermostApiError::Cancelled);
            }
            self.users.get(user_id).cloned().ok_or_else(|| {
                MattermostApiError::Status(
                    StatusCode::NOT_FOUND,
                    "Unable to find the user.".to_string(),
                )
            })
        }

        fn teams(
            &self,
            _user_id: &str,
            _cancel: Option<&CancellationSignal>,
        ) -> Result<Vec<TeamPayload>, MattermostApiError> {
            Err(MattermostApiError::Status(
                StatusCode::UNAUTHORIZED,
                "Invalid or expired session".to_string(),
            ))
        }

        fn channels(
            &self,
            _user_id: &str,
            _team_id: &str,
            _cancel: Option<&CancellationSignal>,
        ) -> Result<Vec<ChannelPayload>, MattermostApiError> {
            Ok(self.channels.clone())
        }
    }

    fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        match mutex.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn wire_page(ids: &[&str]) -> PostListPayload {
        PostListPayload {
            order: ids.iter().map(|id| id.to_string()).collect(),
            posts: ids
                .iter()
                .enumerate()
                .map(|(n, id)| {
                    (
                        id.to_string(),
                        PostPayload {
                            id: id.to_string(),
                            create_at: 100 - n as i64,
                            message: format!("message {id}"),
                            ..PostPayload::default()
                        },
                    )
                })
                .collect(),
            ..PostListPayload::default()
        }
    }

    fn remote_with(transport: FakeTransport, per_page: u32) -> (MattermostRemote, Arc<FakeTransport>) {
        let transport = Arc::new(transport);
        let remote = MattermostRemote::with_transport_for_tests(
            Arc::clone(&transport) as Arc<dyn ApiTransport>,
            per_page,
        );
        (remote, transport)
    }

    #[test]
    fn full_page_continues_from_its_oldest_post() {
        let (remote, transport) = remote_with(
            FakeTransport {
                pages: Mutex::new(vec![Ok(wire_page(&["p3", "p2"]))]),
                ..FakeTransport::default()
            },
            2,
        );

        let page = remote
            .fetch_posts("c1", Some(&PostCursor::Before("p4".to_string())))
            .expect("page should map");

        assert_eq!(page.order, vec!["p3", "p2"]);
        assert_eq!(page.prev_post_id.as_deref(), Some("p2"));
        assert_eq!(page.next_post_id, None);
        assert_eq!(page.posts["p3"].channel_id, "c1");
        assert_eq!(
            lock_unpoisoned(&transport.queries)[0],
            PostsQuery::latest(2).before("p4")
        );
    }

    #[test]
    fn short_page_without_server_cursor_ends_pagination() {
        let (remote, _) = remote_with(
            FakeTransport {
                pages: Mutex::new(vec![Ok(wire_page(&["p1"]))]),
                ..FakeTransport::default()
            },
            60,
        );

        let page = remote.fetch_posts("c1", None).expect("page should map");

        assert_eq!(page.prev_post_id, None);
    }

    #[test]
    fn server_prev_cursor_is_replaced_by_oldest_post_in_page() {
        let mut payload = wire_page(&["p9", "p8"]);
        payload.prev_post_id = "p7".to_string();
        let (remote, _) = remote_with(
            FakeTransport {
                pages: Mutex::new(vec![Ok(payload)]),
                ..FakeTransport::default()
            },
            60,
        );

        let page = remote.fetch_posts("c1", None).expect("page should map");

        assert_eq!(page.prev_post_id.as_deref(), Some("p8"));
    }

    #[test]
    fn forward_page_continues_from_its_newest_post() {
        let mut payload = wire_page(&["p6", "p5"]);
        payload.has_next = Some(true);
        let (remote, _) = remote_with(
            FakeTransport {
                pages: Mutex::new(vec![Ok(payload)]),
                ..FakeTransport::default()
            },
            60,
        );

        let page = remote
            .fetch_posts("c1", Some(&PostCursor::After("p4".to_string())))
            .expect("page should map");

        assert_eq!(page.next_post_id.as_deref(), Some("p6"));
        assert_eq!(page.prev_post_id, None);
    }

    #[test]
    fn order_entry_without_body_is_kept_for_the_engine_to_report() {
        let mut payload = wire_page(&["p2", "p1"]);
        payload.posts.remove("p1");
        let (remote, _) = remote_with(
            FakeTransport {
                pages: Mutex::new(vec![Ok(payload)]),
                ..FakeTransport::default()
            },
            60,
        );

        let page = remote.fetch_posts("c1", None).expect("page should map");

        assert_eq!(page.order, vec!["p2", "p1"]);
        assert!(!page.posts.contains_key("p1"));
    }

    #[test]
    fn missing_user_maps_to_not_found_and_empty_names_to_none() {
        let mut users = HashMap::new();
        users.insert(
            "u2".to_string(),
            UserPayload {
                id: "u2".to_string(),
                username: "bob".to_string(),
                first_name: "Bob".to_string(),
                ..UserPayload::default()
            },
        );
        let (remote, _) = remote_with(
            FakeTransport {
                users,
                ..FakeTransport::default()
            },
            60,
        );

        let bob = remote.fetch_user("u2").expect("user should map");
        assert_eq!(bob.first_name.as_deref(), Some("Bob"));
        assert_eq!(bob.nickname, None);
        assert!(remote.fetch_user("u3").unwrap_err().is_not_found());
    }

    #[test]
    fn rejected_session_maps_to_unauthorized() {
        let (remote, _) = remote_with(FakeTransport::default(), 60);

        assert!(matches!(
            remote.fetch_teams("me"),
            Err(RemoteError::Unauthorized(message)) if message.contains("expired")
        ));
    }

    #[test]
    fn transport_failures_keep_server_message() {
        let (remote, _) = remote_with(
            FakeTransport {
                pages: Mutex::new(vec![Err(MattermostApiError::Status(
                    StatusCode::SERVICE_UNAVAILABLE,
                    parse_error_message(
                        StatusCode::SERVICE_UNAVAILABLE,
                        r#"{"message":"maintenance"}"#,
                    ),
                ))]),
                ..FakeTransport::default()
            },
            60,
        );

        assert!(matches!(
            remote.fetch_posts("c1", None),
            Err(RemoteError::Transport(message)) if message.contains("maintenance")
        ));
    }

    #[test]
    fn channels_map_type_codes_and_skip_unknown_types() {
        let (remote, _) = remote_with(
            FakeTransport {
                channels: vec![
                    ChannelPayload {
                        id: "c1".to_string(),
                        channel_type: "O".to_string(),
                        name: "town-square".to_string(),
                        display_name: "Town Square".to_string(),
                        ..ChannelPayload::default()
                    },
                    ChannelPayload {
                        id: "c2".to_string(),
                        channel_type: "D".to_string(),
                        name: "u1__u2".to_string(),
                        ..ChannelPayload::default()
                    },
                    ChannelPayload {
                        id: "c3".to_string(),
                        channel_type: "X".to_string(),
                        ..ChannelPayload::default()
                    },
                ],
                ..FakeTransport::default()
            },
            60,
        );

        let channels = remote.fetch_channels("me", "t1").expect("channels should map");

        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].display_name.as_deref(), Some("Town Square"));
        assert!(channels[1].is_direct());
        assert_eq!(channels[1].display_name, None);
    }

    #[test]
    fn raised_cancel_flag_short_circuits_requests() {
        let cancel: CancellationSignal = Arc::new(AtomicBool::new(false));
        let (remote, transport) = remote_with(
            FakeTransport {
                pages: Mutex::new(vec![Ok(wire_page(&["p2", "p1"])), Ok(wire_page(&["p0"]))]),
                ..FakeTransport::default()
            },
            2,
        );
        let remote = remote.with_cancel(Arc::clone(&cancel));

        assert!(remote.fetch_posts("c1", None).is_ok());
        cancel.store(true, Ordering::Release);

        assert_eq!(remote.fetch_posts("c1", None), Err(RemoteError::Cancelled));
        assert_eq!(remote.fetch_user("u1"), Err(RemoteError::Cancelled));
        assert_eq!(lock_unpoisoned(&transport.queries).len(), 1);
    }

    #[test]
    fn default_transport_honors_a_raised_flag_without_sending() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime should build");
        let client = MattermostApiClient::new(
            MattermostConfig::new("http://127.0.0.1:9")
                .with_token("token")
                .with_timeout(Duration::from_secs(30)),
        )
        .expect("client should build");
        let remote = MattermostRemote::with_transport_for_tests(
            Arc::new(DefaultTransport { client, runtime }),
            60,
        )
        .with_cancel(Arc::new(AtomicBool::new(true)));

        let started = std::time::Instant::now();
        assert_eq!(remote.fetch_posts("c1", None), Err(RemoteError::Cancelled));
        assert_eq!(remote.fetch_teams("me"), Err(RemoteError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
