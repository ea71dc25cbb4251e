//! Minimal server-agnostic contract for reading a team-chat service.
//!
//! This crate defines only the entity types shared by the sync engine, the
//! cache and the transports, plus the blocking [`RemoteClient`] trait. It
//! excludes wire payloads, login handling and any caching policy.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Opaque server-assigned post identifier.
pub type PostId = String;

/// Alias the server resolves to the logged-in user.
pub const CURRENT_USER_ID: &str = "me";

/// Error returned by a [`RemoteClient`] call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("{resource} '{id}' was not found on the server")]
    NotFound { resource: &'static str, id: String },

    #[error("server rejected the session credentials: {0}")]
    Unauthorized(String),

    #[error("transport failure: {0}")]
    Transport(String),

    /// The caller's cancellation flag was raised while the request was pending.
    #[error("request was cancelled")]
    Cancelled,
}

impl RemoteError {
    #[must_use]
    pub fn not_found(resource: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource,
            id: id.into(),
        }
    }

    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Returns true when the server answered that the entity does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// One message in a channel. Immutable once created server-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub channel_id: String,
    #[serde(default)]
    pub user_id: String,
    /// Creation time in server milliseconds.
    pub create_at: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub props: Value,
}

impl Post {
    #[must_use]
    pub fn new(
        id: impl Into<PostId>,
        channel_id: impl Into<String>,
        create_at: i64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            channel_id: channel_id.into(),
            user_id: String::new(),
            create_at,
            message: message.into(),
            props: Value::Null,
        }
    }

    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }
}

/// Result of one paginated post fetch, `order` newest-first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostPage {
    pub order: Vec<PostId>,
    pub posts: HashMap<PostId, Post>,
    pub next_post_id: Option<PostId>,
    pub prev_post_id: Option<PostId>,
}

impl PostPage {
    /// Builds a page whose `order` follows the given post sequence.
    #[must_use]
    pub fn from_posts(posts: impl IntoIterator<Item = Post>) -> Self {
        let mut page = Self::default();
        for post in posts {
            page.order.push(post.id.clone());
            page.posts.insert(post.id.clone(), post);
        }
        page
    }

    #[must_use]
    pub fn with_next_post_id(mut self, post_id: impl Into<PostId>) -> Self {
        self.next_post_id = Some(post_id.into());
        self
    }

    #[must_use]
    pub fn with_prev_post_id(mut self, post_id: impl Into<PostId>) -> Self {
        self.prev_post_id = Some(post_id.into());
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Position a post fetch resumes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostCursor {
    /// Posts strictly older than the given post.
    Before(PostId),
    /// Posts strictly newer than the given post.
    After(PostId),
}

impl PostCursor {
    #[must_use]
    pub fn post_id(&self) -> &str {
        match self {
            Self::Before(post_id) | Self::After(post_id) => post_id,
        }
    }
}

impl fmt::Display for PostCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Before(post_id) => write!(f, "before:{post_id}"),
            Self::After(post_id) => write!(f, "after:{post_id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

impl User {
    #[must_use]
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            nickname: None,
            first_name: None,
            last_name: None,
        }
    }

    #[must_use]
    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = Some(nickname.into());
        self
    }

    #[must_use]
    pub fn with_name(mut self, first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        self.first_name = Some(first_name.into());
        self.last_name = Some(last_name.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelType {
    #[serde(rename = "D")]
    Direct,
    #[serde(rename = "G")]
    Group,
    #[serde(rename = "O")]
    Public,
    #[serde(rename = "P")]
    Private,
}

impl ChannelType {
    /// Parses the single-letter wire code used by the server.
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "D" => Some(Self::Direct),
            "G" => Some(Self::Group),
            "O" => Some(Self::Public),
            "P" => Some(Self::Private),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    #[serde(default)]
    pub team_id: String,
    pub channel_type: ChannelType,
    /// Raw server name; direct channels encode both participant ids here.
    pub name: String,
    pub display_name: Option<String>,
}

impl Channel {
    #[must_use]
    pub fn new(id: impl Into<String>, channel_type: ChannelType, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            team_id: String::new(),
            channel_type,
            name: name.into(),
            display_name: None,
        }
    }

    #[must_use]
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    #[must_use]
    pub fn is_direct(&self) -> bool {
        self.channel_type == ChannelType::Direct
    }
}

/// Blocking read interface onto the remote chat service.
pub trait RemoteClient: Send + Sync + 'static {
    /// Fetches one page of channel posts; `None` asks for the most recent page.
    fn fetch_posts(
        &self,
        channel_id: &str,
        cursor: Option<&PostCursor>,
    ) -> Result<PostPage, RemoteError>;

    /// Fetches one user; fails with [`RemoteError::NotFound`] for unknown ids.
    fn fetch_user(&self, user_id: &str) -> Result<User, RemoteError>;

    fn fetch_teams(&self, user_id: &str) -> Result<Vec<Team>, RemoteError>;

    fn fetch_channels(&self, user_id: &str, team_id: &str) -> Result<Vec<Channel>, RemoteError>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Channel, ChannelType, Post, PostCursor, PostPage, RemoteError, User};

    #[test]
    fn page_from_posts_keeps_given_order_and_maps_every_id() {
        let page = PostPage::from_posts(vec![
            Post::new("c", "ch", 3, "third"),
            Post::new("b", "ch", 2, "second"),
        ])
        .with_prev_post_id("a");

        assert_eq!(page.order, vec!["c".to_string(), "b".to_string()]);
        assert_eq!(page.posts["b"].message, "second");
        assert_eq!(page.prev_post_id.as_deref(), Some("a"));
        assert_eq!(page.next_post_id, None);
    }

    #[test]
    fn channel_type_uses_single_letter_wire_codes() {
        let channel = Channel::new("id", ChannelType::Direct, "u1__u2");
        let encoded = serde_json::to_value(&channel).expect("channel should serialize");
        assert_eq!(encoded["channel_type"], json!("D"));

        assert_eq!(ChannelType::from_code("O"), Some(ChannelType::Public));
        assert_eq!(ChannelType::from_code("P"), Some(ChannelType::Private));
        assert_eq!(ChannelType::from_code("X"), None);
    }

    #[test]
    fn cursor_display_names_direction_and_post() {
        assert_eq!(PostCursor::Before("p1".into()).to_string(), "before:p1");
        assert_eq!(PostCursor::After("p2".into()).post_id(), "p2");
    }

    #[test]
    fn user_deserializes_without_optional_name_fields() {
        let user: User = serde_json::from_value(json!({"id": "u1", "username": "ann"}))
            .expect("minimal user should parse");
        assert_eq!(user, User::new("u1", "ann"));
    }

    #[test]
    fn not_found_error_reports_resource_and_id() {
        let error = RemoteError::not_found("user", "u9");
        assert!(error.is_not_found());
        assert_eq!(error.to_string(), "user 'u9' was not found on the server");
        assert!(!RemoteError::transport("reset").is_not_found());
    }

    #[test]
    fn cancelled_error_is_not_a_missing_resource() {
        assert!(!RemoteError::Cancelled.is_not_found());
        assert_eq!(RemoteError::Cancelled.to_string(), "request was cancelled");
    }
}
