use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Posts per page requested when none is configured. Matches the server default.
pub const DEFAULT_PER_PAGE: u32 = 60;
/// Largest page the server accepts.
pub const MAX_PER_PAGE: u32 = 200;

/// Body of `POST /users/login`.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub login_id: String,
    pub password: String,
    /// MFA code, sent as `token` on the wire.
    #[serde(rename = "token", skip_serializing_if = "Option::is_none")]
    pub mfa_token: Option<String>,
}

impl LoginRequest {
    pub fn new(login_id: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login_id: login_id.into(),
            password: password.into(),
            mfa_token: None,
        }
    }

    pub fn with_mfa_token(mut self, mfa_token: impl Into<String>) -> Self {
        self.mfa_token = Some(mfa_token.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct UserPayload {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TeamPayload {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChannelPayload {
    pub id: String,
    #[serde(default)]
    pub team_id: String,
    /// One-letter channel type: `O`, `P`, `D` or `G`.
    #[serde(rename = "type", default)]
    pub channel_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PostPayload {
    pub id: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub user_id: String,
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub create_at: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub props: Value,
}

/// Response of `GET /channels/{id}/posts`. Cursor ids are empty strings when absent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PostListPayload {
    #[serde(default)]
    pub order: Vec<String>,
    #[serde(default)]
    pub posts: HashMap<String, PostPayload>,
    #[serde(default)]
    pub next_post_id: String,
    #[serde(default)]
    pub prev_post_id: String,
    #[serde(default)]
    pub has_next: Option<bool>,
}

/// Query parameters for `GET /channels/{id}/posts`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostsQuery {
    pub before: Option<String>,
    pub after: Option<String>,
    pub per_page: u32,
}

impl Default for PostsQuery {
    fn default() -> Self {
        Self::latest(DEFAULT_PER_PAGE)
    }
}

impl PostsQuery {
    /// Most recent page of a channel.
    pub fn latest(per_page: u32) -> Self {
        Self {
            before: None,
            after: None,
            per_page: per_page.clamp(1, MAX_PER_PAGE),
        }
    }

    pub fn before(mut self, post_id: impl Into<String>) -> Self {
        self.before = Some(post_id.into());
        self.after = None;
        self
    }

    pub fn after(mut self, post_id: impl Into<String>) -> Self {
        self.after = Some(post_id.into());
        self.before = None;
        self
    }

    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::with_capacity(2);
        if let Some(before) = &self.before {
            pairs.push(("before", before.clone()));
        }
        if let Some(after) = &self.after {
            pairs.push(("after", after.clone()));
        }
        pairs.push(("per_page", self.per_page.to_string()));
        pairs
    }
}
