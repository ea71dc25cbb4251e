//! Transport-only Mattermost REST (v4) client primitives.
//!
//! This crate owns request building, retry and response parsing for the few
//! endpoints the terminal client reads: login, users, teams, channels and
//! channel posts. It holds no caching or sync logic; `chat_client_mattermost`
//! adapts it to the blocking `chat_client` contract.

pub mod client;
pub mod config;
pub mod error;
pub mod headers;
pub mod payload;
pub mod retry;
pub mod url;

pub use client::{CancellationSignal, LoginSession, MattermostApiClient};
pub use config::MattermostConfig;
pub use error::MattermostApiError;
pub use payload::{
    ChannelPayload, LoginRequest, PostListPayload, PostPayload, PostsQuery, TeamPayload,
    UserPayload,
};
pub use reqwest::StatusCode;
pub use url::normalize_api_url;
