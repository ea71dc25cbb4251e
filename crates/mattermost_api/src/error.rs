use std::fmt;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Error as JsonError;

#[derive(Debug)]
pub enum MattermostApiError {
    MissingToken,
    InvalidBaseUrl(String),
    InvalidHeader(String),
    Request(reqwest::Error),
    Status(StatusCode, String),
    Serde(JsonError),
    /// Login succeeded but the response carried no session token.
    MissingSessionToken,
    RetryExhausted {
        status: Option<StatusCode>,
        last_error: Option<String>,
    },
    Cancelled,
    Runtime(String),
}

impl MattermostApiError {
    /// HTTP status of a rejected request, if the server answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status(status, _) => Some(*status),
            Self::RetryExhausted { status, .. } => *status,
            _ => None,
        }
    }
}

/// Error body returned by the Mattermost server, e.g.
/// `{"id":"api.user.login.invalid_credentials","message":"...","status_code":401}`.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorPayload {
    pub id: Option<String>,
    pub message: Option<String>,
    #[serde(default)]
    pub detailed_error: Option<String>,
}

impl ErrorPayload {
    fn message_or_fallback(&self) -> Option<String> {
        let message = self.message.as_deref().and_then(non_empty_string)?;
        match self.detailed_error.as_deref().and_then(non_empty_string) {
            Some(detail) => Some(format!("{message} ({detail})")),
            None => Some(message.to_owned()),
        }
    }
}

impl fmt::Display for MattermostApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingToken => write!(f, "an access token is required; log in first"),
            Self::InvalidBaseUrl(value) => write!(f, "invalid server URL: {value}"),
            Self::InvalidHeader(message) => write!(f, "invalid request header: {message}"),
            Self::Request(error) => write!(f, "request error: {error}"),
            Self::Status(status, message) => write!(f, "HTTP {status} {message}"),
            Self::Serde(error) => write!(f, "unexpected response body: {error}"),
            Self::MissingSessionToken => write!(f, "login response did not include a session token"),
            Self::RetryExhausted { status, last_error } => {
                let status = status
                    .map(|status| status.as_u16().to_string())
                    .unwrap_or_else(|| "n/a".to_owned());
                write!(f, "retry exhausted after max attempts (status: {status}, last_error: {last_error:?})")
            }
            Self::Cancelled => write!(f, "request was cancelled"),
            Self::Runtime(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for MattermostApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Request(error) => Some(error),
            Self::Serde(error) => Some(error),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for MattermostApiError {
    fn from(error: reqwest::Error) -> Self {
        Self::Request(error)
    }
}

impl From<JsonError> for MattermostApiError {
    fn from(error: JsonError) -> Self {
        Self::Serde(error)
    }
}

pub fn parse_error_message(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ErrorPayload>(body) {
        if let Some(message) = payload.message_or_fallback() {
            return message;
        }
        if let Some(id) = payload.id.as_deref().and_then(non_empty_string) {
            return id.to_owned();
        }
    }

    if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        body.trim().to_string()
    }
}

fn non_empty_string(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
