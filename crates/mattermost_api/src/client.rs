use std::future::Future;
use std::sync::{atomic::AtomicBool, atomic::Ordering, Arc};
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::config::MattermostConfig;
use crate::error::{parse_error_message, MattermostApiError};
use crate::headers::{build_headers, HEADER_SESSION_TOKEN};
use crate::payload::{
    ChannelPayload, LoginRequest, PostListPayload, PostsQuery, TeamPayload, UserPayload,
};
use crate::retry::{is_retryable_status, retry_delay, MAX_RETRIES};
use crate::url::normalize_api_url;

/// Optional cancellation signal shared across request and retry loops.
pub type CancellationSignal = Arc<AtomicBool>;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug)]
pub struct MattermostApiClient {
    http: Client,
    config: MattermostConfig,
    api_url: String,
}

/// Result of a password login: the session token and the logged-in user.
#[derive(Debug, Clone, PartialEq)]
pub struct LoginSession {
    pub token: String,
    pub user: UserPayload,
}

impl MattermostApiClient {
    pub fn new(config: MattermostConfig) -> Result<Self, MattermostApiError> {
        let api_url = normalize_api_url(&config.server_url)?;
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(MattermostApiError::from)?;
        Ok(Self {
            http,
            config,
            api_url,
        })
    }

    pub fn config(&self) -> &MattermostConfig {
        &self.config
    }

    /// Normalized API root, e.g. `https://chat.example.com/api/v4`.
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Replaces the bearer token, typically with the one returned by [`Self::login`].
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.config.token = Some(token.into());
        self
    }

    pub fn build_headers(&self, authenticated: bool) -> Result<HeaderMap, MattermostApiError> {
        let headers = build_headers(&self.config, authenticated)?;
        let mut out = HeaderMap::new();
        for (key, value) in headers {
            out.insert(
                HeaderName::from_bytes(key.as_bytes()).map_err(|_| {
                    MattermostApiError::InvalidHeader(format!("invalid header key: {key}"))
                })?,
                HeaderValue::from_str(&value).map_err(|_| {
                    MattermostApiError::InvalidHeader(format!("invalid header value for {key}"))
                })?,
            );
        }
        Ok(out)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path.trim_start_matches('/'))
    }

    fn build_request(
        &self,
        method: Method,
        path: &str,
        authenticated: bool,
    ) -> Result<RequestBuilder, MattermostApiError> {
        let headers = self.build_headers(authenticated)?;
        Ok(self
            .http
            .request(method, self.endpoint(path))
            .headers(headers))
    }

    /// `POST /users/login`. Does not require a token.
    pub async fn login(
        &self,
        request: &LoginRequest,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<LoginSession, MattermostApiError> {
        let response = self
            .send_with_retry(
                || {
                    Ok(self
                        .build_request(Method::POST, "users/login", false)?
                        .json(request))
                },
                cancellation,
            )
            .await?;

        let token = response
            .headers()
            .get(HEADER_SESSION_TOKEN)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_owned)
            .ok_or(MattermostApiError::MissingSessionToken)?;
        let user = read_json::<UserPayload>(response, cancellation).await?;

        tracing::debug!(user_id = %user.id, "logged in");
        Ok(LoginSession { token, user })
    }

    /// `GET /users/{user_id}`. `"me"` addresses the token's owner.
    pub async fn get_user(
        &self,
        user_id: &str,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<UserPayload, MattermostApiError> {
        self.get_json(&format!("users/{user_id}"), &[], cancellation)
            .await
    }

    /// `GET /users/{user_id}/teams`.
    pub async fn get_user_teams(
        &self,
        user_id: &str,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<Vec<TeamPayload>, MattermostApiError> {
        self.get_json(&format!("users/{user_id}/teams"), &[], cancellation)
            .await
    }

    /// `GET /users/{user_id}/teams/{team_id}/channels`.
    pub async fn get_channels_for_user(
        &self,
        user_id: &str,
        team_id: &str,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<Vec<ChannelPayload>, MattermostApiError> {
        self.get_json(
            &format!("users/{user_id}/teams/{team_id}/channels"),
            &[],
            cancellation,
        )
        .await
    }

    /// `GET /channels/{channel_id}/posts`.
    pub async fn get_posts_for_channel(
        &self,
        channel_id: &str,
        query: &PostsQuery,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<PostListPayload, MattermostApiError> {
        self.get_json(
            &format!("channels/{channel_id}/posts"),
            &query.to_pairs(),
            cancellation,
        )
        .await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        cancellation: Option<&CancellationSignal>,
    ) -> Result<T, MattermostApiError> {
        let response = self
            .send_with_retry(
                || Ok(self.build_request(Method::GET, path, true)?.query(query)),
                cancellation,
            )
            .await?;
        read_json(response, cancellation).await
    }

    /// Sends the request built by `build`, retrying transient failures.
    ///
    /// Retryable statuses and connection failures are retried up to
    /// [`MAX_RETRIES`] times, waiting as the server's rate-limit headers ask
    /// or with exponential backoff. Other non-success statuses fail
    /// immediately with [`MattermostApiError::Status`].
    pub async fn send_with_retry<B>(
        &self,
        build: B,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<Response, MattermostApiError>
    where
        B: Fn() -> Result<RequestBuilder, MattermostApiError>,
    {
        let mut last_status: Option<StatusCode> = None;
        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if is_cancelled(cancellation) {
                return Err(MattermostApiError::Cancelled);
            }

            let response = build()?.send();
            let response = await_or_cancel(response, cancellation)
                .await?
                .map_err(MattermostApiError::from);

            match response {
                Ok(response) => {
                    if response.status().is_success() {
                        return Ok(response);
                    }

                    let status = response.status();
                    last_status = Some(status);
                    let headers = response.headers().clone();
                    let body = await_or_cancel(response.text(), cancellation)
                        .await?
                        .unwrap_or_default();
                    let message = parse_error_message(status, &body);
                    last_error = Some(message.clone());

                    if attempt < MAX_RETRIES && is_retryable_status(status, &body) {
                        let delay = retry_delay(attempt, Some(&headers));
                        tracing::debug!(%status, attempt, ?delay, "retrying Mattermost request");
                        await_or_cancel(tokio::time::sleep(delay), cancellation).await?;
                        continue;
                    }

                    return Err(MattermostApiError::Status(status, message));
                }
                Err(MattermostApiError::Request(error)) if is_transient(&error) => {
                    let message = error.to_string();
                    last_error = Some(message);
                    if attempt < MAX_RETRIES {
                        tracing::debug!(%error, attempt, "retrying Mattermost request");
                        await_or_cancel(tokio::time::sleep(retry_delay(attempt, None)), cancellation)
                            .await?;
                        continue;
                    }
                    return Err(MattermostApiError::RetryExhausted {
                        status: last_status,
                        last_error,
                    });
                }
                Err(error) => return Err(error),
            }
        }

        Err(MattermostApiError::RetryExhausted {
            status: last_status,
            last_error,
        })
    }
}

async fn read_json<T: DeserializeOwned>(
    response: Response,
    cancellation: Option<&CancellationSignal>,
) -> Result<T, MattermostApiError> {
    let body = await_or_cancel(response.bytes(), cancellation).await??;
    Ok(serde_json::from_slice(&body)?)
}

fn is_transient(error: &reqwest::Error) -> bool {
    error.is_connect() || error.is_timeout() || error.is_request()
}

fn is_cancelled(cancel: Option<&CancellationSignal>) -> bool {
    cancel.is_some_and(|token| token.load(Ordering::Acquire))
}

async fn await_or_cancel<F>(
    future: F,
    cancellation: Option<&CancellationSignal>,
) -> Result<F::Output, MattermostApiError>
where
    F: Future,
{
    if cancellation.is_none() {
        return Ok(future.await);
    }

    let mut future = Box::pin(future);

    loop {
        if is_cancelled(cancellation) {
            return Err(MattermostApiError::Cancelled);
        }

        if let Ok(output) = tokio::time::timeout(CANCEL_POLL_INTERVAL, &mut future).await {
            if is_cancelled(cancellation) {
                return Err(MattermostApiError::Cancelled);
            }
            return Ok(output);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_paths_under_api_root() {
        let client = MattermostApiClient::new(MattermostConfig::new("chat.example.com/"))
            .expect("client should build");

        assert_eq!(client.api_url(), "https://chat.example.com/api/v4");
        assert_eq!(
            client.endpoint("/users/me"),
            "https://chat.example.com/api/v4/users/me"
        );
    }

    #[test]
    fn authenticated_headers_require_a_token() {
        let client = MattermostApiClient::new(MattermostConfig::new("https://chat.example.com"))
            .expect("client should build");

        assert!(matches!(
            client.build_headers(true),
            Err(MattermostApiError::MissingToken)
        ));
        assert!(client.build_headers(false).is_ok());

        let headers = client
            .with_token("abc")
            .build_headers(true)
            .expect("token is set");
        assert_eq!(
            headers.get("authorization").and_then(|v| v.to_str().ok()),
            Some("Bearer abc")
        );
    }

    #[test]
    fn cancellation_flag_is_observed() {
        let flag = Arc::new(AtomicBool::new(true));
        assert!(is_cancelled(Some(&flag)));
        assert!(!is_cancelled(None));
    }
}
