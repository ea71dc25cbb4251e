//! When and how long to wait before re-sending a failed Mattermost request.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;

/// Retries after the first attempt.
pub const MAX_RETRIES: u32 = 1;
pub const BASE_DELAY_MS: u64 = 500;
/// Ceiling for any single wait, including server-requested ones.
pub const MAX_DELAY_MS: u64 = 10_000;

/// Seconds until the rate-limit window resets, sent with 429 responses.
pub const HEADER_RATELIMIT_RESET: &str = "x-ratelimit-reset";

fn transient_body_pattern() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r"(?i)rate.?limit|too many requests|service.?unavailable|connection.?(refused|reset)")
            .expect("retry regex must compile")
    })
}

/// Throttling, server failures other than 501, or an error body that
/// describes a transient condition.
pub fn is_retryable_status(status: StatusCode, body: &str) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || (status.is_server_error() && status != StatusCode::NOT_IMPLEMENTED)
        || transient_body_pattern().is_match(body)
}

/// Exponential backoff for `attempt` (0-based), capped at [`MAX_DELAY_MS`].
pub fn backoff_delay(attempt: u32) -> Duration {
    let factor = 1_u64.checked_shl(attempt).unwrap_or(u64::MAX);
    Duration::from_millis(BASE_DELAY_MS.saturating_mul(factor).min(MAX_DELAY_MS))
}

/// Wait the server asked for via `Retry-After` or `X-Ratelimit-Reset`
/// (whole seconds), capped at [`MAX_DELAY_MS`].
pub fn server_requested_delay(headers: &HeaderMap) -> Option<Duration> {
    [RETRY_AFTER.as_str(), HEADER_RATELIMIT_RESET]
        .into_iter()
        .find_map(|name| {
            headers
                .get(name)?
                .to_str()
                .ok()?
                .trim()
                .parse::<u64>()
                .ok()
        })
        .map(|seconds| Duration::from_millis(seconds.saturating_mul(1000).min(MAX_DELAY_MS)))
}

/// Delay before retry `attempt`: the server's request when present,
/// exponential backoff otherwise.
pub fn retry_delay(attempt: u32, headers: Option<&HeaderMap>) -> Duration {
    headers
        .and_then(server_requested_delay)
        .unwrap_or_else(|| backoff_delay(attempt))
}
