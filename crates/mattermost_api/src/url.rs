use reqwest::Url;

use crate::error::MattermostApiError;

/// Path prefix of the REST API this crate speaks.
pub const API_PATH: &str = "/api/v4";

/// Scheme assumed when the user enters a bare host name.
pub const DEFAULT_SCHEME: &str = "https";

/// Normalize a server URL to the REST API root.
///
/// Normalization rules:
/// 1) prepend `https://` when no scheme is given
/// 2) drop trailing slashes
/// 3) keep an existing `/api/v4` suffix, append it otherwise
pub fn normalize_api_url(input: &str) -> Result<String, MattermostApiError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(MattermostApiError::InvalidBaseUrl(
            "server URL is empty".to_owned(),
        ));
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_owned()
    } else {
        format!("{DEFAULT_SCHEME}://{trimmed}")
    };

    let parsed = Url::parse(&with_scheme)
        .map_err(|error| MattermostApiError::InvalidBaseUrl(format!("{trimmed}: {error}")))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(MattermostApiError::InvalidBaseUrl(trimmed.to_owned()));
    }

    let base = with_scheme.trim_end_matches('/');
    if base.ends_with(API_PATH) {
        return Ok(base.to_owned());
    }
    Ok(format!("{base}{API_PATH}"))
}

/// Host (and non-default port) of a server URL, used to key per-server state.
pub fn server_host(input: &str) -> Result<String, MattermostApiError> {
    let api_url = normalize_api_url(input)?;
    let parsed = Url::parse(&api_url)
        .map_err(|error| MattermostApiError::InvalidBaseUrl(format!("{input}: {error}")))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| MattermostApiError::InvalidBaseUrl(input.to_owned()))?;

    Ok(match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_owned(),
    })
}
