use std::collections::BTreeMap;

use crate::config::MattermostConfig;
use crate::error::MattermostApiError;

pub const HEADER_ACCEPT: &str = "accept";
pub const HEADER_CONTENT_TYPE: &str = "content-type";
pub const HEADER_AUTHORIZATION: &str = "authorization";
pub const HEADER_REQUESTED_WITH: &str = "x-requested-with";
pub const HEADER_USER_AGENT: &str = "user-agent";

/// Response header carrying the session token after a successful login.
pub const HEADER_SESSION_TOKEN: &str = "token";

/// Build a deterministic header map for Mattermost requests.
///
/// `authenticated` requests fail with [`MattermostApiError::MissingToken`]
/// when the config carries no token.
pub fn build_headers(
    config: &MattermostConfig,
    authenticated: bool,
) -> Result<BTreeMap<String, String>, MattermostApiError> {
    let mut headers = BTreeMap::new();

    match config.bearer_token() {
        Some(token) => {
            headers.insert(HEADER_AUTHORIZATION.to_owned(), format!("Bearer {token}"));
        }
        None if authenticated => return Err(MattermostApiError::MissingToken),
        None => {}
    }

    headers.insert(HEADER_ACCEPT.to_owned(), "application/json".to_owned());
    headers.insert(
        HEADER_CONTENT_TYPE.to_owned(),
        "application/json".to_owned(),
    );
    headers.insert(
        HEADER_REQUESTED_WITH.to_owned(),
        "XMLHttpRequest".to_owned(),
    );

    let ua = match config.user_agent.as_deref() {
        Some(explicit) if !explicit.trim().is_empty() => explicit.trim().to_owned(),
        _ => default_user_agent(),
    };
    headers.insert(HEADER_USER_AGENT.to_owned(), ua);

    for (key, value) in &config.extra_headers {
        headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_owned());
    }

    Ok(headers)
}

/// `matterless/<version> (<os> <release>; <arch>)`.
pub fn default_user_agent() -> String {
    let product = concat!("matterless/", env!("CARGO_PKG_VERSION"));
    match runtime_os_triplet() {
        Some((platform, release, arch)) => format!("{product} ({platform} {release}; {arch})"),
        None => product.to_owned(),
    }
}

fn normalize_arch(arch: &str) -> String {
    match arch.to_ascii_lowercase().as_str() {
        "x86_64" | "amd64" => "x64".to_owned(),
        "x86" | "i386" | "i686" => "ia32".to_owned(),
        "aarch64" => "arm64".to_owned(),
        normalized => normalized.to_owned(),
    }
}

#[cfg(unix)]
fn runtime_os_triplet() -> Option<(String, String, String)> {
    use std::ffi::CStr;
    use std::mem::MaybeUninit;

    let mut raw = MaybeUninit::<libc::utsname>::uninit();
    // SAFETY: `uname` initializes the provided `utsname` struct on success.
    let rc = unsafe { libc::uname(raw.as_mut_ptr()) };
    if rc != 0 {
        return None;
    }

    // SAFETY: `uname` returned success, so `raw` is initialized.
    let raw = unsafe { raw.assume_init() };
    // SAFETY: `uname` provides NUL-terminated fixed-size C strings.
    let platform = unsafe { CStr::from_ptr(raw.sysname.as_ptr()) }
        .to_string_lossy()
        .to_lowercase();
    // SAFETY: as above.
    let release = unsafe { CStr::from_ptr(raw.release.as_ptr()) }
        .to_string_lossy()
        .into_owned();
    // SAFETY: as above.
    let arch = unsafe { CStr::from_ptr(raw.machine.as_ptr()) }.to_string_lossy();
    let arch = normalize_arch(&arch);

    if platform.is_empty() || release.is_empty() || arch.is_empty() {
        None
    } else {
        Some((platform, release, arch))
    }
}

#[cfg(not(unix))]
fn runtime_os_triplet() -> Option<(String, String, String)> {
    None
}
