//! Persistent CLI settings in `<config dir>/matterless/config.json`.
//!
//! Connection flags given on the command line override the stored values and
//! are written back, so later runs can omit them.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chat_client_mattermost::Credentials;
use matterless::{CacheCapacities, PageDirection, SyncOptions};
use mattermost_api::LoginRequest;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::args::ConnectionArgs;

pub const CONFIG_APP_DIR: &str = "matterless";
pub const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to {operation} config file '{}': {source}", path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("config file '{}' is not valid JSON: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("no server URL configured; pass --url")]
    MissingUrl,

    #[error("no credentials configured; pass --token, or --login-id with --password")]
    MissingCredentials,
}

impl ConfigError {
    fn io(operation: &'static str, path: &Path, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mfa_token: Option<String>,
    /// Entries per cache kind.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_capacity: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_pages: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_timeout_sec: Option<u64>,
}

impl CliConfig {
    /// `<config dir>/matterless/config.json`, if the platform has a config dir.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_APP_DIR).join(CONFIG_FILE_NAME))
    }

    /// Reads `path`; a missing file yields the default config.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(error) => return Err(ConfigError::io("read", path, error)),
        };
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Writes the non-empty values to `path` via a temp file and rename.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|error| ConfigError::io("create", parent, error))?;
        }

        let mut body = serde_json::to_string_pretty(&self.without_empty()).map_err(|source| {
            ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })?;
        body.push('\n');

        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, body).map_err(|error| ConfigError::io("write", &tmp_path, error))?;
        restrict_permissions(&tmp_path)?;
        fs::rename(&tmp_path, path).map_err(|error| ConfigError::io("replace", path, error))
    }

    /// Applies command-line overrides. A new password invalidates the stored
    /// session token unless a token was also given.
    pub fn apply_overrides(&mut self, overrides: &ConnectionArgs) {
        let password_given = non_empty(overrides.password.as_deref()).is_some();
        let token_given = non_empty(overrides.token.as_deref()).is_some();
        if password_given && !token_given {
            self.token = None;
        }

        for (slot, value) in [
            (&mut self.url, &overrides.url),
            (&mut self.token, &overrides.token),
            (&mut self.login_id, &overrides.login_id),
            (&mut self.password, &overrides.password),
            (&mut self.mfa_token, &overrides.mfa_token),
        ] {
            if let Some(value) = non_empty(value.as_deref()) {
                *slot = Some(value.to_string());
            }
        }
    }

    /// Copy with blank strings dropped.
    #[must_use]
    pub fn without_empty(&self) -> Self {
        let keep = |value: &Option<String>| non_empty(value.as_deref()).map(str::to_string);
        Self {
            url: keep(&self.url),
            token: keep(&self.token),
            login_id: keep(&self.login_id),
            password: keep(&self.password),
            mfa_token: keep(&self.mfa_token),
            ..self.clone()
        }
    }

    pub fn server_url(&self) -> Result<&str, ConfigError> {
        non_empty(self.url.as_deref()).ok_or(ConfigError::MissingUrl)
    }

    /// Token login wins over password login when both are configured.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        if let Some(token) = non_empty(self.token.as_deref()) {
            return Ok(Credentials::Token(token.to_string()));
        }

        match (
            non_empty(self.login_id.as_deref()),
            non_empty(self.password.as_deref()),
        ) {
            (Some(login_id), Some(password)) => {
                let mut request = LoginRequest::new(login_id, password);
                if let Some(mfa_token) = non_empty(self.mfa_token.as_deref()) {
                    request = request.with_mfa_token(mfa_token);
                }
                Ok(Credentials::Password(request))
            }
            _ => Err(ConfigError::MissingCredentials),
        }
    }

    #[must_use]
    pub fn capacities(&self) -> CacheCapacities {
        self.cache_capacity
            .map(CacheCapacities::uniform)
            .unwrap_or_default()
    }

    /// Stored sync limits, overridden by per-run values.
    #[must_use]
    pub fn sync_options(
        &self,
        max_pages: Option<usize>,
        timeout_sec: Option<u64>,
        direction: PageDirection,
    ) -> SyncOptions {
        let mut options = SyncOptions::default().with_direction(direction);
        if let Some(max_pages) = max_pages.or(self.max_pages) {
            options = options.with_max_pages(max_pages);
        }
        if let Some(timeout_sec) = timeout_sec.or(self.sync_timeout_sec) {
            options = options.with_timeout(Duration::from_secs(timeout_sec));
        }
        options
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .map_err(|error| ConfigError::io("protect", path, error))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}
