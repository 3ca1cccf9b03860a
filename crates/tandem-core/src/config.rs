//! Client configuration.
//!
//! A small JSON document naming the server, the owner whose records are
//! synced, where local data lives and how long the driver waits for edits to
//! settle. Every field can be overridden from `TANDEM_*` environment
//! variables.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::auth::AuthState;
use crate::error::{Error, Result};
use crate::sync::EngineOptions;
use crate::util::{is_http_url, normalize_text_option};

pub const DEFAULT_QUIET_PERIOD_MS: u64 = 2000;

pub const ENV_API_BASE_URL: &str = "TANDEM_API_BASE_URL";
pub const ENV_OWNER_ID: &str = "TANDEM_OWNER_ID";
pub const ENV_DATA_DIR: &str = "TANDEM_DATA_DIR";
pub const ENV_QUIET_PERIOD_MS: &str = "TANDEM_QUIET_PERIOD_MS";
pub const ENV_ACCESS_TOKEN: &str = "TANDEM_ACCESS_TOKEN";
pub const ENV_AUTH_REQUIRED: &str = "TANDEM_AUTH_REQUIRED";

const fn default_quiet_period_ms() -> u64 {
    DEFAULT_QUIET_PERIOD_MS
}

const fn default_auth_required() -> bool {
    true
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TandemConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    #[serde(default = "default_quiet_period_ms")]
    pub quiet_period_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// `false` for public endpoints that take no credential.
    #[serde(default = "default_auth_required")]
    pub auth_required: bool,
}

impl Default for TandemConfig {
    fn default() -> Self {
        Self {
            api_base_url: None,
            owner_id: None,
            data_dir: None,
            quiet_period_ms: DEFAULT_QUIET_PERIOD_MS,
            access_token: None,
            auth_required: true,
        }
    }
}

impl fmt::Debug for TandemConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TandemConfig")
            .field("api_base_url", &self.api_base_url)
            .field("owner_id", &self.owner_id)
            .field("data_dir", &self.data_dir)
            .field("quiet_period_ms", &self.quiet_period_ms)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "<redacted>"),
            )
            .field("auth_required", &self.auth_required)
            .finish()
    }
}

impl TandemConfig {
    /// Parse and normalize a JSON document.
    pub fn from_json(payload: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(payload)
            .map_err(|error| Error::Config(format!("invalid config JSON: {error}")))?;
        config.normalized()
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(payload) => Self::from_json(&payload),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No config at {}; using defaults", path.display());
                Ok(Self::default())
            }
            Err(error) => Err(error.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let payload = serde_json::to_string_pretty(self)?;
        std::fs::write(path, payload)?;
        Ok(())
    }

    /// Trim text fields, drop empty ones, and validate the server URL.
    pub fn normalized(mut self) -> Result<Self> {
        self.api_base_url = match normalize_text_option(self.api_base_url) {
            Some(url) if is_http_url(&url) => Some(url.trim_end_matches('/').to_string()),
            Some(_) => {
                return Err(Error::Config(
                    "api_base_url must include http:// or https://".to_string(),
                ))
            }
            None => None,
        };
        self.owner_id = normalize_text_option(self.owner_id);
        self.access_token = normalize_text_option(self.access_token);
        self.data_dir = self.data_dir.filter(|dir| !dir.as_os_str().is_empty());
        if self.quiet_period_ms == 0 {
            return Err(Error::Config(
                "quiet_period_ms must be greater than zero".to_string(),
            ));
        }
        Ok(self)
    }

    /// Apply `TANDEM_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from `lookup`, then normalize.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(value) = lookup(ENV_API_BASE_URL) {
            self.api_base_url = Some(value);
        }
        if let Some(value) = lookup(ENV_OWNER_ID) {
            self.owner_id = Some(value);
        }
        if let Some(value) = lookup(ENV_DATA_DIR) {
            self.data_dir = Some(PathBuf::from(value));
        }
        if let Some(value) = lookup(ENV_QUIET_PERIOD_MS) {
            self.quiet_period_ms = value.trim().parse().map_err(|error| {
                Error::Config(format!("{ENV_QUIET_PERIOD_MS} must be an integer: {error}"))
            })?;
        }
        if let Some(value) = lookup(ENV_ACCESS_TOKEN) {
            self.access_token = Some(value);
        }
        if let Some(value) = lookup(ENV_AUTH_REQUIRED) {
            self.auth_required = parse_flag(&value).ok_or_else(|| {
                Error::Config(format!("{ENV_AUTH_REQUIRED} must be true or false"))
            })?;
        }
        self.normalized()
    }

    pub const fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms)
    }

    /// Credential for the remote API. A configured token is always sent;
    /// without one, sync only runs against endpoints marked public.
    pub fn auth(&self) -> AuthState {
        match AuthState::from_token(self.access_token.clone()) {
            AuthState::Unauthenticated if !self.auth_required => AuthState::NotRequired,
            auth => auth,
        }
    }

    pub fn engine_options(&self) -> Result<EngineOptions> {
        let owner_id = self
            .owner_id
            .clone()
            .ok_or_else(|| Error::Config("owner_id is not configured".to_string()))?;
        Ok(EngineOptions::new(owner_id).with_quiet_period(self.quiet_period()))
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
