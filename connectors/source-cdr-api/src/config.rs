use std::time::Duration;

use cdrsync_types::{SensitiveString, SyncError};
use serde::Deserialize;

/// CDR API connection config from the job YAML.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub url: String,
    pub auth: AuthConfig,
    /// Per-request timeout; the job supplies its own default when unset.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Pause between consecutive page requests.
    #[serde(default)]
    pub page_delay_ms: Option<u64>,
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

/// Authentication scheme accepted by the API.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    Basic {
        username: String,
        password: SensitiveString,
    },
    Bearer {
        token: SensitiveString,
    },
    /// Raw `Authorization` header value.
    Header {
        value: SensitiveString,
    },
}

/// Job-specific fallbacks for the optional request settings.
#[derive(Debug, Clone, Copy)]
pub struct RequestDefaults {
    pub timeout: Duration,
    pub page_delay: Duration,
}

impl Config {
    #[must_use]
    pub fn timeout(&self, defaults: &RequestDefaults) -> Duration {
        self.timeout_secs
            .map_or(defaults.timeout, Duration::from_secs)
    }

    #[must_use]
    pub fn page_delay(&self, defaults: &RequestDefaults) -> Duration {
        self.page_delay_ms
            .map_or(defaults.page_delay, Duration::from_millis)
    }

    /// Collect every problem with this section, prefixed by `section`.
    #[must_use]
    pub fn problems(&self, section: &str) -> Vec<String> {
        let mut problems = Vec::new();
        if self.url.trim().is_empty() {
            problems.push(format!("{section}.url must not be empty"));
        } else if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            problems.push(format!(
                "{section}.url must start with http:// or https:// (got '{}')",
                self.url
            ));
        }
        if self.timeout_secs == Some(0) {
            problems.push(format!("{section}.timeout_secs must be greater than 0"));
        }
        match &self.auth {
            AuthConfig::Basic { username, password } => {
                if username.is_empty() {
                    problems.push(format!("{section}.auth.username must not be empty"));
                }
                if password.is_empty() {
                    problems.push(format!("{section}.auth.password must not be empty"));
                }
            }
            AuthConfig::Bearer { token } => {
                if token.is_empty() {
                    problems.push(format!("{section}.auth.token must not be empty"));
                }
            }
            AuthConfig::Header { value } => {
                if value.is_empty() {
                    problems.push(format!("{section}.auth.value must not be empty"));
                }
            }
        }
        problems
    }

    /// # Errors
    ///
    /// Returns a config error listing every problem found.
    pub fn validate(&self) -> Result<(), SyncError> {
        let problems = self.problems("source");
        if problems.is_empty() {
            Ok(())
        } else {
            Err(SyncError::config("INVALID_SOURCE", problems.join("; ")))
        }
    }
}
