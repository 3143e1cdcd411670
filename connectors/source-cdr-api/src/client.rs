//! HTTP client for one page of the CDR API.

use std::time::Duration;

use cdrsync_types::SyncError;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::{AuthConfig, Config, RequestDefaults};

/// One flat CDR object as returned by the API.
pub type RawRecord = Map<String, Value>;

/// Body of a single page response.
#[derive(Debug, Clone, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub total: u64,
    #[serde(rename = "totalPages", default = "default_total_pages")]
    pub total_pages: u32,
    #[serde(default)]
    pub data: Vec<RawRecord>,
}

fn default_total_pages() -> u32 {
    1
}

/// Why a page request did not produce a [`Page`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PageError {
    #[error("page {page}: HTTP {status}: {body}")]
    Status { page: u32, status: u16, body: String },
    #[error("page {page}: request failed: {message}")]
    Transport { page: u32, message: String },
    #[error("page {page}: invalid response body: {message}")]
    Decode { page: u32, message: String },
}

impl PageError {
    #[must_use]
    pub fn page(&self) -> u32 {
        match self {
            Self::Status { page, .. } | Self::Transport { page, .. } | Self::Decode { page, .. } => {
                *page
            }
        }
    }

    /// Structured form used when the failure aborts the run.
    #[must_use]
    pub fn into_sync_error(self) -> SyncError {
        match &self {
            Self::Status { status, .. } if *status == 401 || *status == 403 => {
                SyncError::auth("SOURCE_UNAUTHORIZED", self.to_string())
            }
            Self::Status { .. } => SyncError::transient_network("SOURCE_HTTP_STATUS", self.to_string()),
            Self::Transport { .. } => {
                SyncError::transient_network("SOURCE_REQUEST_FAILED", self.to_string())
            }
            Self::Decode { .. } => {
                SyncError::transient_network("SOURCE_DECODE_FAILED", self.to_string())
            }
        }
    }
}

const MAX_ERROR_BODY: usize = 512;

pub struct CdrApiClient {
    http: reqwest::Client,
    url: String,
    auth: AuthConfig,
    page_delay: Duration,
}

impl CdrApiClient {
    /// # Errors
    ///
    /// Returns a config error when the HTTP client cannot be built.
    pub fn new(config: &Config, defaults: &RequestDefaults) -> Result<Self, SyncError> {
        let mut builder = reqwest::Client::builder().timeout(config.timeout(defaults));
        if config.accept_invalid_certs {
            warn!(url = %config.url, "TLS certificate validation disabled for CDR API");
            builder = builder.danger_accept_invalid_certs(true);
        }
        let http = builder
            .build()
            .map_err(|e| SyncError::config("HTTP_CLIENT", format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            url: config.url.clone(),
            auth: config.auth.clone(),
            page_delay: config.page_delay(defaults),
        })
    }

    #[must_use]
    pub fn page_delay(&self) -> Duration {
        self.page_delay
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Request page `page` (1-based).
    ///
    /// # Errors
    ///
    /// Non-success status, transport failure, or an undecodable body.
    pub async fn fetch_page(&self, page: u32) -> Result<Page, PageError> {
        let request = self.http.get(&self.url).query(&[("page", page)]);
        let request = match &self.auth {
            AuthConfig::Basic { username, password } => {
                request.basic_auth(username, Some(password.expose_secret()))
            }
            AuthConfig::Bearer { token } => request.bearer_auth(token.expose_secret()),
            AuthConfig::Header { value } => {
                request.header(reqwest::header::AUTHORIZATION, value.expose_secret())
            }
        };

        let response = request.send().await.map_err(|e| PageError::Transport {
            page,
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(PageError::Status {
                page,
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await.map_err(|e| PageError::Transport {
            page,
            message: e.to_string(),
        })?;
        let parsed: Page = serde_json::from_slice(&bytes).map_err(|e| PageError::Decode {
            page,
            message: e.to_string(),
        })?;
        debug!(
            page,
            records = parsed.data.len(),
            total = parsed.total,
            total_pages = parsed.total_pages,
            "fetched CDR page"
        );
        Ok(parsed)
    }
}
