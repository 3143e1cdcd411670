//! Job configuration types.
//!
//! One YAML file holds the shared `database` section plus one optional
//! section per job. Running a job whose section is absent is a config error.

use std::time::Duration;

use cdrsync_types::{ColumnSpec, TableSchema};
use serde::Deserialize;

use crate::transform::{BusinessFilters, CallTypeRules};

pub const DEFAULT_LOOKBACK_DAYS: i64 = 30;
pub const DEFAULT_OVERLAP_DAYS: i64 = 3;
pub const CALLS_DEFAULT_OFFSET_HOURS: i64 = -5;

fn default_lookback_days() -> i64 {
    DEFAULT_LOOKBACK_DAYS
}

fn default_overlap_days() -> i64 {
    DEFAULT_OVERLAP_DAYS
}

fn default_chunk_rows() -> usize {
    dest_postgres::DEFAULT_CHUNK_ROWS
}

fn default_calls_offset() -> i64 {
    CALLS_DEFAULT_OFFSET_HOURS
}

fn default_calls_table() -> String {
    "cdr_calls".to_string()
}

fn default_raw_table() -> String {
    "cdr_raw".to_string()
}

fn default_key_column() -> String {
    "uniqueid".to_string()
}

fn default_cursor_column() -> String {
    "calldate".to_string()
}

/// Top-level config file.
#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    pub database: dest_postgres::Config,
    #[serde(default)]
    pub calls: Option<CallSyncConfig>,
    #[serde(default)]
    pub raw: Option<RawSyncConfig>,
    #[serde(default)]
    pub export: Option<ExportConfig>,
}

/// Settings shared by both incremental sync jobs.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,
    #[serde(default = "default_overlap_days")]
    pub overlap_days: i64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            overlap_days: DEFAULT_OVERLAP_DAYS,
        }
    }
}

/// `calls:` section (normalized call table).
#[derive(Debug, Clone, Deserialize)]
pub struct CallSyncConfig {
    pub source: source_cdr_api::Config,
    #[serde(default = "default_calls_table")]
    pub table: String,
    #[serde(default = "default_calls_offset")]
    pub timestamp_offset_hours: i64,
    #[serde(flatten)]
    pub window: WindowConfig,
    #[serde(default = "default_chunk_rows")]
    pub chunk_rows: usize,
    #[serde(default)]
    pub filters: BusinessFilters,
    #[serde(default)]
    pub call_type: CallTypeRules,
}

impl CallSyncConfig {
    pub const REQUEST_DEFAULTS: source_cdr_api::RequestDefaults = source_cdr_api::RequestDefaults {
        timeout: Duration::from_secs(30),
        page_delay: Duration::ZERO,
    };
}

/// `raw:` section (source-shaped passthrough table).
#[derive(Debug, Clone, Deserialize)]
pub struct RawSyncConfig {
    pub source: source_cdr_api::Config,
    #[serde(default = "default_raw_table")]
    pub table: String,
    #[serde(default = "default_key_column")]
    pub key_column: String,
    #[serde(default = "default_cursor_column")]
    pub cursor_column: String,
    #[serde(default)]
    pub timestamp_offset_hours: i64,
    #[serde(flatten)]
    pub window: WindowConfig,
    #[serde(default = "default_chunk_rows")]
    pub chunk_rows: usize,
    /// Column descriptor; when absent the layout is inferred from the first
    /// record as all-text columns.
    #[serde(default)]
    pub columns: Option<Vec<ColumnSpec>>,
}

impl RawSyncConfig {
    pub const REQUEST_DEFAULTS: source_cdr_api::RequestDefaults = source_cdr_api::RequestDefaults {
        timeout: Duration::from_secs(60),
        page_delay: Duration::from_millis(300),
    };

    /// Configured descriptor, if any.
    ///
    /// # Errors
    ///
    /// Returns a message when the descriptor is invalid.
    pub fn descriptor(&self) -> Result<Option<TableSchema>, String> {
        self.columns
            .clone()
            .map(|cols| TableSchema::new(cols, &self.key_column))
            .transpose()
    }
}

/// `export:` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    pub table: String,
    /// Defaults to `database.schema`.
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub parquet: export_parquet::ParquetSettings,
    pub store: export_parquet::ObjectStoreConfig,
}
