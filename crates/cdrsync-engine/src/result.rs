//! Job result types.

use dest_postgres::MergeOutcome;
use export_parquet::PublishOutcome;
use serde::Serialize;

use crate::transform::TransformStats;
use crate::window::FetchWindow;

/// How a sync run ended.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncStatus {
    /// The API reported no records at all.
    SourceEmpty,
    /// Records were downloaded but none survived the window and filters.
    NothingNew,
    Merged(MergeOutcome),
}

/// Download accounting shared by both sync jobs.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FetchSummary {
    pub reported_total: u64,
    pub total_pages: u32,
    pub pages_fetched: u32,
    pub records: usize,
    /// Set when a page after the first failed and the run used partial data.
    pub stopped_early: Option<String>,
    pub duration_secs: f64,
}

/// Result of `sync-calls` or `sync-raw`.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub job: &'static str,
    pub table: String,
    pub window: FetchWindow,
    /// Orphaned staging tables dropped before and after the merge.
    pub swept: Vec<String>,
    /// Legacy columns added to the destination this run.
    pub migrated_columns: Vec<String>,
    pub created_table: bool,
    pub fetch: FetchSummary,
    pub transform: TransformStats,
    /// Only raw runs without a column descriptor.
    pub degraded_layout: bool,
    #[serde(flatten)]
    pub status: SyncStatus,
    pub duration_secs: f64,
}

impl SyncReport {
    #[must_use]
    pub fn merged_rows(&self) -> u64 {
        match &self.status {
            SyncStatus::Merged(outcome) => outcome.merged_rows,
            _ => 0,
        }
    }
}

/// Result of `export`.
#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    pub table: String,
    pub rows: u64,
    pub bytes: u64,
    pub columns: usize,
    pub read_secs: f64,
    pub write_secs: f64,
    /// `None` for an empty table, a dry run, or a local-only export.
    pub publish: Option<PublishOutcome>,
    /// Local copy written with `--output`.
    pub output: Option<String>,
    pub skipped_empty: bool,
    pub dry_run: bool,
    pub duration_secs: f64,
}

/// One line of `check` output.
#[derive(Debug, Clone, Serialize)]
pub struct CheckItem {
    pub name: String,
    pub ok: bool,
    pub detail: String,
}

/// Result of `check`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckReport {
    pub items: Vec<CheckItem>,
}

impl CheckReport {
    pub(crate) fn record(&mut self, name: impl Into<String>, outcome: Result<String, String>) {
        let (ok, detail) = match outcome {
            Ok(detail) => (true, detail),
            Err(detail) => (false, detail),
        };
        self.items.push(CheckItem {
            name: name.into(),
            ok,
            detail,
        });
    }

    #[must_use]
    pub fn all_ok(&self) -> bool {
        self.items.iter().all(|i| i.ok)
    }
}
