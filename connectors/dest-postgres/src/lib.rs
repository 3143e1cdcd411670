//! PostgreSQL destination for the cdrsync jobs.
//!
//! Every run converges one batch through a private staging table:
//! sweep leftovers, provision `{table}__stg_{millis}`, COPY the rows in
//! committed chunks, `MERGE` into the destination on the key column, and
//! drop the staging table on every path.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
mod copy;
pub mod ddl;
pub mod merge;
pub mod watermark;

use cdrsync_types::{MergeStage, SyncError, TableSchema};
use tokio_postgres::Client;

pub use client::{connect, count_rows, validate, Target};
pub use config::Config;
pub use copy::DEFAULT_CHUNK_ROWS;
pub use ddl::{Backfill, StagingKind};
pub use merge::{merge_batch, MergeOutcome, MergeRequest};
pub use watermark::{probe, DestinationState, Watermark};

/// Drop every orphaned staging table of `target`; returns the dropped names.
///
/// # Errors
///
/// Only the lookup query failing is an error; per-table drop failures are
/// logged.
pub async fn sweep_staging(client: &Client, target: &Target) -> Result<Vec<String>, SyncError> {
    ddl::sweep(client, target).await.map_err(|e| {
        SyncError::transient_db("SWEEP_FAILED", e).at_stage(MergeStage::Sweep)
    })
}

/// Create the schema and destination table when they do not exist.
///
/// # Errors
///
/// Returns a `transient_db` error when the DDL fails.
pub async fn bootstrap_table(
    client: &Client,
    target: &Target,
    schema: &TableSchema,
) -> Result<(), SyncError> {
    ddl::bootstrap(client, target, schema)
        .await
        .map_err(|e| SyncError::transient_db("BOOTSTRAP_FAILED", e))
}

/// Add `missing` columns to a legacy table, backfill them, and create the
/// unique key index, atomically.
///
/// # Errors
///
/// Returns a `schema` error; the transaction is rolled back.
pub async fn migrate_table(
    client: &Client,
    target: &Target,
    schema: &TableSchema,
    missing: &[&str],
    backfills: &[Backfill],
) -> Result<(), SyncError> {
    ddl::migrate(client, target, schema, missing, backfills)
        .await
        .map_err(|e| SyncError::schema("MIGRATION_FAILED", e))
}
