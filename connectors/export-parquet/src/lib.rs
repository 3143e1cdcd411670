//! Bulk export of one PostgreSQL table to a Parquet file and its publication
//! to a versioned S3-compatible bucket.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod reader;
pub mod store;
pub mod types;
pub mod writer;

use std::time::Instant;

use cdrsync_types::SyncError;
use pg_escape::quote_identifier;
use tempfile::NamedTempFile;
use tokio_postgres::Client;
use tracing::{info, warn};

pub use store::{publish, ObjectStoreConfig, PublishOutcome, S3Store, StoredVersion, VersionedStore};
pub use types::ExportColumn;
pub use writer::{ParquetCompression, ParquetSettings, DEFAULT_ROW_GROUP_SIZE};

/// Parquet file produced from a table read.
#[derive(Debug)]
pub struct ExportFile {
    /// Removed when dropped.
    pub file: NamedTempFile,
    pub rows_counted: u64,
    pub rows_written: u64,
    pub bytes: u64,
    pub columns: usize,
    pub read_secs: f64,
    pub write_secs: f64,
}

/// Result of reading the table.
#[derive(Debug)]
pub enum Export {
    /// `COUNT(*)` was zero; nothing was written.
    Empty,
    Written(ExportFile),
}

/// Read every row of `schema.table` and write it to a temporary Parquet file.
///
/// # Errors
///
/// `schema` error when the table does not exist, `transient_db` on query
/// failure, `data` when a value cannot be decoded, `internal` on file I/O.
pub async fn export_table(
    client: &Client,
    schema: &str,
    table: &str,
    settings: &ParquetSettings,
) -> Result<Export, SyncError> {
    let qualified = format!("{}.{}", quote_identifier(schema), quote_identifier(table));

    let columns = reader::discover_columns(client, schema, table)
        .await
        .map_err(|e| SyncError::transient_db("COLUMN_DISCOVERY_FAILED", e))?;
    if columns.is_empty() {
        return Err(SyncError::schema(
            "TABLE_NOT_FOUND",
            format!("table {schema}.{table} does not exist or has no columns"),
        ));
    }

    let rows_counted = reader::count(client, &qualified)
        .await
        .map_err(|e| SyncError::transient_db("COUNT_FAILED", e))?;
    if rows_counted == 0 {
        warn!(table = %qualified, "table is empty, nothing to export");
        return Ok(Export::Empty);
    }

    let read_started = Instant::now();
    let rows = reader::read_all(client, &qualified, &columns)
        .await
        .map_err(|e| SyncError::transient_db("READ_FAILED", e))?;
    let read_secs = read_started.elapsed().as_secs_f64();
    if rows.len() as u64 != rows_counted {
        warn!(
            table = %qualified,
            counted = rows_counted,
            read = rows.len(),
            "row count changed between COUNT(*) and read"
        );
    }
    info!(table = %qualified, rows = rows.len(), columns = columns.len(), read_secs, "table read");

    let write_started = Instant::now();
    let (arrow_schema, batches) = reader::rows_to_batches(&rows, &columns, settings.row_group_size)
        .map_err(|e| SyncError::data("ARROW_ENCODE_FAILED", e))?;
    drop(rows);

    let file = tempfile::Builder::new()
        .prefix(&format!("{table}-"))
        .suffix(".parquet")
        .tempfile()
        .map_err(|e| SyncError::internal("TEMPFILE_FAILED", format!("cannot create temp file: {e}")))?;
    let handle = file
        .reopen()
        .map_err(|e| SyncError::internal("TEMPFILE_FAILED", format!("cannot open temp file: {e}")))?;
    let rows_written = writer::write_batches(handle, &arrow_schema, &batches, settings)
        .map_err(|e| SyncError::internal("PARQUET_WRITE_FAILED", e))?;
    let bytes = file
        .as_file()
        .metadata()
        .map(|m| m.len())
        .map_err(|e| SyncError::internal("TEMPFILE_FAILED", format!("cannot stat temp file: {e}")))?;
    let write_secs = write_started.elapsed().as_secs_f64();

    info!(
        path = %file.path().display(),
        rows = rows_written,
        bytes,
        compression = ?settings.compression,
        write_secs,
        "parquet file written"
    );

    Ok(Export::Written(ExportFile {
        file,
        rows_counted,
        rows_written,
        bytes,
        columns: columns.len(),
        read_secs,
        write_secs,
    }))
}
