//! Destination state probe: table existence, column layout, and watermark.
//!
//! The watermark is never stored separately; each run recomputes it as
//! `MAX(cursor_column)` over the destination table.

use std::collections::HashMap;

use cdrsync_types::SyncError;
use chrono::NaiveDateTime;
use pg_escape::quote_identifier;
use tokio_postgres::Client;
use tracing::debug;

use crate::client::{format_pg_error, Target};

/// Highest cursor value already persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Watermark {
    /// Cursor column is `timestamp`; value is already in the normalized frame.
    Timestamp(NaiveDateTime),
    /// Cursor column holds text as received from the source.
    Text(String),
}

/// What the destination looks like before the run touches it.
#[derive(Debug, Clone, Default)]
pub struct DestinationState {
    pub exists: bool,
    /// Column name to `information_schema.columns.data_type`.
    pub columns: HashMap<String, String>,
    pub watermark: Option<Watermark>,
}

impl DestinationState {
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Columns of `expected` the existing table lacks.
    pub fn missing_columns<'a>(&self, expected: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
        expected
            .into_iter()
            .filter(|c| !self.has_column(c))
            .collect()
    }
}

async fn load_columns(client: &Client, target: &Target) -> Result<HashMap<String, String>, String> {
    let rows = client
        .query(
            "SELECT column_name, data_type FROM information_schema.columns \
             WHERE table_schema = $1 AND table_name = $2",
            &[&target.schema, &target.table],
        )
        .await
        .map_err(|e| format_pg_error(&format!("Column lookup failed for {target}"), &e))?;
    Ok(rows
        .iter()
        .map(|r| (r.get::<_, String>(0), r.get::<_, String>(1)))
        .collect())
}

async fn max_cursor(
    client: &Client,
    target: &Target,
    cursor_column: &str,
    data_type: &str,
) -> Result<Option<Watermark>, String> {
    let column = quote_identifier(cursor_column);
    if data_type.starts_with("timestamp") {
        let sql = format!(
            "SELECT MAX({column})::timestamp FROM {}",
            target.qualified()
        );
        let row = client
            .query_one(&sql, &[])
            .await
            .map_err(|e| format_pg_error(&format!("Watermark query failed for {target}"), &e))?;
        Ok(row.get::<_, Option<NaiveDateTime>>(0).map(Watermark::Timestamp))
    } else {
        let sql = format!("SELECT MAX({column}::text) FROM {}", target.qualified());
        let row = client
            .query_one(&sql, &[])
            .await
            .map_err(|e| format_pg_error(&format!("Watermark query failed for {target}"), &e))?;
        Ok(row
            .get::<_, Option<String>>(0)
            .filter(|s| !s.trim().is_empty())
            .map(Watermark::Text))
    }
}

/// Inspect `target` and compute `MAX(cursor_column)` when both exist.
///
/// # Errors
///
/// Any database failure is a `transient_db` error; a failed probe never
/// degrades to a first load.
pub async fn probe(
    client: &Client,
    target: &Target,
    cursor_column: &str,
) -> Result<DestinationState, SyncError> {
    let columns = load_columns(client, target)
        .await
        .map_err(|e| SyncError::transient_db("PROBE_FAILED", e))?;
    if columns.is_empty() {
        debug!(table = %target, "destination table does not exist");
        return Ok(DestinationState::default());
    }

    let watermark = match columns.get(cursor_column) {
        Some(data_type) => max_cursor(client, target, cursor_column, data_type)
            .await
            .map_err(|e| SyncError::transient_db("WATERMARK_FAILED", e))?,
        None => None,
    };
    debug!(table = %target, ?watermark, "probed destination");

    Ok(DestinationState {
        exists: true,
        columns,
        watermark,
    })
}
