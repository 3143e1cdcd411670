//! Per-run staging table lifecycle: naming, sweep, provision, drop.

use cdrsync_types::TableSchema;
use chrono::Utc;
use pg_escape::quote_identifier;
use tokio_postgres::Client;
use tracing::{debug, info, warn};

use crate::client::{format_pg_error, qualify, Target};

const STAGING_MARKER: &str = "__stg_";

/// Column layout of a staging table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagingKind {
    /// `CREATE TABLE .. (LIKE dest)`: values load straight into native types.
    Typed,
    /// Every column `TEXT`; the merge casts to the destination types.
    WideText,
}

/// `{table}__stg_{unix_millis}` for a run starting now.
#[must_use]
pub fn staging_table_name(table: &str) -> String {
    let millis = Utc::now().timestamp_millis();
    format!("{table}{STAGING_MARKER}{millis}")
}

/// Whether `candidate` is a staging table created for `table`.
#[must_use]
pub fn is_staging_table_for(table: &str, candidate: &str) -> bool {
    candidate
        .strip_prefix(table)
        .and_then(|rest| rest.strip_prefix(STAGING_MARKER))
        .is_some_and(|suffix| !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()))
}

/// Drop every leftover staging table of `target`.
///
/// Individual drop failures are logged and skipped; they will be retried by
/// the next sweep.
pub(crate) async fn sweep(client: &Client, target: &Target) -> Result<Vec<String>, String> {
    let prefix = format!("{}{STAGING_MARKER}", target.table);
    let rows = client
        .query(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = $1 AND starts_with(table_name, $2)",
            &[&target.schema, &prefix],
        )
        .await
        .map_err(|e| format_pg_error(&format!("Staging sweep lookup failed for {target}"), &e))?;

    let mut dropped = Vec::new();
    for row in rows {
        let name: String = row.get(0);
        if !is_staging_table_for(&target.table, &name) {
            continue;
        }
        match drop_staging(client, &target.schema, &name).await {
            Ok(()) => {
                info!(staging = %name, "swept orphaned staging table");
                dropped.push(name);
            }
            Err(e) => warn!(staging = %name, error = %e, "failed to sweep staging table"),
        }
    }
    Ok(dropped)
}

/// Create an empty staging table for one run.
pub(crate) async fn provision(
    client: &Client,
    target: &Target,
    staging: &str,
    kind: StagingKind,
    schema: &TableSchema,
) -> Result<(), String> {
    let sql = provision_sql(target, staging, kind, schema);
    client
        .execute(&sql, &[])
        .await
        .map_err(|e| format_pg_error(&format!("CREATE staging table {staging} failed"), &e))?;
    debug!(staging, ?kind, "provisioned staging table");
    Ok(())
}

pub(crate) fn provision_sql(
    target: &Target,
    staging: &str,
    kind: StagingKind,
    schema: &TableSchema,
) -> String {
    let staging_table = qualify(&target.schema, staging);
    match kind {
        StagingKind::Typed => format!(
            "CREATE TABLE {} (LIKE {})",
            staging_table,
            target.qualified()
        ),
        StagingKind::WideText => {
            let cols = schema
                .names()
                .map(|n| format!("{} TEXT", quote_identifier(n)))
                .collect::<Vec<_>>()
                .join(", ");
            format!("CREATE TABLE {staging_table} ({cols})")
        }
    }
}

pub(crate) async fn drop_staging(
    client: &Client,
    target_schema: &str,
    staging: &str,
) -> Result<(), String> {
    let sql = format!("DROP TABLE IF EXISTS {}", qualify(target_schema, staging));
    client
        .execute(&sql, &[])
        .await
        .map_err(|e| format_pg_error(&format!("DROP staging table {staging} failed"), &e))?;
    debug!(staging, "dropped staging table");
    Ok(())
}
