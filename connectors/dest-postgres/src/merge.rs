//! Staging-and-merge upsert: provision, load, converge, cleanup.

use std::time::Instant;

use cdrsync_types::schema::INSERTED_AT_COLUMN;
use cdrsync_types::{ColumnType, MergeStage, SyncError, TableSchema};
use pg_escape::quote_identifier;
use serde::Serialize;
use tokio_postgres::Client;
use tracing::{info, warn};

use crate::client::{count_rows, format_pg_error, qualify, Target};
use crate::copy::copy_rows;
use crate::ddl::{drop_staging, provision, staging_table_name, StagingKind};

/// One batch to converge into the destination.
#[derive(Debug)]
pub struct MergeRequest<'a> {
    pub target: &'a Target,
    pub schema: &'a TableSchema,
    pub staging: StagingKind,
    /// Rows in `schema` column order, values in canonical text form.
    pub rows: &'a [Vec<Option<String>>],
    pub chunk_rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeOutcome {
    pub staging_table: String,
    pub staged_rows: u64,
    /// Rows inserted or updated by the MERGE statement.
    pub merged_rows: u64,
    /// Destination row count after the merge.
    pub table_rows: u64,
    pub chunks: usize,
    pub load_secs: f64,
    pub merge_secs: f64,
    pub staging_dropped: bool,
}

fn source_expr(name: &str, column_type: ColumnType, staging: StagingKind) -> String {
    let col = format!("s.{}", quote_identifier(name));
    match (staging, column_type) {
        (StagingKind::WideText, ColumnType::Integer | ColumnType::Date | ColumnType::Timestamp) => {
            format!("{col}::{}", column_type.pg_type())
        }
        _ => col,
    }
}

/// Single `MERGE` converging `staging` into `target` on the key column.
pub(crate) fn merge_sql(target: &Target, staging: &str, schema: &TableSchema, kind: StagingKind) -> String {
    let key = schema.key_column();
    let key_spec = &schema.columns()[schema.key_index()];
    let inserted_at = quote_identifier(INSERTED_AT_COLUMN);

    let mut updates: Vec<String> = schema
        .columns()
        .iter()
        .filter(|c| c.name != key)
        .map(|c| {
            format!(
                "{} = {}",
                quote_identifier(&c.name),
                source_expr(&c.name, c.column_type, kind)
            )
        })
        .collect();
    updates.push(format!("{inserted_at} = now()"));

    let mut insert_cols: Vec<String> = schema.names().map(|n| quote_identifier(n).into_owned()).collect();
    insert_cols.push(inserted_at.clone().into_owned());
    let mut insert_vals: Vec<String> = schema
        .columns()
        .iter()
        .map(|c| source_expr(&c.name, c.column_type, kind))
        .collect();
    insert_vals.push("now()".to_string());

    format!(
        "MERGE INTO {dest} AS d USING {stg} AS s ON d.{key_col} = {key_src} \
         WHEN MATCHED THEN UPDATE SET {updates} \
         WHEN NOT MATCHED THEN INSERT ({cols}) VALUES ({vals})",
        dest = target.qualified(),
        stg = qualify(&target.schema, staging),
        key_col = quote_identifier(key),
        key_src = source_expr(key, key_spec.column_type, kind),
        updates = updates.join(", "),
        cols = insert_cols.join(", "),
        vals = insert_vals.join(", "),
    )
}

/// Drop the staging table on a failure path, then tag the error.
async fn fail(client: &Client, target: &Target, staging: &str, stage: MergeStage, message: String) -> SyncError {
    let dropped = match drop_staging(client, &target.schema, staging).await {
        Ok(()) => true,
        Err(e) => {
            warn!(staging, error = %e, "failed to drop staging table after error, next sweep will remove it");
            false
        }
    };
    let code = match stage {
        MergeStage::Provision => "STAGING_PROVISION_FAILED",
        MergeStage::Load => "STAGING_LOAD_FAILED",
        _ => "MERGE_FAILED",
    };
    SyncError::transient_db(code, message)
        .at_stage(stage)
        .with_staging_dropped(dropped)
}

/// Run provision, load, converge, and cleanup for one batch.
///
/// The staging table is dropped on every path; on error the drop happens
/// before the error is returned.
///
/// # Errors
///
/// A `transient_db` error tagged with the failing [`MergeStage`].
pub async fn merge_batch(client: &Client, req: MergeRequest<'_>) -> Result<MergeOutcome, SyncError> {
    let staging = staging_table_name(&req.target.table);

    if let Err(e) = provision(client, req.target, &staging, req.staging, req.schema).await {
        return Err(fail(client, req.target, &staging, MergeStage::Provision, e).await);
    }
    info!(staging = %staging, rows = req.rows.len(), "staging batch");

    let load_started = Instant::now();
    let staging_qualified = qualify(&req.target.schema, &staging);
    let (staged_rows, chunks) = match copy_rows(
        client,
        &staging_qualified,
        req.schema.names(),
        req.rows,
        req.chunk_rows,
    )
    .await
    {
        Ok(v) => v,
        Err(e) => return Err(fail(client, req.target, &staging, MergeStage::Load, e).await),
    };
    let load_secs = load_started.elapsed().as_secs_f64();
    info!(staging = %staging, staged_rows, chunks, load_secs, "staging load complete");

    let merge_started = Instant::now();
    let sql = merge_sql(req.target, &staging, req.schema, req.staging);
    let merged_rows = match client.execute(sql.as_str(), &[]).await {
        Ok(n) => n,
        Err(e) => {
            let message = format_pg_error(&format!("MERGE into {} failed", req.target), &e);
            return Err(fail(client, req.target, &staging, MergeStage::Converge, message).await);
        }
    };
    let merge_secs = merge_started.elapsed().as_secs_f64();

    let staging_dropped = match drop_staging(client, &req.target.schema, &staging).await {
        Ok(()) => true,
        Err(e) => {
            warn!(staging = %staging, error = %e, "failed to drop staging table, next sweep will remove it");
            false
        }
    };

    let table_rows = count_rows(client, req.target)
        .await
        .map_err(|e| e.at_stage(MergeStage::Cleanup))?;
    info!(
        table = %req.target,
        merged_rows,
        table_rows,
        merge_secs,
        "merge complete"
    );

    Ok(MergeOutcome {
        staging_table: staging,
        staged_rows,
        merged_rows,
        table_rows,
        chunks,
        load_secs,
        merge_secs,
        staging_dropped,
    })
}
