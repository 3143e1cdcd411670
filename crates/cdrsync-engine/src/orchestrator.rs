//! Job orchestrator: runs one sync or export job end to end.
//!
//! Jobs are strictly sequential. Each sync run sweeps orphaned staging
//! tables, probes the destination, downloads every page, windows and
//! transforms the records, and converges them with one staged MERGE.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use cdrsync_types::schema::{CALL_KEY_COLUMN, INSERTED_AT_COLUMN};
use cdrsync_types::{call_table_schema, CallRecord, SyncError, TableSchema};
use chrono::NaiveDateTime;
use dest_postgres::{Backfill, DestinationState, MergeRequest, StagingKind, Target, Watermark};
use export_parquet::{Export, S3Store, VersionedStore};
use source_cdr_api::{fetch_all, CdrApiClient, FetchOutcome, RequestDefaults};
use tokio_postgres::Client;

use crate::config::{validate_config, CallSyncConfig, JobConfig, RawSyncConfig};
use crate::result::{CheckReport, ExportReport, FetchSummary, SyncReport, SyncStatus};
use crate::transform::{CallTransform, RawTransform, TimestampNormalizer, TransformStats};
use crate::window::{normalized_now, FetchWindow};

/// Cursor column of the call table.
pub const CALL_CURSOR_COLUMN: &str = "call_timestamp";

/// Options for [`run_export`].
#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    /// Build the file but skip the object store.
    pub dry_run: bool,
    /// Also copy the Parquet file here.
    pub output: Option<PathBuf>,
}

/// Fill rules for columns added to a legacy call table.
fn call_backfills() -> Vec<Backfill> {
    vec![
        Backfill::new(
            CALL_KEY_COLUMN,
            "to_char(\"call_date\", 'YYYY-MM-DD') || '_' || \"uniqueid\"",
        ),
        Backfill::new(
            CALL_CURSOR_COLUMN,
            "\"call_date\" + \"call_hour\"::time",
        ),
    ]
}

fn fetch_summary(outcome: &FetchOutcome) -> FetchSummary {
    FetchSummary {
        reported_total: outcome.reported_total,
        total_pages: outcome.total_pages,
        pages_fetched: outcome.pages_fetched,
        records: outcome.records.len(),
        stopped_early: outcome.stopped_early.as_ref().map(ToString::to_string),
        duration_secs: outcome.elapsed_secs,
    }
}

/// Resolve a probed watermark into the normalized frame.
///
/// Text cursors hold source text and go through the job's normalizer; an
/// unparseable value is treated as no watermark.
fn watermark_time(
    watermark: Option<&Watermark>,
    normalizer: &TimestampNormalizer,
) -> Option<NaiveDateTime> {
    match watermark? {
        Watermark::Timestamp(ts) => Some(*ts),
        Watermark::Text(text) => {
            let parsed = normalizer.normalize(text);
            if parsed.is_none() {
                tracing::warn!(
                    watermark = %text,
                    "cannot parse text watermark, falling back to the lookback window"
                );
            }
            parsed
        }
    }
}

async fn download(
    source: &source_cdr_api::Config,
    defaults: &RequestDefaults,
) -> Result<FetchOutcome> {
    let api = CdrApiClient::new(source, defaults)?;
    let outcome = fetch_all(&api).await?;
    if let Some(stopped) = &outcome.stopped_early {
        tracing::warn!(
            pages_fetched = outcome.pages_fetched,
            total_pages = outcome.total_pages,
            error = %stopped,
            "pagination stopped early, continuing with partial data"
        );
    }
    Ok(outcome)
}

/// Add the columns an existing legacy table lacks; returns their names.
async fn migrate_missing(
    client: &Client,
    target: &Target,
    schema: &TableSchema,
    state: &DestinationState,
    backfills: &[Backfill],
) -> Result<Vec<String>> {
    if !state.exists {
        return Ok(Vec::new());
    }
    let missing = state.missing_columns(schema.names().chain([INSERTED_AT_COLUMN]));
    if missing.is_empty() {
        return Ok(Vec::new());
    }
    tracing::info!(table = %target, columns = ?missing, "migrating legacy destination table");
    dest_postgres::migrate_table(client, target, schema, &missing, backfills).await?;
    Ok(missing.into_iter().map(str::to_string).collect())
}

/// Drop staging tables left behind by this run's merge, if any slipped
/// through. A failure here does not undo a completed merge.
async fn final_sweep(client: &Client, target: &Target, swept: &mut Vec<String>) {
    match dest_postgres::sweep_staging(client, target).await {
        Ok(dropped) => swept.extend(dropped),
        Err(e) => tracing::warn!(table = %target, error = %e, "post-merge staging sweep failed"),
    }
}

/// Sync the normalized call table.
///
/// # Errors
///
/// Fails on a missing `calls` section, a page-1 source failure, or any
/// destination error. A failed run leaves the destination as it was.
pub async fn run_call_sync(config: &JobConfig) -> Result<SyncReport> {
    let calls: &CallSyncConfig = config
        .calls
        .as_ref()
        .context("config has no `calls` section")?;
    let started = Instant::now();
    let target = Target::new(&config.database.schema, &calls.table);
    let schema = call_table_schema();
    let normalizer = TimestampNormalizer::new(calls.timestamp_offset_hours);

    tracing::info!(table = %target, url = %calls.source.url, "starting call sync");

    let client = dest_postgres::connect(&config.database).await?;
    let mut swept = dest_postgres::sweep_staging(&client, &target).await?;

    let mut state = dest_postgres::probe(&client, &target, CALL_CURSOR_COLUMN).await?;
    let migrated_columns =
        migrate_missing(&client, &target, &schema, &state, &call_backfills()).await?;
    if !migrated_columns.is_empty() {
        state = dest_postgres::probe(&client, &target, CALL_CURSOR_COLUMN).await?;
    }

    let watermark = watermark_time(state.watermark.as_ref(), &TimestampNormalizer::new(0));
    let window = FetchWindow::new(
        normalized_now(calls.timestamp_offset_hours),
        watermark,
        calls.window.lookback_days,
        calls.window.overlap_days,
    );
    tracing::info!(
        lower_bound = %window.lower_bound,
        watermark = ?window.watermark,
        "fetch window"
    );

    let fetched = download(&calls.source, &CallSyncConfig::REQUEST_DEFAULTS).await?;
    let fetch = fetch_summary(&fetched);
    let source_empty = fetched.is_source_empty();

    let transform = CallTransform {
        normalizer,
        filters: &calls.filters,
        rules: &calls.call_type,
    };
    let (records, stats) = transform.apply(fetched.records, &window);
    tracing::info!(
        input = stats.input,
        outside_window = stats.outside_window,
        filtered = stats.filtered,
        duplicates = stats.duplicates,
        output = stats.output,
        "transformed call records"
    );

    let mut created_table = false;
    let status = if source_empty {
        SyncStatus::SourceEmpty
    } else if records.is_empty() {
        tracing::info!(table = %target, "no new records in window");
        SyncStatus::NothingNew
    } else {
        if !state.exists {
            dest_postgres::bootstrap_table(&client, &target, &schema).await?;
            created_table = true;
        }
        let rows: Vec<Vec<Option<String>>> = records.iter().map(CallRecord::to_row).collect();
        let outcome = dest_postgres::merge_batch(
            &client,
            MergeRequest {
                target: &target,
                schema: &schema,
                staging: StagingKind::Typed,
                rows: &rows,
                chunk_rows: calls.chunk_rows,
            },
        )
        .await?;
        final_sweep(&client, &target, &mut swept).await;
        SyncStatus::Merged(outcome)
    };

    let report = SyncReport {
        job: "sync-calls",
        table: target.to_string(),
        window,
        swept,
        migrated_columns,
        created_table,
        fetch,
        transform: stats,
        degraded_layout: false,
        status,
        duration_secs: started.elapsed().as_secs_f64(),
    };
    tracing::info!(
        table = %report.table,
        merged = report.merged_rows(),
        duration_secs = report.duration_secs,
        "call sync finished"
    );
    Ok(report)
}

/// Sync the source-shaped raw table.
///
/// # Errors
///
/// Fails on a missing `raw` section, a page-1 source failure, a layout that
/// cannot be resolved, or any destination error.
pub async fn run_raw_sync(config: &JobConfig) -> Result<SyncReport> {
    let raw: &RawSyncConfig = config
        .raw
        .as_ref()
        .context("config has no `raw` section")?;
    let descriptor = raw
        .descriptor()
        .map_err(|e| anyhow::anyhow!("raw.columns: {e}"))?;
    let started = Instant::now();
    let target = Target::new(&config.database.schema, &raw.table);
    let normalizer = TimestampNormalizer::new(raw.timestamp_offset_hours);

    tracing::info!(table = %target, url = %raw.source.url, "starting raw sync");

    let client = dest_postgres::connect(&config.database).await?;
    let mut swept = dest_postgres::sweep_staging(&client, &target).await?;
    let state = dest_postgres::probe(&client, &target, &raw.cursor_column).await?;

    let window = FetchWindow::new(
        normalized_now(raw.timestamp_offset_hours),
        watermark_time(state.watermark.as_ref(), &normalizer),
        raw.window.lookback_days,
        raw.window.overlap_days,
    );
    tracing::info!(
        lower_bound = %window.lower_bound,
        watermark = ?window.watermark,
        "fetch window"
    );

    let fetched = download(&raw.source, &RawSyncConfig::REQUEST_DEFAULTS).await?;
    let fetch = fetch_summary(&fetched);

    let mut report = SyncReport {
        job: "sync-raw",
        table: target.to_string(),
        window,
        swept: Vec::new(),
        migrated_columns: Vec::new(),
        created_table: false,
        fetch,
        transform: TransformStats::default(),
        degraded_layout: descriptor.is_none(),
        status: SyncStatus::SourceEmpty,
        duration_secs: 0.0,
    };

    if fetched.is_source_empty() {
        report.swept = swept;
        report.duration_secs = started.elapsed().as_secs_f64();
        return Ok(report);
    }

    let transform = RawTransform {
        normalizer,
        descriptor: descriptor.as_ref(),
        key_column: &raw.key_column,
        cursor_column: &raw.cursor_column,
    };
    let (batch, stats) = transform
        .apply(fetched.records, &window)
        .map_err(|e| SyncError::data("LAYOUT_UNRESOLVED", e))?;
    tracing::info!(
        input = stats.input,
        outside_window = stats.outside_window,
        rejected = stats.rejected,
        duplicates = stats.duplicates,
        output = stats.output,
        "transformed raw records"
    );
    report.transform = stats;

    match batch {
        Some(batch) if !batch.rows.is_empty() => {
            report.degraded_layout = batch.degraded;
            if state.exists {
                report.migrated_columns =
                    migrate_missing(&client, &target, &batch.schema, &state, &[]).await?;
            } else {
                dest_postgres::bootstrap_table(&client, &target, &batch.schema).await?;
                report.created_table = true;
            }

            let outcome = dest_postgres::merge_batch(
                &client,
                MergeRequest {
                    target: &target,
                    schema: &batch.schema,
                    staging: StagingKind::WideText,
                    rows: &batch.rows,
                    chunk_rows: raw.chunk_rows,
                },
            )
            .await?;
            final_sweep(&client, &target, &mut swept).await;
            report.status = SyncStatus::Merged(outcome);
        }
        _ => {
            tracing::info!(table = %target, "no new records in window");
            report.status = SyncStatus::NothingNew;
        }
    }

    report.swept = swept;
    report.duration_secs = started.elapsed().as_secs_f64();
    tracing::info!(
        table = %report.table,
        merged = report.merged_rows(),
        duration_secs = report.duration_secs,
        "raw sync finished"
    );
    Ok(report)
}

/// Export the configured table to Parquet and publish it.
///
/// # Errors
///
/// Fails on a missing `export` section, any read or write failure, or a
/// failed upload. Version purge failures are only logged.
pub async fn run_export(config: &JobConfig, options: &ExportOptions) -> Result<ExportReport> {
    let export = config
        .export
        .as_ref()
        .context("config has no `export` section")?;
    let started = Instant::now();
    let schema = export
        .schema
        .as_deref()
        .unwrap_or(&config.database.schema);

    tracing::info!(
        table = %format!("{schema}.{}", export.table),
        bucket = %export.store.bucket,
        key = %export.store.key,
        dry_run = options.dry_run,
        "starting export"
    );

    let client = dest_postgres::connect(&config.database).await?;
    let mut report = ExportReport {
        table: format!("{schema}.{}", export.table),
        rows: 0,
        bytes: 0,
        columns: 0,
        read_secs: 0.0,
        write_secs: 0.0,
        publish: None,
        output: None,
        skipped_empty: false,
        dry_run: options.dry_run,
        duration_secs: 0.0,
    };

    let file = match export_parquet::export_table(&client, schema, &export.table, &export.parquet).await? {
        Export::Empty => {
            report.skipped_empty = true;
            report.duration_secs = started.elapsed().as_secs_f64();
            return Ok(report);
        }
        Export::Written(file) => file,
    };
    report.rows = file.rows_written;
    report.bytes = file.bytes;
    report.columns = file.columns;
    report.read_secs = file.read_secs;
    report.write_secs = file.write_secs;

    if let Some(output) = &options.output {
        tokio::fs::copy(file.file.path(), output)
            .await
            .with_context(|| format!("Failed to copy export to {}", output.display()))?;
        tracing::info!(path = %output.display(), "wrote local copy");
        report.output = Some(output.display().to_string());
    }

    if options.dry_run {
        tracing::info!("dry run, skipping upload");
    } else {
        let store = S3Store::connect(&export.store).await;
        let outcome = export_parquet::publish(&store, &export.store.key, file.file.path()).await?;
        report.publish = Some(outcome);
    }

    report.duration_secs = started.elapsed().as_secs_f64();
    tracing::info!(
        table = %report.table,
        rows = report.rows,
        bytes = report.bytes,
        duration_secs = report.duration_secs,
        "export finished"
    );
    Ok(report)
}

async fn probe_source(source: &source_cdr_api::Config, defaults: &RequestDefaults) -> Result<String, String> {
    let api = CdrApiClient::new(source, defaults).map_err(|e| e.to_string())?;
    let page = api.fetch_page(1).await.map_err(|e| e.to_string())?;
    Ok(format!(
        "{} reports {} records over {} pages",
        api.url(),
        page.total,
        page.total_pages
    ))
}

/// Check configuration and connectivity for every configured job without
/// writing anything.
pub async fn check(config: &JobConfig) -> CheckReport {
    tracing::info!("checking job configuration");
    let mut report = CheckReport::default();

    report.record(
        "config",
        validate_config(config)
            .map(|()| "valid".to_string())
            .map_err(|e| e.to_string()),
    );
    report.record(
        "database",
        dest_postgres::validate(&config.database)
            .await
            .map_err(|e| e.to_string()),
    );
    if let Some(calls) = &config.calls {
        report.record(
            "calls source",
            probe_source(&calls.source, &CallSyncConfig::REQUEST_DEFAULTS).await,
        );
    }
    if let Some(raw) = &config.raw {
        report.record(
            "raw source",
            probe_source(&raw.source, &RawSyncConfig::REQUEST_DEFAULTS).await,
        );
    }
    if let Some(export) = &config.export {
        let store = S3Store::connect(&export.store).await;
        report.record(
            "object store",
            store
                .list_versions(&export.store.key)
                .await
                .map(|v| format!("{} versions of {}", v.len(), export.store.key)),
        );
    }
    report
}
