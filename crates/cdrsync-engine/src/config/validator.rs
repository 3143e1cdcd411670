//! Semantic validation for parsed job configuration values.

use anyhow::{bail, Result};
use cdrsync_types::schema::validate_identifier;

use crate::config::types::{CallSyncConfig, ExportConfig, JobConfig, RawSyncConfig, WindowConfig};

/// Longest destination table name; leaves room for the staging suffix
/// `__stg_{13-digit millis}` within PostgreSQL's 63-byte identifier limit.
pub const MAX_TABLE_NAME_LEN: usize = 40;

fn validate_table_name(table: &str, context: &str, errors: &mut Vec<String>) {
    if let Err(e) = validate_identifier(table) {
        errors.push(format!("{context}.table: {e}"));
    } else if table.len() > MAX_TABLE_NAME_LEN {
        errors.push(format!(
            "{context}.table: '{table}' is longer than {MAX_TABLE_NAME_LEN} characters"
        ));
    }
}

fn validate_window(window: &WindowConfig, context: &str, errors: &mut Vec<String>) {
    if window.lookback_days <= 0 {
        errors.push(format!("{context}.lookback_days must be > 0"));
    }
    if window.overlap_days < 0 {
        errors.push(format!("{context}.overlap_days must be >= 0"));
    }
}

fn validate_offset(hours: i64, context: &str, errors: &mut Vec<String>) {
    if !(-24..=24).contains(&hours) {
        errors.push(format!(
            "{context}.timestamp_offset_hours must be between -24 and 24 (got {hours})"
        ));
    }
}

fn validate_calls(calls: &CallSyncConfig, errors: &mut Vec<String>) {
    errors.extend(calls.source.problems("calls.source"));
    validate_table_name(&calls.table, "calls", errors);
    validate_window(&calls.window, "calls", errors);
    validate_offset(calls.timestamp_offset_hours, "calls", errors);
    if calls.chunk_rows == 0 {
        errors.push("calls.chunk_rows must be at least 1".to_string());
    }
    if calls.call_type.inbound_marker.is_empty() || calls.call_type.outbound_marker.is_empty() {
        errors.push("calls.call_type markers must not be empty".to_string());
    }
}

fn validate_raw(raw: &RawSyncConfig, errors: &mut Vec<String>) {
    errors.extend(raw.source.problems("raw.source"));
    validate_table_name(&raw.table, "raw", errors);
    validate_window(&raw.window, "raw", errors);
    validate_offset(raw.timestamp_offset_hours, "raw", errors);
    if raw.chunk_rows == 0 {
        errors.push("raw.chunk_rows must be at least 1".to_string());
    }
    if let Err(e) = validate_identifier(&raw.key_column) {
        errors.push(format!("raw.key_column: {e}"));
    }
    if let Err(e) = validate_identifier(&raw.cursor_column) {
        errors.push(format!("raw.cursor_column: {e}"));
    }
    match raw.descriptor() {
        Ok(Some(schema)) => {
            if schema.position(&raw.cursor_column).is_none() {
                errors.push(format!(
                    "raw.columns must include the cursor column '{}'",
                    raw.cursor_column
                ));
            }
        }
        Ok(None) => {}
        Err(e) => errors.push(format!("raw.columns: {e}")),
    }
}

fn validate_export(export: &ExportConfig, default_schema: &str, errors: &mut Vec<String>) {
    if let Err(e) = validate_identifier(&export.table) {
        errors.push(format!("export.table: {e}"));
    }
    if let Err(e) = validate_identifier(export.schema.as_deref().unwrap_or(default_schema)) {
        errors.push(format!("export.schema: {e}"));
    }
    if export.parquet.row_group_size == 0 {
        errors.push("export.parquet.row_group_size must be at least 1".to_string());
    }
    errors.extend(export.store.problems("export.store"));
}

/// Validate a parsed config.
/// Returns `Ok(())` if valid, Err with all validation errors if not.
///
/// # Errors
///
/// Returns an error listing all validation failures found in the config.
pub fn validate_config(config: &JobConfig) -> Result<()> {
    let mut errors = config.database.problems("database");

    if config.calls.is_none() && config.raw.is_none() && config.export.is_none() {
        errors.push("config must define at least one of: calls, raw, export".to_string());
    }
    if let Some(calls) = &config.calls {
        validate_calls(calls, &mut errors);
    }
    if let Some(raw) = &config.raw {
        validate_raw(raw, &mut errors);
    }
    if let Some(export) = &config.export {
        validate_export(export, &config.database.schema, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        bail!(
            "Config validation failed:\n  - {}",
            errors.join("\n  - ")
        )
    }
}
