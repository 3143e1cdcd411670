//! Source-shaped passthrough rows for the raw table.
//!
//! With a configured descriptor every record is checked against it: unknown
//! fields are dropped, absent fields become NULL, and typed fields must
//! coerce or the record is rejected. Without one the layout is inferred
//! as all-text columns from the first in-window record with a key.

use std::collections::BTreeSet;

use cdrsync_types::record::{DATE_FORMAT, TIMESTAMP_FORMAT};
use cdrsync_types::{ColumnSpec, ColumnType, TableSchema};
use chrono::NaiveDate;
use serde_json::Value;
use source_cdr_api::RawRecord;
use tracing::warn;

use super::timestamp::TimestampNormalizer;
use super::value::{parse_integer, scalar_text};
use super::{dedupe_keep_last, TransformStats};
use crate::window::FetchWindow;

/// Rows ready for the raw table, in `schema` column order.
#[derive(Debug, Clone)]
pub struct RawBatch {
    pub schema: TableSchema,
    pub rows: Vec<Vec<Option<String>>>,
    /// Layout was inferred rather than configured.
    pub degraded: bool,
    /// Source fields not part of the layout, each listed once.
    pub unknown_fields: Vec<String>,
}

pub struct RawTransform<'a> {
    pub normalizer: TimestampNormalizer,
    pub descriptor: Option<&'a TableSchema>,
    pub key_column: &'a str,
    pub cursor_column: &'a str,
}

/// Why a single field failed to coerce.
#[derive(Debug)]
struct Rejection {
    column: String,
    expected: ColumnType,
}

impl RawTransform<'_> {
    /// Layout used for this batch: the descriptor, or all-text columns named
    /// after the first admitted record that carries both key and cursor.
    ///
    /// `Ok(None)` means no admitted record can seed an inferred layout.
    ///
    /// # Errors
    ///
    /// Returns a message when the inferred names are not valid identifiers.
    pub fn resolve_schema(
        &self,
        admitted: &[RawRecord],
    ) -> Result<Option<(TableSchema, bool)>, String> {
        if let Some(descriptor) = self.descriptor {
            return Ok(Some((descriptor.clone(), false)));
        }
        let Some(seed) = admitted.iter().find(|record| {
            record.contains_key(self.cursor_column)
                && record
                    .get(self.key_column)
                    .and_then(scalar_text)
                    .is_some_and(|k| !k.trim().is_empty())
        }) else {
            return Ok(None);
        };
        let schema = TableSchema::wide_text(seed.keys().cloned(), self.key_column)
            .map_err(|e| format!("cannot infer a column layout: {e}"))?;
        warn!(
            columns = schema.len(),
            "no column descriptor configured; storing every field as text"
        );
        Ok(Some((schema, true)))
    }

    /// Window, coerce, and dedupe a downloaded batch.
    ///
    /// Returns no batch when nothing in the window can seed an inferred
    /// layout.
    ///
    /// # Errors
    ///
    /// Fails only when the layout cannot be resolved.
    pub fn apply(
        &self,
        records: Vec<RawRecord>,
        window: &FetchWindow,
    ) -> Result<(Option<RawBatch>, TransformStats), String> {
        let mut stats = TransformStats {
            input: records.len(),
            ..TransformStats::default()
        };

        let mut admitted = Vec::with_capacity(records.len());
        for record in records {
            let Some(ts) = self.normalizer.normalize_value(record.get(self.cursor_column)) else {
                stats.bad_timestamp += 1;
                continue;
            };
            if !window.admits(ts) {
                stats.outside_window += 1;
                continue;
            }
            admitted.push(record);
        }
        if stats.bad_timestamp > 0 {
            warn!(
                count = stats.bad_timestamp,
                cursor = self.cursor_column,
                "dropped records with missing or unparseable cursor"
            );
        }

        let Some((schema, degraded)) = self.resolve_schema(&admitted)? else {
            stats.missing_key = admitted.len();
            if stats.missing_key > 0 {
                warn!(count = stats.missing_key, key = self.key_column, "dropped records without key");
            }
            return Ok((None, stats));
        };

        let mut unknown = BTreeSet::new();
        let key_index = schema.key_index();
        let mut kept = Vec::with_capacity(admitted.len());
        for record in admitted {
            for field in record.keys() {
                if schema.position(field).is_none() && !unknown.contains(field) {
                    unknown.insert(field.clone());
                }
            }

            let row = match self.row(&schema, &record) {
                Ok(row) => row,
                Err(rejection) => {
                    warn!(
                        column = %rejection.column,
                        expected = %rejection.expected,
                        "rejected record with uncoercible field"
                    );
                    stats.rejected += 1;
                    continue;
                }
            };
            if row[key_index].as_deref().map_or(true, |k| k.trim().is_empty()) {
                stats.missing_key += 1;
                continue;
            }
            kept.push(row);
        }

        let before = kept.len();
        let rows = dedupe_keep_last(kept, |row| row[key_index].clone());
        stats.duplicates = before - rows.len();
        stats.output = rows.len();

        if !unknown.is_empty() {
            warn!(fields = ?unknown, "ignoring source fields outside the column layout");
        }
        if stats.missing_key > 0 {
            warn!(count = stats.missing_key, key = self.key_column, "dropped records without key");
        }

        Ok((
            Some(RawBatch {
                schema,
                rows,
                degraded,
                unknown_fields: unknown.into_iter().collect(),
            }),
            stats,
        ))
    }

    fn row(&self, schema: &TableSchema, record: &RawRecord) -> Result<Vec<Option<String>>, Rejection> {
        schema
            .columns()
            .iter()
            .map(|col| self.coerce(col, record.get(&col.name)))
            .collect()
    }

    fn coerce(&self, col: &ColumnSpec, value: Option<&Value>) -> Result<Option<String>, Rejection> {
        let Some(value) = value.filter(|v| !v.is_null()) else {
            return Ok(None);
        };
        let reject = || Rejection {
            column: col.name.clone(),
            expected: col.column_type,
        };
        match col.column_type {
            ColumnType::Text => Ok(scalar_text(value)),
            ColumnType::Integer => {
                let parsed = match value {
                    Value::Number(n) => n
                        .as_i64()
                        .or_else(|| parse_integer(&n.to_string())),
                    Value::String(s) if s.trim().is_empty() => return Ok(None),
                    Value::String(s) => parse_integer(s),
                    _ => None,
                };
                parsed.map(|v| Some(v.to_string())).ok_or_else(reject)
            }
            ColumnType::Date => match value {
                Value::String(s) if s.trim().is_empty() => Ok(None),
                Value::String(s) => NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
                    .map(|d| Some(d.format(DATE_FORMAT).to_string()))
                    .map_err(|_| reject()),
                _ => Err(reject()),
            },
            ColumnType::Timestamp => match value {
                Value::String(s) if s.trim().is_empty() => Ok(None),
                Value::String(s) => self
                    .normalizer
                    .normalize(s)
                    .map(|ts| Some(ts.format(TIMESTAMP_FORMAT).to_string()))
                    .ok_or_else(reject),
                _ => Err(reject()),
            },
        }
    }
}
