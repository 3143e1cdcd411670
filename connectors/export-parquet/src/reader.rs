//! Full-table read into Arrow record batches.

use std::sync::Arc;

use arrow::array::{
    ArrayRef, BooleanArray, Date32Array, Float32Array, Float64Array, Int16Array, Int32Array,
    Int64Array, StringBuilder, TimestampMicrosecondArray,
};
use arrow::datatypes::{DataType, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use pg_escape::quote_identifier;
use tokio_postgres::{Client, Row};

use crate::types::{arrow_schema, ExportColumn};

/// Columns of `schema.table` in ordinal order.
pub(crate) async fn discover_columns(
    client: &Client,
    schema: &str,
    table: &str,
) -> Result<Vec<ExportColumn>, String> {
    let rows = client
        .query(
            "SELECT column_name, data_type, is_nullable = 'YES' \
             FROM information_schema.columns \
             WHERE table_schema = $1 AND table_name = $2 \
             ORDER BY ordinal_position",
            &[&schema, &table],
        )
        .await
        .map_err(|e| format!("Column discovery failed for {schema}.{table}: {e}"))?;
    Ok(rows
        .iter()
        .map(|r| ExportColumn::new(r.get::<_, &str>(0), r.get::<_, &str>(1), r.get::<_, bool>(2)))
        .collect())
}

pub(crate) fn select_sql(qualified_table: &str, columns: &[ExportColumn]) -> String {
    let list = columns
        .iter()
        .map(|c| {
            let ident = quote_identifier(&c.name);
            if c.needs_cast {
                format!("{ident}::text AS {ident}")
            } else {
                ident.into_owned()
            }
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("SELECT {list} FROM {qualified_table}")
}

pub(crate) async fn count(client: &Client, qualified_table: &str) -> Result<u64, String> {
    let row = client
        .query_one(&format!("SELECT COUNT(*) FROM {qualified_table}"), &[])
        .await
        .map_err(|e| format!("COUNT(*) failed for {qualified_table}: {e}"))?;
    let n: i64 = row.get(0);
    Ok(u64::try_from(n).unwrap_or_default())
}

pub(crate) async fn read_all(
    client: &Client,
    qualified_table: &str,
    columns: &[ExportColumn],
) -> Result<Vec<Row>, String> {
    client
        .query(&select_sql(qualified_table, columns), &[])
        .await
        .map_err(|e| format!("SELECT failed for {qualified_table}: {e}"))
}

fn column_values<T>(rows: &[Row], idx: usize, name: &str) -> Result<Vec<Option<T>>, String>
where
    T: for<'a> tokio_postgres::types::FromSql<'a>,
{
    rows.iter()
        .map(|row| {
            row.try_get::<_, Option<T>>(idx)
                .map_err(|e| format!("decode of column '{name}' failed: {e}"))
        })
        .collect()
}

/// Encode `rows` into batches of at most `batch_rows` rows.
pub(crate) fn rows_to_batches(
    rows: &[Row],
    columns: &[ExportColumn],
    batch_rows: usize,
) -> Result<(Arc<Schema>, Vec<RecordBatch>), String> {
    let schema = arrow_schema(columns);
    let batches = rows
        .chunks(batch_rows.max(1))
        .map(|chunk| rows_to_record_batch(chunk, columns, &schema))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((schema, batches))
}

fn rows_to_record_batch(
    rows: &[Row],
    columns: &[ExportColumn],
    schema: &Arc<Schema>,
) -> Result<RecordBatch, String> {
    let epoch = NaiveDate::default();
    let arrays = columns
        .iter()
        .enumerate()
        .map(|(idx, col)| -> Result<ArrayRef, String> {
            let name = col.name.as_str();
            Ok(match &col.arrow_type {
                DataType::Int16 => Arc::new(Int16Array::from(column_values::<i16>(rows, idx, name)?)),
                DataType::Int32 => Arc::new(Int32Array::from(column_values::<i32>(rows, idx, name)?)),
                DataType::Int64 => Arc::new(Int64Array::from(column_values::<i64>(rows, idx, name)?)),
                DataType::Float32 => {
                    Arc::new(Float32Array::from(column_values::<f32>(rows, idx, name)?))
                }
                DataType::Float64 => {
                    Arc::new(Float64Array::from(column_values::<f64>(rows, idx, name)?))
                }
                DataType::Boolean => {
                    Arc::new(BooleanArray::from(column_values::<bool>(rows, idx, name)?))
                }
                DataType::Date32 => {
                    let days: Vec<Option<i32>> = column_values::<NaiveDate>(rows, idx, name)?
                        .into_iter()
                        .map(|d| d.and_then(|d| i32::try_from((d - epoch).num_days()).ok()))
                        .collect();
                    Arc::new(Date32Array::from(days))
                }
                DataType::Timestamp(_, None) => {
                    let micros: Vec<Option<i64>> = column_values::<NaiveDateTime>(rows, idx, name)?
                        .into_iter()
                        .map(|t| t.map(|t| t.and_utc().timestamp_micros()))
                        .collect();
                    Arc::new(TimestampMicrosecondArray::from(micros))
                }
                DataType::Timestamp(_, Some(tz)) => {
                    let micros: Vec<Option<i64>> = column_values::<DateTime<Utc>>(rows, idx, name)?
                        .into_iter()
                        .map(|t| t.map(|t| t.timestamp_micros()))
                        .collect();
                    Arc::new(TimestampMicrosecondArray::from(micros).with_timezone(tz.clone()))
                }
                _ => {
                    let mut builder = StringBuilder::with_capacity(rows.len(), rows.len() * 32);
                    for value in column_values::<String>(rows, idx, name)? {
                        match value {
                            Some(s) => builder.append_value(s),
                            None => builder.append_null(),
                        }
                    }
                    Arc::new(builder.finish())
                }
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    RecordBatch::try_new(schema.clone(), arrays)
        .map_err(|e| format!("Failed to create RecordBatch: {e}"))
}
