use std::fs::File;

use arrow::array::{Array, ArrayRef, Date32Array, Int64Array, StringArray, TimestampMicrosecondArray};
use arrow::datatypes::{DataType, TimeUnit};
use chrono::{DateTime, NaiveDate, TimeDelta};
use cdrsync_e2e::harness::api::{call, mount_pages};
use cdrsync_e2e::harness::{self, JobSpec};
use cdrsync_engine::{run_call_sync, run_export, ExportOptions};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

/// Column rendered by PostgreSQL in the same text form [`cell`] produces.
fn as_text_sql(name: &str, data_type: &DataType) -> String {
    match data_type {
        DataType::Date32 => format!("to_char(\"{name}\", 'YYYY-MM-DD')"),
        DataType::Timestamp(_, _) => format!("to_char(\"{name}\", 'YYYY-MM-DD HH24:MI:SS.US')"),
        _ => format!("\"{name}\"::text"),
    }
}

fn cell(column: &ArrayRef, row: usize) -> Option<String> {
    if column.is_null(row) {
        return None;
    }
    let any = column.as_any();
    let text = match column.data_type() {
        DataType::Utf8 => any.downcast_ref::<StringArray>().unwrap().value(row).to_string(),
        DataType::Int64 => any.downcast_ref::<Int64Array>().unwrap().value(row).to_string(),
        DataType::Date32 => {
            let days = any.downcast_ref::<Date32Array>().unwrap().value(row);
            (NaiveDate::from_ymd_opt(1970, 1, 1).unwrap() + TimeDelta::days(i64::from(days)))
                .format("%Y-%m-%d")
                .to_string()
        }
        DataType::Timestamp(TimeUnit::Microsecond, None) => {
            let micros = any.downcast_ref::<TimestampMicrosecondArray>().unwrap().value(row);
            DateTime::from_timestamp_micros(micros)
                .unwrap()
                .naive_utc()
                .format("%Y-%m-%d %H:%M:%S%.6f")
                .to_string()
        }
        other => panic!("unexpected exported type {other:?}"),
    };
    Some(text)
}

#[tokio::test]
async fn exported_parquet_matches_table() {
    let context = harness::bootstrap().await.expect("bootstrap");
    let schema = context.allocate_schema("export");
    let server = harness::mock_api().await;
    mount_pages(
        &server,
        "/calls",
        &[vec![call("6001.1", 9), call("6001.2", 8), call("6001.3", 7)]],
    )
    .await;

    let url = format!("{}/calls", server.uri());
    let job = context
        .job_config(
            &schema,
            &JobSpec {
                calls_url: Some(&url),
                export_table: Some("cdr_calls"),
                ..JobSpec::default()
            },
        )
        .expect("job config");
    run_call_sync(&job).await.expect("seed via call sync");

    let dir = tempfile::tempdir().expect("tempdir");
    let out = dir.path().join("cdr_calls.parquet");
    let report = run_export(
        &job,
        &ExportOptions {
            dry_run: true,
            output: Some(out.clone()),
        },
    )
    .await
    .expect("export must succeed");

    assert_eq!(report.rows, 3);
    assert!(report.publish.is_none());
    assert!(report.bytes > 0);

    let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(&out).unwrap()).unwrap();
    assert_eq!(builder.metadata().num_row_groups(), 2);
    let batches: Vec<_> = builder.build().unwrap().map(Result::unwrap).collect();
    let file_schema = batches[0].schema();

    let names: Vec<&str> = file_schema.fields().iter().map(|f| f.name().as_str()).collect();
    for expected in ["call_date", "call_timestamp", "duration", "unique_key", "inserted_at"] {
        assert!(names.contains(&expected), "missing column {expected} in {names:?}");
    }
    assert_eq!(
        file_schema.field_with_name("duration").unwrap().data_type(),
        &DataType::Int64
    );
    assert_eq!(
        file_schema.field_with_name("call_date").unwrap().data_type(),
        &DataType::Date32
    );

    let mut exported: Vec<Vec<Option<String>>> = batches
        .iter()
        .flat_map(|batch| {
            (0..batch.num_rows())
                .map(|row| batch.columns().iter().map(|col| cell(col, row)).collect::<Vec<_>>())
                .collect::<Vec<_>>()
        })
        .collect();
    let key_index = file_schema.index_of("unique_key").unwrap();
    exported.sort_by(|a, b| a[key_index].cmp(&b[key_index]));

    let select = file_schema
        .fields()
        .iter()
        .map(|f| as_text_sql(f.name(), f.data_type()))
        .collect::<Vec<_>>()
        .join(", ");
    let client = context.connect().await.expect("connect");
    let rows = client
        .query(
            &format!("SELECT {select} FROM \"{schema}\".cdr_calls ORDER BY unique_key COLLATE \"C\""),
            &[],
        )
        .await
        .expect("read source table");
    let expected: Vec<Vec<Option<String>>> = rows
        .iter()
        .map(|row| (0..row.len()).map(|i| row.get::<_, Option<String>>(i)).collect())
        .collect();

    assert_eq!(expected.len(), 3);
    assert_eq!(exported, expected);

    context.drop_schema(&schema).await.expect("cleanup");
}

#[tokio::test]
async fn empty_table_is_skipped() {
    let context = harness::bootstrap().await.expect("bootstrap");
    let schema = context.allocate_schema("export_empty");
    let client = context.connect().await.expect("connect");
    client
        .batch_execute(&format!(
            "CREATE SCHEMA \"{schema}\"; CREATE TABLE \"{schema}\".nothing (id BIGINT);"
        ))
        .await
        .expect("seed empty table");

    let job = context
        .job_config(&schema, &JobSpec { export_table: Some("nothing"), ..JobSpec::default() })
        .expect("job config");
    let report = run_export(&job, &ExportOptions::default())
        .await
        .expect("empty export is not an error");
    assert!(report.skipped_empty);
    assert!(report.publish.is_none());
    context.drop_schema(&schema).await.expect("cleanup");
}

#[tokio::test]
async fn missing_table_is_an_error() {
    let context = harness::bootstrap().await.expect("bootstrap");
    let schema = context.allocate_schema("export_missing");
    let job = context
        .job_config(&schema, &JobSpec { export_table: Some("absent"), ..JobSpec::default() })
        .expect("job config");
    let err = run_export(&job, &ExportOptions { dry_run: true, output: None })
        .await
        .expect_err("missing table must fail");
    assert!(err.to_string().contains("TABLE_NOT_FOUND"), "{err:#}");
}
