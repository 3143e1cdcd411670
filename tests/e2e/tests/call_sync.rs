use cdrsync_e2e::harness::api::{call, mount_pages};
use cdrsync_e2e::harness::{self, JobSpec};
use cdrsync_engine::{run_call_sync, SyncStatus};
use cdrsync_types::{MergeStage, SyncError};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn first_run_bootstraps_and_keeps_last_duplicate() {
    let context = harness::bootstrap().await.expect("bootstrap");
    let schema = context.allocate_schema("first_run");
    let server = harness::mock_api().await;

    let mut blocked = call("1001.2", 29);
    blocked["dst"] = json!("s");
    let mut later = call("1001.1", 27);
    later["duration"] = json!(99);
    mount_pages(
        &server,
        "/calls",
        &[
            vec![call("1001.1", 30), blocked],
            vec![call("1001.3", 28), later],
        ],
    )
    .await;

    let url = format!("{}/calls", server.uri());
    let job = context
        .job_config(&schema, &JobSpec { calls_url: Some(&url), ..JobSpec::default() })
        .expect("job config");

    let report = run_call_sync(&job).await.expect("sync must succeed");
    assert!(report.created_table);
    assert_eq!(report.fetch.pages_fetched, 2);
    assert_eq!(report.transform.filtered, 1);
    assert_eq!(report.transform.duplicates, 1);
    match &report.status {
        SyncStatus::Merged(outcome) => {
            assert_eq!(outcome.merged_rows, 2);
            assert_eq!(outcome.table_rows, 2);
            assert_eq!(outcome.chunks, 1);
            assert!(outcome.staging_dropped);
        }
        other => panic!("expected a merge, got {other:?}"),
    }

    let client = context.connect().await.expect("connect");
    let row = client
        .query_one(
            &format!(
                "SELECT duration, calltype, unique_key = to_char(call_date, 'YYYY-MM-DD') || '_' || uniqueid, \
                 inserted_at IS NOT NULL FROM \"{schema}\".cdr_calls WHERE uniqueid = '1001.1'"
            ),
            &[],
        )
        .await
        .expect("query merged row");
    assert_eq!(row.get::<_, i64>(0), 99);
    assert_eq!(row.get::<_, String>(1), "OUTBOUND");
    assert!(row.get::<_, bool>(2));
    assert!(row.get::<_, bool>(3));

    assert_eq!(context.table_names(&schema).await.unwrap(), vec!["cdr_calls"]);
    context.drop_schema(&schema).await.expect("cleanup");
}

#[tokio::test]
async fn rerun_is_idempotent_and_picks_up_new_records() {
    let context = harness::bootstrap().await.expect("bootstrap");
    let schema = context.allocate_schema("rerun");
    let server = harness::mock_api().await;
    let old = vec![call("2001.1", 48), call("2001.2", 40), call("2001.3", 30)];
    mount_pages(&server, "/calls", &[old.clone()]).await;

    let url = format!("{}/calls", server.uri());
    let job = context
        .job_config(&schema, &JobSpec { calls_url: Some(&url), ..JobSpec::default() })
        .expect("job config");

    run_call_sync(&job).await.expect("first run");
    assert_eq!(context.count(&schema, "cdr_calls").await.unwrap(), 3);

    let second = run_call_sync(&job).await.expect("second run");
    assert!(matches!(second.status, SyncStatus::NothingNew));
    assert_eq!(second.transform.outside_window, 3);
    assert_eq!(context.count(&schema, "cdr_calls").await.unwrap(), 3);

    server.reset().await;
    let mut newer = old;
    newer.push(call("2001.4", 1));
    mount_pages(&server, "/calls", &[newer]).await;

    let third = run_call_sync(&job).await.expect("third run");
    assert_eq!(third.merged_rows(), 1);
    assert_eq!(context.count(&schema, "cdr_calls").await.unwrap(), 4);
    context.drop_schema(&schema).await.expect("cleanup");
}

#[tokio::test]
async fn orphaned_staging_tables_are_swept() {
    let context = harness::bootstrap().await.expect("bootstrap");
    let schema = context.allocate_schema("sweep");
    let client = context.connect().await.expect("connect");
    client
        .batch_execute(&format!(
            "CREATE SCHEMA \"{schema}\";
             CREATE TABLE \"{schema}\".cdr_calls__stg_1700000000000 (x INT);
             CREATE TABLE \"{schema}\".cdr_calls__stg_manual (x INT);"
        ))
        .await
        .expect("seed orphan");

    let server = harness::mock_api().await;
    mount_pages(&server, "/calls", &[vec![call("3001.1", 5)]]).await;
    let url = format!("{}/calls", server.uri());
    let job = context
        .job_config(&schema, &JobSpec { calls_url: Some(&url), ..JobSpec::default() })
        .expect("job config");

    let report = run_call_sync(&job).await.expect("sync must succeed");
    assert_eq!(report.swept, vec!["cdr_calls__stg_1700000000000"]);
    assert_eq!(
        context.table_names(&schema).await.unwrap(),
        vec!["cdr_calls", "cdr_calls__stg_manual"]
    );
    context.drop_schema(&schema).await.expect("cleanup");
}

#[tokio::test]
async fn legacy_table_is_migrated_and_backfilled() {
    let context = harness::bootstrap().await.expect("bootstrap");
    let schema = context.allocate_schema("legacy");
    let client = context.connect().await.expect("connect");
    client
        .batch_execute(&format!(
            "CREATE SCHEMA \"{schema}\";
             CREATE TABLE \"{schema}\".cdr_calls (
                 call_date DATE, call_hour TEXT, clid TEXT, src TEXT, dst TEXT,
                 dcontext TEXT, channel TEXT, dstchannel TEXT, lastapp TEXT,
                 duration BIGINT, disposition TEXT, uniqueid TEXT, calltype TEXT
             );
             INSERT INTO \"{schema}\".cdr_calls (call_date, call_hour, uniqueid, duration, calltype)
             VALUES ((now() - interval '10 days')::date, '08:15:00', 'legacy.1', 12, 'INTERNAL');"
        ))
        .await
        .expect("seed legacy table");

    let server = harness::mock_api().await;
    mount_pages(&server, "/calls", &[vec![call("4001.1", 2)]]).await;
    let url = format!("{}/calls", server.uri());
    let job = context
        .job_config(&schema, &JobSpec { calls_url: Some(&url), ..JobSpec::default() })
        .expect("job config");

    let report = run_call_sync(&job).await.expect("sync must succeed");
    assert!(!report.created_table);
    assert_eq!(
        report.migrated_columns,
        vec!["call_timestamp", "unique_key", "inserted_at"]
    );
    assert!(report.window.watermark.is_some());
    assert_eq!(report.merged_rows(), 1);

    let row = client
        .query_one(
            &format!(
                "SELECT unique_key, call_timestamp = call_date + call_hour::time \
                 FROM \"{schema}\".cdr_calls WHERE uniqueid = 'legacy.1'"
            ),
            &[],
        )
        .await
        .expect("query legacy row");
    assert!(row.get::<_, String>(0).ends_with("_legacy.1"));
    assert!(row.get::<_, bool>(1));
    assert_eq!(context.count(&schema, "cdr_calls").await.unwrap(), 2);
    context.drop_schema(&schema).await.expect("cleanup");
}

#[tokio::test]
async fn later_page_failure_keeps_partial_data() {
    let context = harness::bootstrap().await.expect("bootstrap");
    let schema = context.allocate_schema("partial");
    let server = harness::mock_api().await;
    Mock::given(method("GET"))
        .and(path("/calls"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total": 4, "totalPages": 2, "data": [call("5001.1", 3), call("5001.2", 2)]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/calls"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let url = format!("{}/calls", server.uri());
    let job = context
        .job_config(&schema, &JobSpec { calls_url: Some(&url), ..JobSpec::default() })
        .expect("job config");

    let report = run_call_sync(&job).await.expect("partial data is not fatal");
    assert!(report.fetch.stopped_early.is_some());
    assert_eq!(report.merged_rows(), 2);
    context.drop_schema(&schema).await.expect("cleanup");
}

#[tokio::test]
async fn first_page_failure_aborts_without_touching_destination() {
    let context = harness::bootstrap().await.expect("bootstrap");
    let schema = context.allocate_schema("page_one");
    let server = harness::mock_api().await;
    Mock::given(method("GET"))
        .and(path("/calls"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let url = format!("{}/calls", server.uri());
    let job = context
        .job_config(&schema, &JobSpec { calls_url: Some(&url), ..JobSpec::default() })
        .expect("job config");

    let err = run_call_sync(&job).await.expect_err("page 1 failure is fatal");
    assert!(err.to_string().contains("SOURCE_UNAUTHORIZED"), "{err:#}");
    assert!(context.table_names(&schema).await.unwrap().is_empty());
    context.drop_schema(&schema).await.expect("cleanup");
}

#[tokio::test]
async fn empty_source_is_a_successful_noop() {
    let context = harness::bootstrap().await.expect("bootstrap");
    let schema = context.allocate_schema("empty_source");
    let server = harness::mock_api().await;
    mount_pages(&server, "/calls", &[]).await;

    let url = format!("{}/calls", server.uri());
    let job = context
        .job_config(&schema, &JobSpec { calls_url: Some(&url), ..JobSpec::default() })
        .expect("job config");

    let report = run_call_sync(&job).await.expect("empty source is not an error");
    assert!(matches!(report.status, SyncStatus::SourceEmpty));
    assert!(!report.created_table);
    context.drop_schema(&schema).await.expect("cleanup");
}

#[tokio::test]
async fn failed_merge_drops_staging_and_reports_stage() {
    let context = harness::bootstrap().await.expect("bootstrap");
    let schema = context.allocate_schema("merge_failure");
    let server = harness::mock_api().await;
    mount_pages(&server, "/calls", &[vec![call("7001.1", 10)]]).await;

    let url = format!("{}/calls", server.uri());
    let job = context
        .job_config(&schema, &JobSpec { calls_url: Some(&url), ..JobSpec::default() })
        .expect("job config");
    run_call_sync(&job).await.expect("first run");

    let client = context.connect().await.expect("connect");
    client
        .batch_execute(&format!(
            "ALTER TABLE \"{schema}\".cdr_calls \
             ADD CONSTRAINT duration_never_positive CHECK (duration <= 0) NOT VALID"
        ))
        .await
        .expect("add conflicting constraint");

    server.reset().await;
    mount_pages(&server, "/calls", &[vec![call("7001.1", 10), call("7001.2", 1)]]).await;

    let err = run_call_sync(&job).await.expect_err("merge must fail");
    let sync_err = err
        .downcast_ref::<SyncError>()
        .unwrap_or_else(|| panic!("expected a SyncError, got {err:#}"));
    assert!(
        matches!(sync_err.stage, Some(MergeStage::Load | MergeStage::Converge)),
        "{sync_err:?}"
    );
    assert_eq!(sync_err.staging_dropped, Some(true));
    assert_eq!(context.table_names(&schema).await.unwrap(), vec!["cdr_calls"]);
    assert_eq!(context.count(&schema, "cdr_calls").await.unwrap(), 1);
    context.drop_schema(&schema).await.expect("cleanup");
}
