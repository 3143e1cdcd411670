use cdrsync_e2e::harness::api::{calldate, mount_pages};
use cdrsync_e2e::harness::{self, JobSpec};
use cdrsync_engine::{run_raw_sync, SyncStatus};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

const DESCRIPTOR: &str = "    - { name: uniqueid, type: text }
    - { name: calldate, type: timestamp }
    - { name: billsec, type: integer }
    - { name: src, type: text }
";

#[tokio::test]
async fn descriptor_layout_is_typed_and_idempotent() {
    let context = harness::bootstrap().await.expect("bootstrap");
    let schema = context.allocate_schema("raw_typed");
    let server = harness::mock_api().await;
    mount_pages(
        &server,
        "/raw",
        &[vec![
            json!({"uniqueid": "r1", "calldate": calldate(6), "billsec": "31", "src": 101, "extra": "x"}),
            json!({"uniqueid": "r2", "calldate": calldate(5), "billsec": "n/a", "src": "102"}),
            json!({"uniqueid": "r3", "calldate": calldate(4), "billsec": 7, "src": null}),
        ]],
    )
    .await;

    let url = format!("{}/raw", server.uri());
    let job = context
        .job_config(
            &schema,
            &JobSpec {
                raw_url: Some(&url),
                raw_columns: Some(DESCRIPTOR),
                ..JobSpec::default()
            },
        )
        .expect("job config");

    let report = run_raw_sync(&job).await.expect("raw sync must succeed");
    assert!(report.created_table);
    assert!(!report.degraded_layout);
    assert_eq!(report.transform.rejected, 1);
    assert_eq!(report.merged_rows(), 2);

    let columns = context.column_types(&schema, "cdr_raw").await.unwrap();
    let types: Vec<(&str, &str)> = columns
        .iter()
        .map(|(n, t)| (n.as_str(), t.as_str()))
        .collect();
    assert_eq!(
        types,
        vec![
            ("uniqueid", "text"),
            ("calldate", "timestamp without time zone"),
            ("billsec", "bigint"),
            ("src", "text"),
            ("inserted_at", "timestamp without time zone"),
        ]
    );

    let client = context.connect().await.expect("connect");
    let row = client
        .query_one(
            &format!("SELECT billsec, src FROM \"{schema}\".cdr_raw WHERE uniqueid = 'r1'"),
            &[],
        )
        .await
        .expect("query r1");
    assert_eq!(row.get::<_, Option<i64>>(0), Some(31));
    assert_eq!(row.get::<_, Option<String>>(1).as_deref(), Some("101"));

    let again = run_raw_sync(&job).await.expect("rerun");
    assert!(matches!(again.status, SyncStatus::NothingNew));
    assert_eq!(context.count(&schema, "cdr_raw").await.unwrap(), 2);
    context.drop_schema(&schema).await.expect("cleanup");
}

#[tokio::test]
async fn missing_descriptor_falls_back_to_text_columns() {
    let context = harness::bootstrap().await.expect("bootstrap");
    let schema = context.allocate_schema("raw_degraded");
    let server = harness::mock_api().await;
    mount_pages(
        &server,
        "/raw",
        &[
            vec![json!({"uniqueid": "d1", "calldate": calldate(3), "duration": 12})],
            vec![
                json!({"uniqueid": "d2", "calldate": calldate(2), "duration": 4, "late_field": 1}),
                json!({"uniqueid": "d1", "calldate": calldate(1), "duration": 20}),
            ],
        ],
    )
    .await;

    let url = format!("{}/raw", server.uri());
    let job = context
        .job_config(&schema, &JobSpec { raw_url: Some(&url), ..JobSpec::default() })
        .expect("job config");

    let report = run_raw_sync(&job).await.expect("raw sync must succeed");
    assert!(report.degraded_layout);
    assert_eq!(report.transform.duplicates, 1);
    assert_eq!(report.merged_rows(), 2);

    let columns = context.column_types(&schema, "cdr_raw").await.unwrap();
    assert!(columns
        .iter()
        .filter(|(name, _)| name != "inserted_at")
        .all(|(_, t)| t == "text"));
    assert!(!columns.iter().any(|(name, _)| name == "late_field"));

    let client = context.connect().await.expect("connect");
    let row = client
        .query_one(
            &format!("SELECT duration FROM \"{schema}\".cdr_raw WHERE uniqueid = 'd1'"),
            &[],
        )
        .await
        .expect("query d1");
    assert_eq!(row.get::<_, Option<String>>(0).as_deref(), Some("20"));

    let again = run_raw_sync(&job).await.expect("rerun with text watermark");
    assert!(matches!(again.status, SyncStatus::NothingNew));
    context.drop_schema(&schema).await.expect("cleanup");
}

#[tokio::test]
async fn reported_total_with_empty_pages_is_nothing_new() {
    let context = harness::bootstrap().await.expect("bootstrap");
    let schema = context.allocate_schema("raw_hollow");
    let server = harness::mock_api().await;
    Mock::given(method("GET"))
        .and(path("/raw"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total": 3, "totalPages": 1, "data": []
        })))
        .mount(&server)
        .await;

    let url = format!("{}/raw", server.uri());
    let job = context
        .job_config(&schema, &JobSpec { raw_url: Some(&url), ..JobSpec::default() })
        .expect("job config");

    let report = run_raw_sync(&job).await.expect("raw sync must succeed");
    assert!(matches!(report.status, SyncStatus::NothingNew));
    assert_eq!(report.fetch.reported_total, 3);
    assert!(context.table_names(&schema).await.unwrap().is_empty());
    context.drop_schema(&schema).await.expect("cleanup");
}

#[tokio::test]
async fn degraded_layout_ignores_stale_leading_record() {
    let context = harness::bootstrap().await.expect("bootstrap");
    let schema = context.allocate_schema("raw_stale_head");
    let server = harness::mock_api().await;
    mount_pages(
        &server,
        "/raw",
        &[vec![
            json!({"uniqueid": "no_cursor"}),
            json!({"uniqueid": "ancient", "calldate": "2001-01-01 00:00:00"}),
            json!({"uniqueid": "fresh", "calldate": calldate(2), "billsec": 7}),
        ]],
    )
    .await;

    let url = format!("{}/raw", server.uri());
    let job = context
        .job_config(&schema, &JobSpec { raw_url: Some(&url), ..JobSpec::default() })
        .expect("job config");

    let report = run_raw_sync(&job).await.expect("raw sync must succeed");
    assert!(report.degraded_layout);
    assert_eq!(report.transform.bad_timestamp, 1);
    assert_eq!(report.transform.outside_window, 1);
    assert_eq!(report.merged_rows(), 1);

    let client = context.connect().await.expect("connect");
    let row = client
        .query_one(
            &format!("SELECT billsec FROM \"{schema}\".cdr_raw WHERE uniqueid = 'fresh'"),
            &[],
        )
        .await
        .expect("query fresh");
    assert_eq!(row.get::<_, Option<String>>(0).as_deref(), Some("7"));
    context.drop_schema(&schema).await.expect("cleanup");
}
