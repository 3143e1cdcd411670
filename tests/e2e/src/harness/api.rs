use chrono::{Duration, Utc};
use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Serve `pages` at `GET {route}?page=N` in the API's envelope.
pub async fn mount_pages(server: &MockServer, route: &str, pages: &[Vec<Value>]) {
    let total: usize = pages.iter().map(Vec::len).sum();
    let total_pages = pages.len().max(1);
    if pages.is_empty() {
        Mock::given(method("GET"))
            .and(path(route))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "total": 0, "totalPages": 1, "data": []
            })))
            .mount(server)
            .await;
        return;
    }
    for (i, data) in pages.iter().enumerate() {
        Mock::given(method("GET"))
            .and(path(route))
            .and(query_param("page", (i + 1).to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "total": total,
                "totalPages": total_pages,
                "data": data,
            })))
            .mount(server)
            .await;
    }
}

/// Source-format `calldate` for `hours_ago` before now, in the API's own
/// wall clock.
#[must_use]
pub fn calldate(hours_ago: i64) -> String {
    (Utc::now() - Duration::hours(hours_ago))
        .naive_utc()
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

/// A source record that passes the default business filters.
#[must_use]
pub fn call(uniqueid: &str, hours_ago: i64) -> Value {
    json!({
        "calldate": calldate(hours_ago),
        "clid": "\"Front Desk\" <101>",
        "src": "101",
        "dst": "3001234567",
        "dcontext": "from-internal",
        "channel": "PJSIP/101-00000001",
        "dstchannel": "SIP/Nebula_Loqui-00000002",
        "lastapp": "Dial",
        "duration": 42,
        "disposition": "ANSWERED",
        "uniqueid": uniqueid,
    })
}
