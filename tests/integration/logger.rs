use crate::common::{enroll_host, seed_org, test_client};
use queryops::models::parse_unix_time;
use rocket::http::{ContentType, Status};

fn count_rows(db_path: &str, table: &str) -> i64 {
    let db = queryops::db::Db::open(db_path, false);
    let conn = db.conn();
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
        .unwrap()
}

fn post_logger<'c>(
    client: &'c rocket::local::blocking::Client,
    node_key: &str,
    log_type: &str,
    data: serde_json::Value,
) -> rocket::local::blocking::LocalResponse<'c> {
    let body = serde_json::json!({"node_key": node_key, "log_type": log_type, "data": data});
    client
        .post("/osquery/logger")
        .header(ContentType::JSON)
        .body(body.to_string())
        .dispatch()
}

#[test]
fn test_logger_unknown_node_key() {
    let client = test_client();
    let res = post_logger(&client, "unknown", "status", serde_json::json!([]));
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["node_invalid"], true);
}

#[test]
fn test_logger_persists_status_and_result_rows() {
    let client = test_client();
    let seed = seed_org(client.db_path(), "acme");
    let node_key = enroll_host(&client, &seed.enroll_secret, "h1");

    let res = post_logger(
        &client,
        &node_key,
        "status",
        serde_json::json!([
            {"unixTime": 1700000000, "severity": "0", "message": "started"},
            {"unixTime": "1700000001", "severity": "1", "message": "warning"},
        ]),
    );
    assert_eq!(res.status(), Status::Ok);
    assert_eq!(count_rows(client.db_path(), "status_logs"), 2);

    let res = post_logger(
        &client,
        &node_key,
        "result",
        serde_json::json!([
            {"unixTime": 1700000002.75, "name": "uptime", "columns": {"days": "1"}},
        ]),
    );
    assert_eq!(res.status(), Status::Ok);
    assert_eq!(count_rows(client.db_path(), "result_logs"), 1);
}

#[test]
fn test_logger_skips_malformed_rows_and_still_succeeds() {
    let client = test_client();
    let seed = seed_org(client.db_path(), "acme");
    let node_key = enroll_host(&client, &seed.enroll_secret, "h1");

    let res = post_logger(
        &client,
        &node_key,
        "status",
        serde_json::json!([
            {"unixTime": "not-a-number", "message": "bad"},
            {"message": "missing time"},
            {"unixTime": "1700000003.5", "message": "good"},
        ]),
    );
    assert_eq!(res.status(), Status::Ok);
    assert_eq!(count_rows(client.db_path(), "status_logs"), 1);
}

#[test]
fn test_logger_unknown_log_type_is_bad_request() {
    let client = test_client();
    let seed = seed_org(client.db_path(), "acme");
    let node_key = enroll_host(&client, &seed.enroll_secret, "h1");

    let res = post_logger(&client, &node_key, "snapshot", serde_json::json!([]));
    assert_eq!(res.status(), Status::BadRequest);
}

#[test]
fn test_unix_time_decoding_variants() {
    assert_eq!(parse_unix_time(&serde_json::json!(1700000000)), Some(1700000000));
    assert_eq!(parse_unix_time(&serde_json::json!(1700000000.99)), Some(1700000000));
    assert_eq!(
        parse_unix_time(&serde_json::json!("1700000000")),
        Some(1700000000)
    );
    assert_eq!(
        parse_unix_time(&serde_json::json!(" 1700000000.25 ")),
        Some(1700000000)
    );
    assert_eq!(parse_unix_time(&serde_json::json!("nope")), None);
    assert_eq!(parse_unix_time(&serde_json::json!(null)), None);
    assert_eq!(parse_unix_time(&serde_json::json!(["1700000000"])), None);
}
