use crate::common::test_client;
use rocket::http::Status;

#[test]
fn test_up_healthcheck() {
    let client = test_client();
    let res = client.get("/up").dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "queryops");
}

#[test]
fn test_unknown_route_is_json_404() {
    let client = test_client();
    let res = client.get("/nope").dispatch();
    assert_eq!(res.status(), Status::NotFound);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["error"], "Not found");
}

#[test]
fn test_operator_api_requires_token() {
    let client = test_client();
    let res = client.get("/api/v1/campaigns").dispatch();
    assert_ne!(res.status(), Status::Ok);
}
