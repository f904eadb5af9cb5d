use crate::common::{auth, enroll_host, host_id_for, queue_campaign, seed_org, test_client};
use rocket::http::{ContentType, Status};

#[test]
fn test_create_campaign_with_explicit_hosts() {
    let client = test_client();
    let seed = seed_org(client.db_path(), "acme");
    enroll_host(&client, &seed.enroll_secret, "h1");
    let host_id = host_id_for(&client, &seed.api_token, "h1");

    let campaign = queue_campaign(&client, &seed.api_token, "select 1", &[&host_id]);
    assert_eq!(campaign["status"], "pending");
    assert_eq!(campaign["query"], "select 1");
    assert_eq!(campaign["target_count"], 1);
    assert_eq!(campaign["result_count"], 0);
    assert_eq!(campaign["created_by"], seed.operator_id);
}

#[test]
fn test_create_campaign_empty_host_ids_targets_whole_fleet() {
    let client = test_client();
    let seed = seed_org(client.db_path(), "acme");
    enroll_host(&client, &seed.enroll_secret, "h1");
    enroll_host(&client, &seed.enroll_secret, "h2");
    enroll_host(&client, &seed.enroll_secret, "h3");

    let res = client
        .post("/api/v1/campaigns")
        .header(ContentType::JSON)
        .header(auth(&seed.api_token))
        .body(r#"{"query": "select * from osquery_info"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let campaign: serde_json::Value = res.into_json().unwrap();
    assert_eq!(campaign["target_count"], 3);
}

#[test]
fn test_create_campaign_foreign_host_is_not_found() {
    let client = test_client();
    let acme = seed_org(client.db_path(), "acme");
    let umbrella = seed_org(client.db_path(), "umbrella");
    enroll_host(&client, &umbrella.enroll_secret, "their-host");
    let foreign_id = host_id_for(&client, &umbrella.api_token, "their-host");

    let body = serde_json::json!({"query": "select 1", "host_ids": [foreign_id]});
    let res = client
        .post("/api/v1/campaigns")
        .header(ContentType::JSON)
        .header(auth(&acme.api_token))
        .body(body.to_string())
        .dispatch();
    assert_eq!(res.status(), Status::NotFound);
}

#[test]
fn test_create_campaign_no_hosts_is_bad_request() {
    let client = test_client();
    let seed = seed_org(client.db_path(), "acme");

    let res = client
        .post("/api/v1/campaigns")
        .header(ContentType::JSON)
        .header(auth(&seed.api_token))
        .body(r#"{"query": "select 1"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::BadRequest);
}

#[test]
fn test_create_campaign_empty_query_is_bad_request() {
    let client = test_client();
    let seed = seed_org(client.db_path(), "acme");
    enroll_host(&client, &seed.enroll_secret, "h1");

    let res = client
        .post("/api/v1/campaigns")
        .header(ContentType::JSON)
        .header(auth(&seed.api_token))
        .body(r#"{"query": "   "}"#)
        .dispatch();
    assert_eq!(res.status(), Status::BadRequest);
}

#[test]
fn test_list_campaigns_newest_first_with_limit() {
    let client = test_client();
    let seed = seed_org(client.db_path(), "acme");
    enroll_host(&client, &seed.enroll_secret, "h1");
    let host_id = host_id_for(&client, &seed.api_token, "h1");

    for i in 0..3 {
        queue_campaign(&client, &seed.api_token, &format!("select {i}"), &[&host_id]);
        std::thread::sleep(std::time::Duration::from_millis(5));
    }

    let res = client
        .get("/api/v1/campaigns")
        .header(auth(&seed.api_token))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let campaigns: Vec<serde_json::Value> = res.into_json().unwrap();
    assert_eq!(campaigns.len(), 3);
    assert_eq!(campaigns[0]["query"], "select 2");
    assert_eq!(campaigns[2]["query"], "select 0");

    let res = client
        .get("/api/v1/campaigns?limit=2")
        .header(auth(&seed.api_token))
        .dispatch();
    let campaigns: Vec<serde_json::Value> = res.into_json().unwrap();
    assert_eq!(campaigns.len(), 2);
}

#[test]
fn test_get_campaign_includes_targets() {
    let client = test_client();
    let seed = seed_org(client.db_path(), "acme");
    enroll_host(&client, &seed.enroll_secret, "beta");
    enroll_host(&client, &seed.enroll_secret, "alpha");
    let beta = host_id_for(&client, &seed.api_token, "beta");
    let alpha = host_id_for(&client, &seed.api_token, "alpha");

    let campaign = queue_campaign(&client, &seed.api_token, "select 1", &[&beta, &alpha]);
    let id = campaign["id"].as_str().unwrap();

    let res = client
        .get(format!("/api/v1/campaigns/{id}"))
        .header(auth(&seed.api_token))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    let targets = body["targets"].as_array().unwrap();
    assert_eq!(targets.len(), 2);
    // Ordered by host identifier
    assert_eq!(targets[0]["host_identifier"], "alpha");
    assert_eq!(targets[1]["host_identifier"], "beta");
    assert_eq!(targets[0]["status"], "pending");
}

#[test]
fn test_get_campaign_outside_org_is_not_found() {
    let client = test_client();
    let acme = seed_org(client.db_path(), "acme");
    let umbrella = seed_org(client.db_path(), "umbrella");
    enroll_host(&client, &acme.enroll_secret, "h1");
    let host_id = host_id_for(&client, &acme.api_token, "h1");
    let campaign = queue_campaign(&client, &acme.api_token, "select 1", &[&host_id]);
    let id = campaign["id"].as_str().unwrap();

    let res = client
        .get(format!("/api/v1/campaigns/{id}"))
        .header(auth(&umbrella.api_token))
        .dispatch();
    assert_eq!(res.status(), Status::NotFound);
}

#[test]
fn test_one_off_host_query() {
    let client = test_client();
    let seed = seed_org(client.db_path(), "acme");
    enroll_host(&client, &seed.enroll_secret, "h1");
    let host_id = host_id_for(&client, &seed.api_token, "h1");

    let res = client
        .post(format!("/api/v1/hosts/{host_id}/query"))
        .header(ContentType::JSON)
        .header(auth(&seed.api_token))
        .body(r#"{"query": "select * from processes", "name": "procs"}"#)
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let campaign: serde_json::Value = res.into_json().unwrap();
    assert_eq!(campaign["target_count"], 1);
    assert_eq!(campaign["name"], "procs");
}

#[test]
fn test_host_listing_is_org_scoped_and_hides_node_key() {
    let client = test_client();
    let acme = seed_org(client.db_path(), "acme");
    let umbrella = seed_org(client.db_path(), "umbrella");
    enroll_host(&client, &acme.enroll_secret, "ours");
    enroll_host(&client, &umbrella.enroll_secret, "theirs");

    let res = client
        .get("/api/v1/hosts")
        .header(auth(&acme.api_token))
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let hosts: Vec<serde_json::Value> = res.into_json().unwrap();
    assert_eq!(hosts.len(), 1);
    assert_eq!(hosts[0]["host_identifier"], "ours");
    assert!(hosts[0].get("node_key").is_none());
}
