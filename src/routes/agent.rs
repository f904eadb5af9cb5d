use crate::bus::PubSub;
use crate::events::{self, CampaignResultEvent, QueryResultEvent};
use crate::models::{
    DistributedWriteRequest, EnrollRequest, Host, LoggerRequest, NodeKeyRequest, TargetStatus,
    parse_unix_time,
};
use crate::store::{StoreError, Stores};
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{State, post};

fn host_for_node_key(
    stores: &Stores,
    node_key: &str,
) -> Result<Option<Host>, (Status, Json<serde_json::Value>)> {
    stores.hosts.by_node_key(node_key).map_err(|e| {
        eprintln!("agent auth: node key lookup failed: {e}");
        (
            Status::InternalServerError,
            Json(serde_json::json!({"error": "Host lookup failed"})),
        )
    })
}

/// An unknown node key is 200 OK with `node_invalid: true`, never an HTTP
/// error; osquery treats the HTTP layer as transport only.
fn node_invalid() -> Json<serde_json::Value> {
    Json(serde_json::json!({"node_invalid": true}))
}

#[post("/osquery/enroll", format = "json", data = "<body>")]
pub fn enroll(
    stores: &State<Stores>,
    body: Json<EnrollRequest>,
) -> Result<Json<serde_json::Value>, (Status, Json<serde_json::Value>)> {
    let org = match stores.identity.lookup_by_enroll_secret(body.enroll_secret.trim()) {
        Ok(org) => org,
        Err(StoreError::NotFound) => {
            return Ok(Json(
                serde_json::json!({"node_key": "", "node_invalid": true}),
            ));
        }
        Err(e) => {
            eprintln!("enroll: secret lookup failed: {e}");
            return Err((
                Status::InternalServerError,
                Json(serde_json::json!({"error": "Enrollment failed"})),
            ));
        }
    };

    let host_identifier = body.host_identifier.trim();
    if host_identifier.is_empty() {
        return Err((
            Status::BadRequest,
            Json(serde_json::json!({"error": "host_identifier must not be empty"})),
        ));
    }

    let node_key = stores
        .hosts
        .enroll(host_identifier, &body.host_details, &org.id)
        .map_err(|e| {
            eprintln!("enroll: host upsert failed for org {}: {e}", org.id);
            (
                Status::InternalServerError,
                Json(serde_json::json!({"error": "Enrollment failed"})),
            )
        })?;

    Ok(Json(
        serde_json::json!({"node_key": node_key, "node_invalid": false}),
    ))
}

#[post("/osquery/config", format = "json", data = "<body>")]
pub fn config(
    stores: &State<Stores>,
    body: Json<NodeKeyRequest>,
) -> Result<Json<serde_json::Value>, (Status, Json<serde_json::Value>)> {
    let Some(host) = host_for_node_key(stores, &body.node_key)? else {
        return Ok(node_invalid());
    };

    // Last-contact bookkeeping never fails the response
    if let Err(e) = stores.hosts.touch_config(&body.node_key) {
        eprintln!("config: touch failed for host {}: {e}", host.id);
    }

    let doc = stores.configs.effective_config(&host.id).map_err(|e| {
        eprintln!("config: resolve failed for host {}: {e}", host.id);
        (
            Status::InternalServerError,
            Json(serde_json::json!({"error": "Configuration lookup failed"})),
        )
    })?;
    Ok(Json(doc))
}

#[post("/osquery/logger", format = "json", data = "<body>")]
pub fn logger(
    stores: &State<Stores>,
    body: Json<LoggerRequest>,
) -> Result<Json<serde_json::Value>, (Status, Json<serde_json::Value>)> {
    let Some(host) = host_for_node_key(stores, &body.node_key)? else {
        return Ok(node_invalid());
    };

    if let Err(e) = stores.hosts.touch_logger(&body.node_key) {
        eprintln!("logger: touch failed for host {}: {e}", host.id);
    }

    if body.log_type != "status" && body.log_type != "result" {
        return Err((
            Status::BadRequest,
            Json(serde_json::json!({"error": "log_type must be \"status\" or \"result\""})),
        ));
    }

    for line in &body.data {
        // Malformed rows are logged and skipped; the batch still succeeds
        let Some(unix_time) = line.get("unixTime").and_then(parse_unix_time) else {
            eprintln!(
                "logger: skipping malformed {} row for host {}",
                body.log_type, host.id
            );
            continue;
        };
        let appended = if body.log_type == "status" {
            stores.logs.append_status_log(&host.id, line, unix_time)
        } else {
            stores.logs.append_result_log(&host.id, line, unix_time)
        };
        if let Err(e) = appended {
            eprintln!(
                "logger: failed to persist {} row for host {}: {e}",
                body.log_type, host.id
            );
        }
    }

    Ok(Json(serde_json::json!({})))
}

#[post("/osquery/distributed_read", format = "json", data = "<body>")]
pub fn distributed_read(
    stores: &State<Stores>,
    body: Json<NodeKeyRequest>,
) -> Result<Json<serde_json::Value>, (Status, Json<serde_json::Value>)> {
    let Some(host) = host_for_node_key(stores, &body.node_key)? else {
        return Ok(Json(
            serde_json::json!({"node_invalid": true, "queries": {}}),
        ));
    };

    if let Err(e) = stores.hosts.touch_distributed(&body.node_key) {
        eprintln!("distributed_read: touch failed for host {}: {e}", host.id);
    }

    // A failed claim collapses to an empty batch; the agent just polls again
    let queries = stores.campaigns.claim_pending(&host.id).unwrap_or_else(|e| {
        eprintln!("distributed_read: claim failed for host {}: {e}", host.id);
        Default::default()
    });

    Ok(Json(serde_json::json!({"queries": queries})))
}

#[post("/osquery/distributed_write", format = "json", data = "<body>")]
pub async fn distributed_write(
    stores: &State<Stores>,
    pubsub: &State<PubSub>,
    body: Json<DistributedWriteRequest>,
) -> Result<Json<serde_json::Value>, (Status, Json<serde_json::Value>)> {
    let Some(host) = host_for_node_key(stores, &body.node_key)? else {
        return Ok(node_invalid());
    };

    // (campaign id, row status, result rows, error)
    let mut outcomes: Vec<(String, TargetStatus, serde_json::Value, Option<String>)> = Vec::new();
    if body.statuses.is_empty() {
        // Legacy dialect: no statuses map means every reported query succeeded
        for (campaign_id, rows) in &body.queries {
            outcomes.push((campaign_id.clone(), TargetStatus::Completed, rows.clone(), None));
        }
    } else {
        for (campaign_id, code) in &body.statuses {
            let status = if *code == 0 {
                TargetStatus::Completed
            } else {
                TargetStatus::Failed
            };
            let rows = body
                .queries
                .get(campaign_id)
                .cloned()
                .unwrap_or_else(|| serde_json::json!([]));
            let error = (*code != 0).then(|| format!("osquery status {code}"));
            outcomes.push((campaign_id.clone(), status, rows, error));
        }
    }

    for (campaign_id, status, rows, error) in outcomes {
        match stores
            .campaigns
            .record_result(&host.id, &campaign_id, status, Some(&rows), error.as_deref())
        {
            Ok((campaign, target)) => {
                let row_count = rows.as_array().map(|a| a.len() as i64).unwrap_or(0);
                publish_result_events(pubsub, &host, &campaign.id, &target.status, row_count,
                    target.error.as_deref(), target.completed_at.as_deref())
                .await;
            }
            // The write failed, so both publishes are suppressed for this target
            Err(StoreError::NoSuchTarget) => {
                eprintln!(
                    "distributed_write: no target for campaign {campaign_id} host {}",
                    host.id
                );
            }
            Err(e) => {
                eprintln!(
                    "distributed_write: record failed for campaign {campaign_id} host {}: {e}",
                    host.id
                );
            }
        }
    }

    Ok(Json(serde_json::json!({})))
}

/// One publish on the host topic and one on the campaign topic per recorded
/// target. Publish failures are logged; consumers re-derive from the store.
async fn publish_result_events(
    pubsub: &PubSub,
    host: &Host,
    campaign_id: &str,
    status: &TargetStatus,
    row_count: i64,
    error: Option<&str>,
    completed_at: Option<&str>,
) {
    let Some(bus) = pubsub.bus.as_ref() else {
        return;
    };
    let occurred_at = completed_at
        .map(String::from)
        .unwrap_or_else(|| chrono::Utc::now().to_rfc3339());

    let host_event = QueryResultEvent {
        host_id: host.id.clone(),
        query_id: campaign_id.to_string(),
        status: status.as_str().to_string(),
        occurred_at: occurred_at.clone(),
        error: error.map(String::from),
    };
    match serde_json::to_vec(&host_event) {
        Ok(payload) => {
            if let Err(e) = bus.publish(&events::host_topic(&host.id), payload).await {
                eprintln!("publish failed on host topic for {}: {e}", host.id);
            }
        }
        Err(e) => eprintln!("encode failed for host event {}: {e}", host.id),
    }

    let campaign_event = CampaignResultEvent {
        campaign_id: campaign_id.to_string(),
        host_id: host.id.clone(),
        host_identifier: host.host_identifier.clone(),
        status: status.as_str().to_string(),
        occurred_at,
        row_count,
        error: error.map(String::from),
    };
    match serde_json::to_vec(&campaign_event) {
        Ok(payload) => {
            if let Err(e) = bus
                .publish(&events::campaign_topic(campaign_id), payload)
                .await
            {
                eprintln!("publish failed on campaign topic for {campaign_id}: {e}");
            }
        }
        Err(e) => eprintln!("encode failed for campaign event {campaign_id}: {e}"),
    }
}
