use super::OperatorScope;
use crate::models::{Campaign, Host, NewCampaign, QueueHostQuery};
use crate::store::Stores;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{State, get, post};

#[get("/api/v1/hosts")]
pub fn list_hosts(
    stores: &State<Stores>,
    scope: OperatorScope,
) -> Result<Json<Vec<Host>>, (Status, Json<serde_json::Value>)> {
    let hosts = stores
        .hosts
        .list_in_org(&scope.0.organization_id)
        .map_err(|e| {
            eprintln!("list hosts failed for org {}: {e}", scope.0.organization_id);
            (
                Status::InternalServerError,
                Json(serde_json::json!({"error": "Failed to list hosts"})),
            )
        })?;
    Ok(Json(hosts))
}

#[get("/api/v1/hosts/<host_id>")]
pub fn get_host(
    stores: &State<Stores>,
    scope: OperatorScope,
    host_id: &str,
) -> Result<Json<serde_json::Value>, (Status, Json<serde_json::Value>)> {
    let host = host_in_org(stores, &scope, host_id)?;
    let results = stores.campaigns.recent_results(&host.id, 10).map_err(|e| {
        eprintln!("recent results failed for host {}: {e}", host.id);
        (
            Status::InternalServerError,
            Json(serde_json::json!({"error": "Failed to load host"})),
        )
    })?;

    let mut doc = serde_json::to_value(&host).unwrap();
    doc["recent_results"] = serde_json::to_value(&results).unwrap();
    Ok(Json(doc))
}

#[post("/api/v1/hosts/<host_id>/query", format = "json", data = "<body>")]
pub fn queue_host_query(
    stores: &State<Stores>,
    scope: OperatorScope,
    host_id: &str,
    body: Json<QueueHostQuery>,
) -> Result<Json<Campaign>, (Status, Json<serde_json::Value>)> {
    let query = body.query.trim().to_string();
    if query.is_empty() {
        return Err((
            Status::BadRequest,
            Json(serde_json::json!({"error": "Query must not be empty"})),
        ));
    }
    let host = host_in_org(stores, &scope, host_id)?;

    let campaign = stores
        .campaigns
        .queue_query(NewCampaign {
            organization_id: scope.0.organization_id.clone(),
            created_by: Some(scope.0.operator_id.clone()),
            name: body.name.clone(),
            description: body.description.clone(),
            query,
            host_ids: vec![host.id],
        })
        .map_err(|e| {
            eprintln!("one-off query failed for host {host_id}: {e}");
            (
                Status::InternalServerError,
                Json(serde_json::json!({"error": "Failed to queue query"})),
            )
        })?;
    Ok(Json(campaign))
}

fn host_in_org(
    stores: &Stores,
    scope: &OperatorScope,
    host_id: &str,
) -> Result<Host, (Status, Json<serde_json::Value>)> {
    match stores.hosts.by_id_in_org(host_id, &scope.0.organization_id) {
        Ok(Some(host)) => Ok(host),
        // Outside the active org reads the same as missing
        Ok(None) => Err((
            Status::NotFound,
            Json(serde_json::json!({"error": "Host not found"})),
        )),
        Err(e) => {
            eprintln!(
                "host lookup failed for {host_id} in org {}: {e}",
                scope.0.organization_id
            );
            Err((
                Status::InternalServerError,
                Json(serde_json::json!({"error": "Host lookup failed"})),
            ))
        }
    }
}
