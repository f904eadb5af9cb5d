use super::OperatorScope;
use crate::models::{Campaign, CreateCampaign, NewCampaign};
use crate::store::Stores;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{State, get, post};

#[post("/api/v1/campaigns", format = "json", data = "<body>")]
pub fn create_campaign(
    stores: &State<Stores>,
    scope: OperatorScope,
    body: Json<CreateCampaign>,
) -> Result<Json<Campaign>, (Status, Json<serde_json::Value>)> {
    let query = body.query.trim().to_string();
    if query.is_empty() {
        return Err((
            Status::BadRequest,
            Json(serde_json::json!({"error": "Query must not be empty"})),
        ));
    }

    let org_id = &scope.0.organization_id;
    let host_ids: Vec<String> = if body.host_ids.is_empty() {
        // No explicit targets: the whole fleet of the active organization
        let hosts = stores.hosts.list_in_org(org_id).map_err(|e| {
            eprintln!("create campaign: host listing failed for org {org_id}: {e}");
            (
                Status::InternalServerError,
                Json(serde_json::json!({"error": "Host lookup failed"})),
            )
        })?;
        hosts.into_iter().map(|h| h.id).collect()
    } else {
        let mut ids = Vec::with_capacity(body.host_ids.len());
        for host_id in &body.host_ids {
            match stores.hosts.by_id_in_org(host_id, org_id) {
                Ok(Some(host)) => ids.push(host.id),
                Ok(None) => {
                    return Err((
                        Status::NotFound,
                        Json(serde_json::json!({"error": "Host not found"})),
                    ));
                }
                Err(e) => {
                    eprintln!("create campaign: host lookup failed for org {org_id}: {e}");
                    return Err((
                        Status::InternalServerError,
                        Json(serde_json::json!({"error": "Host lookup failed"})),
                    ));
                }
            }
        }
        ids
    };

    if host_ids.is_empty() {
        return Err((
            Status::BadRequest,
            Json(serde_json::json!({"error": "No hosts to target"})),
        ));
    }

    let campaign = stores
        .campaigns
        .queue_query(NewCampaign {
            organization_id: org_id.clone(),
            created_by: Some(scope.0.operator_id.clone()),
            name: body.name.clone(),
            description: body.description.clone(),
            query,
            host_ids,
        })
        .map_err(|e| {
            eprintln!("create campaign: queue failed for org {org_id}: {e}");
            (
                Status::InternalServerError,
                Json(serde_json::json!({"error": "Failed to create campaign"})),
            )
        })?;

    Ok(Json(campaign))
}

#[get("/api/v1/campaigns?<limit>")]
pub fn list_campaigns(
    stores: &State<Stores>,
    scope: OperatorScope,
    limit: Option<i64>,
) -> Result<Json<Vec<Campaign>>, (Status, Json<serde_json::Value>)> {
    let limit = limit.unwrap_or(50).clamp(1, 50);
    let campaigns = stores
        .campaigns
        .list_campaigns(&scope.0.organization_id, limit)
        .map_err(|e| {
            eprintln!(
                "list campaigns failed for org {}: {e}",
                scope.0.organization_id
            );
            (
                Status::InternalServerError,
                Json(serde_json::json!({"error": "Failed to list campaigns"})),
            )
        })?;
    Ok(Json(campaigns))
}

#[get("/api/v1/campaigns/<campaign_id>")]
pub fn get_campaign(
    stores: &State<Stores>,
    scope: OperatorScope,
    campaign_id: &str,
) -> Result<Json<serde_json::Value>, (Status, Json<serde_json::Value>)> {
    let org_id = &scope.0.organization_id;
    let campaign = stores
        .campaigns
        .get_campaign(campaign_id, org_id)
        .map_err(|e| {
            eprintln!("get campaign {campaign_id} failed for org {org_id}: {e}");
            (
                Status::InternalServerError,
                Json(serde_json::json!({"error": "Failed to load campaign"})),
            )
        })?
        .ok_or((
            Status::NotFound,
            Json(serde_json::json!({"error": "Campaign not found"})),
        ))?;

    let targets = stores.campaigns.list_targets(&campaign.id).map_err(|e| {
        eprintln!("list targets for campaign {campaign_id} failed: {e}");
        (
            Status::InternalServerError,
            Json(serde_json::json!({"error": "Failed to load campaign"})),
        )
    })?;

    let mut doc = serde_json::to_value(&campaign).unwrap();
    doc["targets"] = serde_json::to_value(&targets).unwrap();
    Ok(Json(doc))
}
