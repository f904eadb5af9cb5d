use super::OperatorScope;
use crate::bus::PubSub;
use crate::events::{self, CampaignResultEvent, QueryResultEvent};
use crate::store::{StoreResult, Stores};
use rocket::http::Status;
use rocket::response::stream::{Event, EventStream};
use rocket::serde::json::Json;
use rocket::{State, get};
use tokio::time::{Duration, interval};

/// Polling cadence when the event bus is unavailable.
const POLL_INTERVAL: Duration = Duration::from_secs(1);
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

fn render_host(stores: &Stores, host_id: &str) -> StoreResult<serde_json::Value> {
    let rows = stores.campaigns.recent_results(host_id, 10)?;
    Ok(serde_json::to_value(&rows).unwrap())
}

/// Campaign snapshot plus whether the campaign has reached a terminal
/// status. `Ok(None)` when the campaign is gone from the active org.
fn render_campaign(
    stores: &Stores,
    campaign_id: &str,
    organization_id: &str,
) -> StoreResult<Option<(serde_json::Value, bool)>> {
    let Some(campaign) = stores.campaigns.get_campaign(campaign_id, organization_id)? else {
        return Ok(None);
    };
    let targets = stores.campaigns.list_targets(&campaign.id)?;
    let terminal = campaign.status.is_terminal();
    let mut doc = serde_json::to_value(&campaign).unwrap();
    doc["targets"] = serde_json::to_value(&targets).unwrap();
    Ok(Some((doc, terminal)))
}

#[get("/hosts/<host_id>/results")]
pub fn host_results_stream(
    stores: &State<Stores>,
    pubsub: &State<PubSub>,
    scope: OperatorScope,
    host_id: &str,
) -> Result<EventStream![Event + 'static], (Status, Json<serde_json::Value>)> {
    let host = match stores.hosts.by_id_in_org(host_id, &scope.0.organization_id) {
        Ok(Some(host)) => host,
        Ok(None) => {
            return Err((
                Status::NotFound,
                Json(serde_json::json!({"error": "Host not found"})),
            ));
        }
        Err(e) => {
            eprintln!(
                "host stream: lookup failed for {host_id} in org {}: {e}",
                scope.0.organization_id
            );
            return Err((
                Status::InternalServerError,
                Json(serde_json::json!({"error": "Host lookup failed"})),
            ));
        }
    };

    let initial = render_host(stores, &host.id).map_err(|e| {
        eprintln!("host stream {}: initial render failed: {e}", host.id);
        (
            Status::InternalServerError,
            Json(serde_json::json!({"error": "Failed to render results"})),
        )
    })?;

    let stores = stores.inner().clone();
    let pubsub = pubsub.inner().clone();

    Ok(EventStream! {
        yield Event::json(&initial).event("snapshot");
        let mut fingerprint = initial.to_string();

        let mut sub = None;
        if let Some(bus) = pubsub.bus.as_ref() {
            match bus.subscribe(&events::host_topic(&host.id)).await {
                Ok(s) => sub = Some(s),
                Err(e) => {
                    eprintln!("host stream {}: subscribe failed, polling: {e}", host.id);
                }
            }
        }

        match sub {
            Some(mut sub) => {
                let mut heartbeat = interval(HEARTBEAT_INTERVAL);
                loop {
                    tokio::select! {
                        delivery = sub.next() => {
                            let Some(delivery) = delivery else { break };
                            match serde_json::from_slice::<QueryResultEvent>(&delivery.payload) {
                                Ok(event) if event.host_id == host.id => {
                                    match render_host(&stores, &host.id) {
                                        Ok(doc) => {
                                            delivery.ack();
                                            yield Event::json(&doc).event("snapshot");
                                        }
                                        Err(e) => {
                                            eprintln!("host stream {}: render failed: {e}", host.id);
                                            delivery.nack().await;
                                        }
                                    }
                                }
                                // Not ours: acknowledge and drop
                                _ => delivery.ack(),
                            }
                        }
                        _ = heartbeat.tick() => {
                            let now = chrono::Utc::now().to_rfc3339();
                            yield Event::json(&serde_json::json!({"time": now})).event("heartbeat");
                        }
                    }
                }
            }
            None => {
                let mut poll = interval(POLL_INTERVAL);
                loop {
                    poll.tick().await;
                    match render_host(&stores, &host.id) {
                        Ok(doc) => {
                            let fp = doc.to_string();
                            if fp != fingerprint {
                                fingerprint = fp;
                                yield Event::json(&doc).event("snapshot");
                            }
                        }
                        Err(e) => eprintln!("host stream {}: poll failed: {e}", host.id),
                    }
                }
            }
        }
    })
}

#[get("/campaigns/<campaign_id>/results")]
pub fn campaign_results_stream(
    stores: &State<Stores>,
    pubsub: &State<PubSub>,
    scope: OperatorScope,
    campaign_id: &str,
) -> Result<EventStream![Event + 'static], (Status, Json<serde_json::Value>)> {
    open_campaign_stream(stores, pubsub, scope, campaign_id)
}

#[get("/api/v1/campaigns/<campaign_id>/results")]
pub fn api_campaign_results_stream(
    stores: &State<Stores>,
    pubsub: &State<PubSub>,
    scope: OperatorScope,
    campaign_id: &str,
) -> Result<EventStream![Event + 'static], (Status, Json<serde_json::Value>)> {
    open_campaign_stream(stores, pubsub, scope, campaign_id)
}

fn open_campaign_stream(
    stores: &State<Stores>,
    pubsub: &State<PubSub>,
    scope: OperatorScope,
    campaign_id: &str,
) -> Result<EventStream![Event + 'static], (Status, Json<serde_json::Value>)> {
    let organization_id = scope.0.organization_id.clone();
    let (initial, initial_terminal) = match render_campaign(stores, campaign_id, &organization_id)
    {
        Ok(Some(rendered)) => rendered,
        Ok(None) => {
            return Err((
                Status::NotFound,
                Json(serde_json::json!({"error": "Campaign not found"})),
            ));
        }
        Err(e) => {
            eprintln!("campaign stream {campaign_id}: initial render failed: {e}");
            return Err((
                Status::InternalServerError,
                Json(serde_json::json!({"error": "Failed to render campaign"})),
            ));
        }
    };

    let stores = stores.inner().clone();
    let pubsub = pubsub.inner().clone();
    let campaign_id = campaign_id.to_string();

    Ok(EventStream! {
        yield Event::json(&initial).event("snapshot");
        let mut fingerprint = initial.to_string();

        // Terminal campaigns get their final snapshot and nothing more
        if !initial_terminal {
            let mut sub = None;
            if let Some(bus) = pubsub.bus.as_ref() {
                match bus.subscribe(&events::campaign_topic(&campaign_id)).await {
                    Ok(s) => sub = Some(s),
                    Err(e) => {
                        eprintln!("campaign stream {campaign_id}: subscribe failed, polling: {e}");
                    }
                }
            }

            match sub {
                Some(mut sub) => {
                    let mut heartbeat = interval(HEARTBEAT_INTERVAL);
                    loop {
                        tokio::select! {
                            delivery = sub.next() => {
                                let Some(delivery) = delivery else { break };
                                match serde_json::from_slice::<CampaignResultEvent>(&delivery.payload) {
                                    Ok(event) if event.campaign_id == campaign_id => {
                                        match render_campaign(&stores, &campaign_id, &organization_id) {
                                            Ok(Some((doc, terminal))) => {
                                                delivery.ack();
                                                yield Event::json(&doc).event("snapshot");
                                                if terminal {
                                                    break;
                                                }
                                            }
                                            Ok(None) => {
                                                delivery.ack();
                                                break;
                                            }
                                            Err(e) => {
                                                eprintln!("campaign stream {campaign_id}: render failed: {e}");
                                                delivery.nack().await;
                                            }
                                        }
                                    }
                                    _ => delivery.ack(),
                                }
                            }
                            _ = heartbeat.tick() => {
                                let now = chrono::Utc::now().to_rfc3339();
                                yield Event::json(&serde_json::json!({"time": now})).event("heartbeat");
                            }
                        }
                    }
                }
                None => {
                    let mut poll = interval(POLL_INTERVAL);
                    loop {
                        poll.tick().await;
                        match render_campaign(&stores, &campaign_id, &organization_id) {
                            Ok(Some((doc, terminal))) => {
                                let fp = doc.to_string();
                                if fp != fingerprint {
                                    fingerprint = fp;
                                    yield Event::json(&doc).event("snapshot");
                                }
                                if terminal {
                                    break;
                                }
                            }
                            Ok(None) => break,
                            Err(e) => {
                                eprintln!("campaign stream {campaign_id}: poll failed: {e}");
                            }
                        }
                    }
                }
            }
        }
    })
}
