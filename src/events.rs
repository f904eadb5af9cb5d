use serde::{Deserialize, Serialize};

/// Topic carrying per-host result updates (legacy topic, still published).
pub fn host_topic(host_id: &str) -> String {
    format!("query_results:{host_id}")
}

/// Topic carrying per-campaign result updates.
pub fn campaign_topic(campaign_id: &str) -> String {
    format!("campaign:{campaign_id}")
}

/// Published on `query_results:{host}` when a target result lands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResultEvent {
    pub host_id: String,
    pub query_id: String,
    pub status: String,
    pub occurred_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Published on `campaign:{campaign}` when a target result lands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignResultEvent {
    pub campaign_id: String,
    pub host_id: String,
    pub host_identifier: String,
    pub status: String,
    pub occurred_at: String,
    pub row_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
