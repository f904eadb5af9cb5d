use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Operator {
    pub id: String,
    pub email: String,
    pub api_token: String,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Host {
    pub id: String,
    pub organization_id: String,
    pub host_identifier: String,
    /// Agent credential; never serialized into operator-facing responses.
    #[serde(skip_serializing)]
    pub node_key: String,
    pub details: serde_json::Value,
    pub last_enrollment_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_config_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_logger_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_distributed_at: Option<String>,
}

// --- Campaign lifecycle ---

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Pending => "pending",
            CampaignStatus::Running => "running",
            CampaignStatus::Completed => "completed",
            CampaignStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(CampaignStatus::Pending),
            "running" => Some(CampaignStatus::Running),
            "completed" => Some(CampaignStatus::Completed),
            "failed" => Some(CampaignStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CampaignStatus::Completed | CampaignStatus::Failed)
    }
}

impl FromSql for CampaignStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Self::parse(value.as_str()?).ok_or(FromSqlError::InvalidType)
    }
}

impl ToSql for CampaignStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TargetStatus {
    Pending,
    Sent,
    Completed,
    Failed,
}

impl TargetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetStatus::Pending => "pending",
            TargetStatus::Sent => "sent",
            TargetStatus::Completed => "completed",
            TargetStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TargetStatus::Pending),
            "sent" => Some(TargetStatus::Sent),
            "completed" => Some(TargetStatus::Completed),
            "failed" => Some(TargetStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TargetStatus::Completed | TargetStatus::Failed)
    }
}

impl FromSql for TargetStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Self::parse(value.as_str()?).ok_or(FromSqlError::InvalidType)
    }
}

impl ToSql for TargetStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Campaign {
    pub id: String,
    pub organization_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub status: CampaignStatus,
    pub target_count: i64,
    pub result_count: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CampaignTarget {
    pub campaign_id: String,
    pub host_id: String,
    pub status: TargetStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Target row joined with the host identifier, for campaign views.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TargetRow {
    pub host_id: String,
    pub host_identifier: String,
    pub status: TargetStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A host's view of one campaign target, for host detail and live streams.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HostResult {
    pub campaign_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campaign_name: Option<String>,
    pub query: String,
    pub status: TargetStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Campaign creation parameters handed to the campaign store.
#[derive(Debug, Clone)]
pub struct NewCampaign {
    pub organization_id: String,
    pub created_by: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub query: String,
    pub host_ids: Vec<String>,
}

// --- Agent wire messages (osquery TLS remote API) ---

#[derive(Debug, Deserialize)]
pub struct EnrollRequest {
    pub enroll_secret: String,
    pub host_identifier: String,
    #[serde(default)]
    pub host_details: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct NodeKeyRequest {
    pub node_key: String,
}

#[derive(Debug, Deserialize)]
pub struct LoggerRequest {
    pub node_key: String,
    pub log_type: String,
    #[serde(default)]
    pub data: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct DistributedWriteRequest {
    pub node_key: String,
    #[serde(default)]
    pub queries: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub statuses: HashMap<String, i64>,
}

/// Decode osquery's `unixTime` field: JSON integer, float, or string
/// (with optional fractional part), truncated to integer seconds.
pub fn parse_unix_time(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => {
            n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64))
        }
        serde_json::Value::String(s) => {
            let s = s.trim();
            if let Ok(n) = s.parse::<i64>() {
                Some(n)
            } else {
                s.parse::<f64>().ok().map(|f| f.trunc() as i64)
            }
        }
        _ => None,
    }
}

// --- Operator API requests ---

#[derive(Debug, Deserialize)]
pub struct CreateCampaign {
    pub query: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub host_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct QueueHostQuery {
    pub query: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}
