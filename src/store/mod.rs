// Store layer decomposition — one abstraction per store, SQLite
// implementations below. Handlers depend only on the traits so tests can
// substitute fakes.

mod agent_config;
mod campaigns;
mod hosts;
mod identity;
mod logs;

pub use agent_config::SqliteConfigStore;
pub use campaigns::SqliteCampaignStore;
pub use hosts::SqliteHostStore;
pub use identity::SqliteIdentityStore;
pub use logs::SqliteLogStore;

use crate::db::Db;
use crate::models::{
    Campaign, CampaignTarget, Host, HostResult, NewCampaign, Operator, Organization, TargetRow,
    TargetStatus,
};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("organization name already taken")]
    NameTaken,
    #[error("organization name must not be empty")]
    InvalidName,
    #[error("not found")]
    NotFound,
    #[error("no such campaign target")]
    NoSuchTarget,
    #[error("campaign requires at least one target")]
    EmptyTargetSet,
    #[error(transparent)]
    Db(#[from] rusqlite::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Per-request operator context: the authenticated operator and the active
/// organization, resolved once by the request guard and passed explicitly to
/// handlers and stores.
#[derive(Debug, Clone)]
pub struct RequestScope {
    pub operator_id: String,
    pub email: String,
    pub organization_id: String,
    pub organization_name: String,
}

pub trait IdentityStore: Send + Sync {
    /// Insert the organization, the owner membership, and the initial active
    /// enrollment secret in one transaction. `NameTaken` on duplicate name.
    fn create_organization(&self, name: &str, owner_operator_id: &str)
    -> StoreResult<Organization>;

    /// Resolve an organization through an *active* enrollment secret.
    fn lookup_by_enroll_secret(&self, secret: &str) -> StoreResult<Organization>;

    /// Deactivate all current secrets and mint a fresh one, transactionally.
    /// Exactly one active secret exists after commit.
    fn rotate_enroll_secret(&self, organization_id: &str) -> StoreResult<String>;

    fn create_operator(&self, email: &str) -> StoreResult<Operator>;

    /// API token (+ optional organization hint) → request scope.
    fn scope_for_token(
        &self,
        token: &str,
        organization_hint: Option<&str>,
    ) -> StoreResult<RequestScope>;
}

pub trait HostStore: Send + Sync {
    /// Upsert on (organization, host identifier); always mints a fresh node
    /// key and refreshes the enrollment timestamp. Returns the node key.
    fn enroll(
        &self,
        host_identifier: &str,
        details: &serde_json::Value,
        organization_id: &str,
    ) -> StoreResult<String>;

    fn by_node_key(&self, node_key: &str) -> StoreResult<Option<Host>>;
    fn by_id_in_org(&self, host_id: &str, organization_id: &str) -> StoreResult<Option<Host>>;

    /// Hosts in an organization, most recently heard-from first.
    fn list_in_org(&self, organization_id: &str) -> StoreResult<Vec<Host>>;

    fn touch_config(&self, node_key: &str) -> StoreResult<()>;
    fn touch_logger(&self, node_key: &str) -> StoreResult<()>;
    fn touch_distributed(&self, node_key: &str) -> StoreResult<()>;
}

pub trait CampaignStore: Send + Sync {
    /// Atomically insert the campaign plus one pending target per host.
    fn queue_query(&self, new: NewCampaign) -> StoreResult<Campaign>;

    /// Atomic drain: claim this host's pending targets (campaigns still
    /// pending/running), mark them sent, promote enclosing pending campaigns
    /// to running, and return `campaign id → query`. Two concurrent calls for
    /// the same host never claim the same target.
    fn claim_pending(&self, host_id: &str) -> StoreResult<HashMap<String, String>>;

    /// Record one target outcome and recompute the campaign aggregate in a
    /// single transaction. Returns the updated campaign and target.
    fn record_result(
        &self,
        host_id: &str,
        campaign_id: &str,
        status: TargetStatus,
        results: Option<&serde_json::Value>,
        error: Option<&str>,
    ) -> StoreResult<(Campaign, CampaignTarget)>;

    fn get_campaign(&self, campaign_id: &str, organization_id: &str)
    -> StoreResult<Option<Campaign>>;
    fn list_campaigns(&self, organization_id: &str, limit: i64) -> StoreResult<Vec<Campaign>>;

    /// Targets joined with host identifiers, ordered by identifier.
    fn list_targets(&self, campaign_id: &str) -> StoreResult<Vec<TargetRow>>;

    /// A host's targets, most recently touched first.
    fn recent_results(&self, host_id: &str, limit: i64) -> StoreResult<Vec<HostResult>>;
}

pub trait ConfigStore: Send + Sync {
    fn set_host_config(&self, host_id: &str, config: &serde_json::Value) -> StoreResult<()>;
    fn set_default_config(&self, config: &serde_json::Value) -> StoreResult<()>;

    /// The host's own config row, falling back to the `default` row, falling
    /// back to an empty document. Returned unchanged; no merging.
    fn effective_config(&self, host_id: &str) -> StoreResult<serde_json::Value>;
}

pub trait LogStore: Send + Sync {
    fn append_status_log(
        &self,
        host_id: &str,
        line: &serde_json::Value,
        unix_time: i64,
    ) -> StoreResult<()>;
    fn append_result_log(
        &self,
        host_id: &str,
        line: &serde_json::Value,
        unix_time: i64,
    ) -> StoreResult<()>;
}

/// The store set handed to Rocket as managed state.
#[derive(Clone)]
pub struct Stores {
    pub identity: Arc<dyn IdentityStore>,
    pub hosts: Arc<dyn HostStore>,
    pub campaigns: Arc<dyn CampaignStore>,
    pub configs: Arc<dyn ConfigStore>,
    pub logs: Arc<dyn LogStore>,
}

impl Stores {
    pub fn sqlite(db: Arc<Db>) -> Self {
        Stores {
            identity: Arc::new(SqliteIdentityStore::new(db.clone())),
            hosts: Arc::new(SqliteHostStore::new(db.clone())),
            campaigns: Arc::new(SqliteCampaignStore::new(db.clone())),
            configs: Arc::new(SqliteConfigStore::new(db.clone())),
            logs: Arc::new(SqliteLogStore::new(db)),
        }
    }
}
