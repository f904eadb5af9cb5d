use rusqlite::Connection;
use std::sync::{Mutex, MutexGuard};

pub struct Db {
    pub conn: Mutex<Connection>,
}

/// Mint a node key: 32 hex chars of fresh randomness.
pub fn generate_node_key() -> String {
    format!("{:032x}", uuid::Uuid::new_v4().as_u128())
}

/// Generate an operator API token: `qop_<32 hex chars>`
pub fn generate_api_token() -> String {
    format!("qop_{:032x}", uuid::Uuid::new_v4().as_u128())
}

/// Generate an enrollment secret: `<org prefix>-<16 hex chars>`.
/// The prefix is the organization name lowercased, non-alphanumerics dropped.
pub fn generate_enroll_secret(organization_name: &str) -> String {
    let prefix: String = organization_name
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    format!(
        "{}-{:016x}",
        prefix,
        uuid::Uuid::new_v4().as_u128() as u64
    )
}

/// New opaque 128-bit row id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl Db {
    pub fn new(path: &str) -> Self {
        Self::open(path, true)
    }

    pub fn open(path: &str, auto_migrate: bool) -> Self {
        let conn = Connection::open(path).expect("Failed to open database");
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON; PRAGMA busy_timeout=5000;",
        )
        .expect("Failed to set pragmas");
        let db = Db {
            conn: Mutex::new(conn),
        };
        if auto_migrate {
            db.migrate();
        }
        db
    }

    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn migrate(&self) {
        let conn = self.conn();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS organizations (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS enroll_secrets (
                secret TEXT PRIMARY KEY,
                organization_id TEXT NOT NULL REFERENCES organizations(id),
                active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            );

            -- At most one active secret per organization
            CREATE UNIQUE INDEX IF NOT EXISTS idx_enroll_secrets_one_active
                ON enroll_secrets(organization_id) WHERE active = 1;

            CREATE TABLE IF NOT EXISTS operators (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                api_token TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS memberships (
                operator_id TEXT NOT NULL REFERENCES operators(id),
                organization_id TEXT NOT NULL REFERENCES organizations(id),
                role TEXT NOT NULL DEFAULT 'member',
                PRIMARY KEY (operator_id, organization_id)
            );

            CREATE TABLE IF NOT EXISTS hosts (
                id TEXT PRIMARY KEY,
                organization_id TEXT NOT NULL REFERENCES organizations(id),
                host_identifier TEXT NOT NULL,
                node_key TEXT NOT NULL UNIQUE,
                details TEXT NOT NULL DEFAULT '{}',
                last_enrollment_at TEXT NOT NULL,
                last_config_at TEXT,
                last_logger_at TEXT,
                last_distributed_at TEXT,
                UNIQUE(organization_id, host_identifier)
            );
            CREATE INDEX IF NOT EXISTS idx_hosts_org ON hosts(organization_id);

            CREATE TABLE IF NOT EXISTS campaigns (
                id TEXT PRIMARY KEY,
                organization_id TEXT NOT NULL REFERENCES organizations(id),
                name TEXT,
                description TEXT,
                query TEXT NOT NULL,
                created_by TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                target_count INTEGER NOT NULL,
                result_count INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_campaigns_org_created
                ON campaigns(organization_id, created_at);

            CREATE TABLE IF NOT EXISTS campaign_targets (
                campaign_id TEXT NOT NULL REFERENCES campaigns(id) ON DELETE CASCADE,
                host_id TEXT NOT NULL REFERENCES hosts(id),
                status TEXT NOT NULL DEFAULT 'pending',
                created_at TEXT NOT NULL,
                sent_at TEXT,
                completed_at TEXT,
                results TEXT,
                error TEXT,
                PRIMARY KEY (campaign_id, host_id)
            );
            CREATE INDEX IF NOT EXISTS idx_targets_host_status
                ON campaign_targets(host_id, status);

            CREATE TABLE IF NOT EXISTS agent_configs (
                id TEXT PRIMARY KEY,
                host_id TEXT UNIQUE REFERENCES hosts(id),
                name TEXT UNIQUE,
                config TEXT NOT NULL DEFAULT '{}'
            );

            CREATE TABLE IF NOT EXISTS status_logs (
                id TEXT PRIMARY KEY,
                host_id TEXT NOT NULL REFERENCES hosts(id),
                line TEXT NOT NULL,
                unix_time INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_status_logs_host ON status_logs(host_id);

            CREATE TABLE IF NOT EXISTS result_logs (
                id TEXT PRIMARY KEY,
                host_id TEXT NOT NULL REFERENCES hosts(id),
                line TEXT NOT NULL,
                unix_time INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_result_logs_host ON result_logs(host_id);
            ",
        )
        .expect("Failed to run migrations");
    }
}
