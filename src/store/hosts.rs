use super::{HostStore, StoreResult};
use crate::db::{Db, generate_node_key, new_id};
use crate::models::Host;
use rusqlite::{OptionalExtension, Row, params};
use std::sync::Arc;

pub struct SqliteHostStore {
    db: Arc<Db>,
}

impl SqliteHostStore {
    pub fn new(db: Arc<Db>) -> Self {
        SqliteHostStore { db }
    }
}

const HOST_COLUMNS: &str = "id, organization_id, host_identifier, node_key, details, \
     last_enrollment_at, last_config_at, last_logger_at, last_distributed_at";

fn row_to_host(row: &Row<'_>) -> rusqlite::Result<Host> {
    let details_str: String = row.get(4)?;
    Ok(Host {
        id: row.get(0)?,
        organization_id: row.get(1)?,
        host_identifier: row.get(2)?,
        node_key: row.get(3)?,
        details: serde_json::from_str(&details_str).unwrap_or(serde_json::json!({})),
        last_enrollment_at: row.get(5)?,
        last_config_at: row.get(6)?,
        last_logger_at: row.get(7)?,
        last_distributed_at: row.get(8)?,
    })
}

impl SqliteHostStore {
    fn touch(&self, column: &str, node_key: &str) -> StoreResult<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let conn = self.db.conn();
        // Idempotent; unknown node keys update zero rows
        conn.execute(
            &format!("UPDATE hosts SET {column} = ?1 WHERE node_key = ?2"),
            params![&now, node_key],
        )?;
        Ok(())
    }
}

impl HostStore for SqliteHostStore {
    fn enroll(
        &self,
        host_identifier: &str,
        details: &serde_json::Value,
        organization_id: &str,
    ) -> StoreResult<String> {
        let conn = self.db.conn();
        let node_key = generate_node_key();
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO hosts (id, organization_id, host_identifier, node_key, details, last_enrollment_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(organization_id, host_identifier) DO UPDATE SET
                 node_key = excluded.node_key,
                 details = excluded.details,
                 last_enrollment_at = excluded.last_enrollment_at",
            params![
                new_id(),
                organization_id,
                host_identifier,
                &node_key,
                serde_json::to_string(details).unwrap(),
                &now
            ],
        )?;
        Ok(node_key)
    }

    fn by_node_key(&self, node_key: &str) -> StoreResult<Option<Host>> {
        let conn = self.db.conn();
        let host = conn
            .query_row(
                &format!("SELECT {HOST_COLUMNS} FROM hosts WHERE node_key = ?1"),
                params![node_key],
                row_to_host,
            )
            .optional()?;
        Ok(host)
    }

    fn by_id_in_org(&self, host_id: &str, organization_id: &str) -> StoreResult<Option<Host>> {
        let conn = self.db.conn();
        let host = conn
            .query_row(
                &format!(
                    "SELECT {HOST_COLUMNS} FROM hosts WHERE id = ?1 AND organization_id = ?2"
                ),
                params![host_id, organization_id],
                row_to_host,
            )
            .optional()?;
        Ok(host)
    }

    fn list_in_org(&self, organization_id: &str) -> StoreResult<Vec<Host>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {HOST_COLUMNS} FROM hosts WHERE organization_id = ?1
             ORDER BY last_logger_at IS NULL, last_logger_at DESC, host_identifier"
        ))?;
        let hosts = stmt
            .query_map(params![organization_id], row_to_host)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(hosts)
    }

    fn touch_config(&self, node_key: &str) -> StoreResult<()> {
        self.touch("last_config_at", node_key)
    }

    fn touch_logger(&self, node_key: &str) -> StoreResult<()> {
        self.touch("last_logger_at", node_key)
    }

    fn touch_distributed(&self, node_key: &str) -> StoreResult<()> {
        self.touch("last_distributed_at", node_key)
    }
}
