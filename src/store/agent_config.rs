use super::{ConfigStore, StoreResult};
use crate::db::{Db, new_id};
use rusqlite::{OptionalExtension, params};
use std::sync::Arc;

/// Name of the fleet-wide fallback configuration row.
const DEFAULT_CONFIG_NAME: &str = "default";

pub struct SqliteConfigStore {
    db: Arc<Db>,
}

impl SqliteConfigStore {
    pub fn new(db: Arc<Db>) -> Self {
        SqliteConfigStore { db }
    }
}

impl ConfigStore for SqliteConfigStore {
    fn set_host_config(&self, host_id: &str, config: &serde_json::Value) -> StoreResult<()> {
        let conn = self.db.conn();
        conn.execute(
            "INSERT INTO agent_configs (id, host_id, config) VALUES (?1, ?2, ?3)
             ON CONFLICT(host_id) DO UPDATE SET config = excluded.config",
            params![new_id(), host_id, serde_json::to_string(config).unwrap()],
        )?;
        Ok(())
    }

    fn set_default_config(&self, config: &serde_json::Value) -> StoreResult<()> {
        let conn = self.db.conn();
        conn.execute(
            "INSERT INTO agent_configs (id, name, config) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET config = excluded.config",
            params![
                new_id(),
                DEFAULT_CONFIG_NAME,
                serde_json::to_string(config).unwrap()
            ],
        )?;
        Ok(())
    }

    fn effective_config(&self, host_id: &str) -> StoreResult<serde_json::Value> {
        let conn = self.db.conn();
        let raw: Option<String> = conn
            .query_row(
                "SELECT config FROM agent_configs WHERE host_id = ?1",
                params![host_id],
                |row| row.get(0),
            )
            .optional()?;
        let raw = match raw {
            Some(raw) => Some(raw),
            None => conn
                .query_row(
                    "SELECT config FROM agent_configs WHERE name = ?1",
                    params![DEFAULT_CONFIG_NAME],
                    |row| row.get(0),
                )
                .optional()?,
        };
        Ok(raw
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or(serde_json::json!({})))
    }
}
