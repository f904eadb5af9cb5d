use super::{LogStore, StoreResult};
use crate::db::{Db, new_id};
use rusqlite::params;
use std::sync::Arc;

pub struct SqliteLogStore {
    db: Arc<Db>,
}

impl SqliteLogStore {
    pub fn new(db: Arc<Db>) -> Self {
        SqliteLogStore { db }
    }

    fn append(
        &self,
        table: &str,
        host_id: &str,
        line: &serde_json::Value,
        unix_time: i64,
    ) -> StoreResult<()> {
        let conn = self.db.conn();
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            &format!(
                "INSERT INTO {table} (id, host_id, line, unix_time, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)"
            ),
            params![
                new_id(),
                host_id,
                serde_json::to_string(line).unwrap(),
                unix_time,
                &now
            ],
        )?;
        Ok(())
    }
}

impl LogStore for SqliteLogStore {
    fn append_status_log(
        &self,
        host_id: &str,
        line: &serde_json::Value,
        unix_time: i64,
    ) -> StoreResult<()> {
        self.append("status_logs", host_id, line, unix_time)
    }

    fn append_result_log(
        &self,
        host_id: &str,
        line: &serde_json::Value,
        unix_time: i64,
    ) -> StoreResult<()> {
        self.append("result_logs", host_id, line, unix_time)
    }
}
