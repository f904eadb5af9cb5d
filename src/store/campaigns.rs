use super::{CampaignStore, StoreError, StoreResult};
use crate::db::{Db, new_id};
use crate::models::{
    Campaign, CampaignStatus, CampaignTarget, HostResult, NewCampaign, TargetRow, TargetStatus,
};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use std::collections::HashMap;
use std::sync::Arc;

pub struct SqliteCampaignStore {
    db: Arc<Db>,
}

impl SqliteCampaignStore {
    pub fn new(db: Arc<Db>) -> Self {
        SqliteCampaignStore { db }
    }
}

const CAMPAIGN_COLUMNS: &str = "id, organization_id, name, description, query, created_by, \
     created_at, updated_at, status, target_count, result_count";

fn row_to_campaign(row: &Row<'_>) -> rusqlite::Result<Campaign> {
    Ok(Campaign {
        id: row.get(0)?,
        organization_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        query: row.get(4)?,
        created_by: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
        status: row.get(8)?,
        target_count: row.get(9)?,
        result_count: row.get(10)?,
    })
}

fn results_column(raw: Option<String>) -> Option<serde_json::Value> {
    raw.map(|s| serde_json::from_str(&s).unwrap_or(serde_json::json!([])))
}

fn read_campaign(conn: &Connection, campaign_id: &str) -> rusqlite::Result<Option<Campaign>> {
    conn.query_row(
        &format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = ?1"),
        params![campaign_id],
        row_to_campaign,
    )
    .optional()
}

fn read_target(
    conn: &Connection,
    campaign_id: &str,
    host_id: &str,
) -> rusqlite::Result<Option<CampaignTarget>> {
    conn.query_row(
        "SELECT campaign_id, host_id, status, sent_at, completed_at, results, error
         FROM campaign_targets WHERE campaign_id = ?1 AND host_id = ?2",
        params![campaign_id, host_id],
        |row| {
            let raw: Option<String> = row.get(5)?;
            Ok(CampaignTarget {
                campaign_id: row.get(0)?,
                host_id: row.get(1)?,
                status: row.get(2)?,
                sent_at: row.get(3)?,
                completed_at: row.get(4)?,
                results: results_column(raw),
                error: row.get(6)?,
            })
        },
    )
    .optional()
}

impl CampaignStore for SqliteCampaignStore {
    fn queue_query(&self, new: NewCampaign) -> StoreResult<Campaign> {
        if new.host_ids.is_empty() {
            return Err(StoreError::EmptyTargetSet);
        }
        let mut conn = self.db.conn();
        let tx = conn.transaction()?;

        let id = new_id();
        let now = chrono::Utc::now().to_rfc3339();
        let target_count = new.host_ids.len() as i64;
        tx.execute(
            "INSERT INTO campaigns
                 (id, organization_id, name, description, query, created_by,
                  created_at, updated_at, status, target_count, result_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, ?8, ?9, 0)",
            params![
                &id,
                &new.organization_id,
                &new.name,
                &new.description,
                &new.query,
                &new.created_by,
                &now,
                CampaignStatus::Pending,
                target_count
            ],
        )?;
        for host_id in &new.host_ids {
            tx.execute(
                "INSERT INTO campaign_targets (campaign_id, host_id, status, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![&id, host_id, TargetStatus::Pending, &now],
            )?;
        }
        tx.commit()?;

        Ok(Campaign {
            id,
            organization_id: new.organization_id,
            name: new.name,
            description: new.description,
            query: new.query,
            created_by: new.created_by,
            created_at: now.clone(),
            updated_at: now,
            status: CampaignStatus::Pending,
            target_count,
            result_count: 0,
        })
    }

    fn claim_pending(&self, host_id: &str) -> StoreResult<HashMap<String, String>> {
        let mut conn = self.db.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = chrono::Utc::now().to_rfc3339();

        // Conditional UPDATE … RETURNING is the exclusivity guarantee: the
        // status check and the transition are one statement, so a target can
        // transition pending → sent at most once no matter how many callers
        // race on this host.
        let claimed: Vec<String> = {
            let mut stmt = tx.prepare(
                "UPDATE campaign_targets SET status = 'sent', sent_at = ?1
                 WHERE host_id = ?2 AND status = 'pending'
                   AND campaign_id IN
                       (SELECT id FROM campaigns WHERE status IN ('pending', 'running'))
                 RETURNING campaign_id",
            )?;
            stmt.query_map(params![&now, host_id], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?
        };

        let mut queries = HashMap::new();
        for campaign_id in &claimed {
            tx.execute(
                "UPDATE campaigns SET status = 'running', updated_at = ?1
                 WHERE id = ?2 AND status = 'pending'",
                params![&now, campaign_id],
            )?;
            let query: String = tx.query_row(
                "SELECT query FROM campaigns WHERE id = ?1",
                params![campaign_id],
                |row| row.get(0),
            )?;
            queries.insert(campaign_id.clone(), query);
        }
        tx.commit()?;
        Ok(queries)
    }

    fn record_result(
        &self,
        host_id: &str,
        campaign_id: &str,
        status: TargetStatus,
        results: Option<&serde_json::Value>,
        error: Option<&str>,
    ) -> StoreResult<(Campaign, CampaignTarget)> {
        let mut conn = self.db.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = chrono::Utc::now().to_rfc3339();

        // Agents may retry: a write for a target that is not (or no longer)
        // in `sent` still lands and the aggregate is recomputed below.
        let affected = tx.execute(
            "UPDATE campaign_targets
             SET status = ?1, completed_at = ?2, results = ?3, error = ?4
             WHERE campaign_id = ?5 AND host_id = ?6",
            params![
                status,
                &now,
                results.map(|v| serde_json::to_string(v).unwrap()),
                error,
                campaign_id,
                host_id
            ],
        )?;
        if affected == 0 {
            return Err(StoreError::NoSuchTarget);
        }

        let open: i64 = tx.query_row(
            "SELECT COUNT(*) FROM campaign_targets
             WHERE campaign_id = ?1 AND status IN ('pending', 'sent')",
            params![campaign_id],
            |row| row.get(0),
        )?;
        let failed: i64 = tx.query_row(
            "SELECT COUNT(*) FROM campaign_targets
             WHERE campaign_id = ?1 AND status = 'failed'",
            params![campaign_id],
            |row| row.get(0),
        )?;
        let finished: i64 = tx.query_row(
            "SELECT COUNT(*) FROM campaign_targets
             WHERE campaign_id = ?1 AND status IN ('completed', 'failed')",
            params![campaign_id],
            |row| row.get(0),
        )?;

        let campaign_status = if open > 0 {
            CampaignStatus::Running
        } else if failed > 0 {
            CampaignStatus::Failed
        } else {
            CampaignStatus::Completed
        };
        tx.execute(
            "UPDATE campaigns SET status = ?1, result_count = ?2, updated_at = ?3 WHERE id = ?4",
            params![campaign_status, finished, &now, campaign_id],
        )?;

        let campaign = read_campaign(&tx, campaign_id)?.ok_or(StoreError::NoSuchTarget)?;
        let target = read_target(&tx, campaign_id, host_id)?.ok_or(StoreError::NoSuchTarget)?;
        tx.commit()?;
        Ok((campaign, target))
    }

    fn get_campaign(
        &self,
        campaign_id: &str,
        organization_id: &str,
    ) -> StoreResult<Option<Campaign>> {
        let conn = self.db.conn();
        let campaign = conn
            .query_row(
                &format!(
                    "SELECT {CAMPAIGN_COLUMNS} FROM campaigns
                     WHERE id = ?1 AND organization_id = ?2"
                ),
                params![campaign_id, organization_id],
                row_to_campaign,
            )
            .optional()?;
        Ok(campaign)
    }

    fn list_campaigns(&self, organization_id: &str, limit: i64) -> StoreResult<Vec<Campaign>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE organization_id = ?1
             ORDER BY created_at DESC LIMIT ?2"
        ))?;
        let campaigns = stmt
            .query_map(params![organization_id, limit], row_to_campaign)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(campaigns)
    }

    fn list_targets(&self, campaign_id: &str) -> StoreResult<Vec<TargetRow>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT t.host_id, h.host_identifier, t.status, t.sent_at, t.completed_at,
                    t.results, t.error
             FROM campaign_targets t JOIN hosts h ON h.id = t.host_id
             WHERE t.campaign_id = ?1
             ORDER BY h.host_identifier",
        )?;
        let targets = stmt
            .query_map(params![campaign_id], |row| {
                let raw: Option<String> = row.get(5)?;
                Ok(TargetRow {
                    host_id: row.get(0)?,
                    host_identifier: row.get(1)?,
                    status: row.get(2)?,
                    sent_at: row.get(3)?,
                    completed_at: row.get(4)?,
                    results: results_column(raw),
                    error: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(targets)
    }

    fn recent_results(&self, host_id: &str, limit: i64) -> StoreResult<Vec<HostResult>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT t.campaign_id, c.name, c.query, t.status, t.sent_at, t.completed_at,
                    t.results, t.error
             FROM campaign_targets t JOIN campaigns c ON c.id = t.campaign_id
             WHERE t.host_id = ?1
             ORDER BY COALESCE(t.completed_at, t.sent_at, t.created_at) DESC
             LIMIT ?2",
        )?;
        let results = stmt
            .query_map(params![host_id, limit], |row| {
                let raw: Option<String> = row.get(6)?;
                Ok(HostResult {
                    campaign_id: row.get(0)?,
                    campaign_name: row.get(1)?,
                    query: row.get(2)?,
                    status: row.get(3)?,
                    sent_at: row.get(4)?,
                    completed_at: row.get(5)?,
                    results: results_column(raw),
                    error: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(results)
    }
}
