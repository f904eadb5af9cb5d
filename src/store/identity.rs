use super::{IdentityStore, RequestScope, StoreError, StoreResult};
use crate::db::{Db, generate_api_token, generate_enroll_secret, new_id};
use crate::models::{Operator, Organization};
use rusqlite::{Connection, OptionalExtension, params};
use std::sync::Arc;

pub struct SqliteIdentityStore {
    db: Arc<Db>,
}

impl SqliteIdentityStore {
    pub fn new(db: Arc<Db>) -> Self {
        SqliteIdentityStore { db }
    }
}

fn row_to_scope(row: &rusqlite::Row<'_>) -> rusqlite::Result<RequestScope> {
    Ok(RequestScope {
        operator_id: row.get(0)?,
        email: row.get(1)?,
        organization_id: row.get(2)?,
        organization_name: row.get(3)?,
    })
}

/// Deactivate any active secret for the organization and insert a fresh
/// active one. Runs inside the caller's transaction.
fn mint_active_secret(
    conn: &Connection,
    organization_id: &str,
    organization_name: &str,
) -> StoreResult<String> {
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE enroll_secrets SET active = 0 WHERE organization_id = ?1 AND active = 1",
        params![organization_id],
    )?;
    let secret = generate_enroll_secret(organization_name);
    conn.execute(
        "INSERT INTO enroll_secrets (secret, organization_id, active, created_at) VALUES (?1, ?2, 1, ?3)",
        params![&secret, organization_id, &now],
    )?;
    Ok(secret)
}

impl IdentityStore for SqliteIdentityStore {
    fn create_organization(
        &self,
        name: &str,
        owner_operator_id: &str,
    ) -> StoreResult<Organization> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::InvalidName);
        }
        let mut conn = self.db.conn();
        let tx = conn.transaction()?;

        let id = new_id();
        let now = chrono::Utc::now().to_rfc3339();
        match tx.execute(
            "INSERT INTO organizations (id, name, created_at) VALUES (?1, ?2, ?3)",
            params![&id, name, &now],
        ) {
            Ok(_) => {}
            Err(e) if e.to_string().contains("UNIQUE") => return Err(StoreError::NameTaken),
            Err(e) => return Err(e.into()),
        }
        tx.execute(
            "INSERT INTO memberships (operator_id, organization_id, role) VALUES (?1, ?2, 'owner')",
            params![owner_operator_id, &id],
        )?;
        // New organizations are immediately enrollable
        mint_active_secret(&tx, &id, name)?;
        tx.commit()?;

        Ok(Organization {
            id,
            name: name.to_string(),
            created_at: now,
        })
    }

    fn lookup_by_enroll_secret(&self, secret: &str) -> StoreResult<Organization> {
        let conn = self.db.conn();
        conn.query_row(
            "SELECT o.id, o.name, o.created_at
             FROM enroll_secrets s JOIN organizations o ON o.id = s.organization_id
             WHERE s.secret = ?1 AND s.active = 1",
            params![secret],
            |row| {
                Ok(Organization {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    created_at: row.get(2)?,
                })
            },
        )
        .optional()?
        .ok_or(StoreError::NotFound)
    }

    fn rotate_enroll_secret(&self, organization_id: &str) -> StoreResult<String> {
        let mut conn = self.db.conn();
        let tx = conn.transaction()?;
        let name: String = tx
            .query_row(
                "SELECT name FROM organizations WHERE id = ?1",
                params![organization_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(StoreError::NotFound)?;
        let secret = mint_active_secret(&tx, organization_id, &name)?;
        tx.commit()?;
        Ok(secret)
    }

    fn create_operator(&self, email: &str) -> StoreResult<Operator> {
        let conn = self.db.conn();
        let id = new_id();
        let api_token = generate_api_token();
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO operators (id, email, api_token, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![&id, email, &api_token, &now],
        )?;
        Ok(Operator {
            id,
            email: email.to_string(),
            api_token,
            created_at: now,
        })
    }

    fn scope_for_token(
        &self,
        token: &str,
        organization_hint: Option<&str>,
    ) -> StoreResult<RequestScope> {
        let conn = self.db.conn();
        let scope = match organization_hint {
            Some(org_id) => conn
                .query_row(
                    "SELECT p.id, p.email, o.id, o.name
                     FROM operators p
                     JOIN memberships m ON m.operator_id = p.id
                     JOIN organizations o ON o.id = m.organization_id
                     WHERE p.api_token = ?1 AND o.id = ?2",
                    params![token, org_id],
                    row_to_scope,
                )
                .optional()?,
            None => conn
                .query_row(
                    "SELECT p.id, p.email, o.id, o.name
                     FROM operators p
                     JOIN memberships m ON m.operator_id = p.id
                     JOIN organizations o ON o.id = m.organization_id
                     WHERE p.api_token = ?1
                     ORDER BY o.created_at ASC LIMIT 1",
                    params![token],
                    row_to_scope,
                )
                .optional()?,
        };
        scope.ok_or(StoreError::NotFound)
    }
}
