//! Named pointer sets within a session (spec §3.1).

use chrono::Utc;
use conduit_protocol::Branch;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{Result, StoreError};

pub struct BranchRepo {
    pool: SqlitePool,
}

impl BranchRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        session_id: &str,
        name: &str,
        description: Option<&str>,
        root_event_id: Uuid,
        head_event_id: Uuid,
        is_default: bool,
    ) -> Result<Branch> {
        let id = format!("branch_{}", Uuid::now_v7());
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO branches (id, session_id, name, description, root_event_id,
                head_event_id, is_default, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
        )
        .bind(&id)
        .bind(session_id)
        .bind(name)
        .bind(description)
        .bind(root_event_id.to_string())
        .bind(head_event_id.to_string())
        .bind(is_default)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(Branch {
            id,
            session_id: session_id.to_string(),
            name: name.to_string(),
            description: description.map(String::from),
            root_event_id,
            head_event_id,
            is_default,
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn list(&self, session_id: &str) -> Result<Vec<Branch>> {
        let rows = sqlx::query_as::<_, BranchRow>(
            "SELECT id, session_id, name, description, root_event_id, head_event_id,
                is_default, created_at, updated_at FROM branches WHERE session_id = ?1",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn advance_head(&self, branch_id: &str, head_event_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE branches SET head_event_id = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(head_event_id.to_string())
            .bind(Utc::now().to_rfc3339())
            .bind(branch_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct BranchRow {
    id: String,
    session_id: String,
    name: String,
    description: Option<String>,
    root_event_id: String,
    head_event_id: String,
    is_default: bool,
    created_at: String,
    updated_at: String,
}

impl TryFrom<BranchRow> for Branch {
    type Error = StoreError;

    fn try_from(row: BranchRow) -> Result<Self> {
        Ok(Branch {
            id: row.id.clone(),
            session_id: row.session_id,
            name: row.name,
            description: row.description,
            root_event_id: row.root_event_id.parse().map_err(|_| {
                StoreError::DecodeFailed {
                    event_id: row.id.clone(),
                    reason: "bad root_event_id".to_string(),
                }
            })?,
            head_event_id: row.head_event_id.parse().map_err(|_| {
                StoreError::DecodeFailed {
                    event_id: row.id.clone(),
                    reason: "bad head_event_id".to_string(),
                }
            })?,
            is_default: row.is_default,
            created_at: row.created_at.parse().unwrap_or_else(|_| Utc::now()),
            updated_at: row.updated_at.parse().unwrap_or_else(|_| Utc::now()),
        })
    }
}
