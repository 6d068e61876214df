//! Workspace metadata (spec §4.2).

use chrono::Utc;
use conduit_protocol::Workspace;
use sqlx::SqlitePool;

use crate::error::Result;

pub struct WorkspaceRepo {
    pool: SqlitePool,
}

impl WorkspaceRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Created on first session within a path; never deleted while referenced.
    pub async fn get_or_create(&self, canonical_path: &str, name: &str) -> Result<Workspace> {
        if let Some(ws) = self.find_by_path(canonical_path).await? {
            return Ok(ws);
        }
        let id = Workspace::new_id();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO workspaces (id, canonical_path, name, created_at, last_activity_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
        )
        .bind(&id)
        .bind(canonical_path)
        .bind(name)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(Workspace {
            id,
            canonical_path: canonical_path.to_string(),
            name: name.to_string(),
            created_at: now,
            last_activity_at: now,
        })
    }

    async fn find_by_path(&self, canonical_path: &str) -> Result<Option<Workspace>> {
        let row = sqlx::query_as::<_, WorkspaceRow>(
            "SELECT id, canonical_path, name, created_at, last_activity_at
             FROM workspaces WHERE canonical_path = ?1",
        )
        .bind(canonical_path)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    pub async fn touch(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE workspaces SET last_activity_at = ?1 WHERE id = ?2")
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct WorkspaceRow {
    id: String,
    canonical_path: String,
    name: String,
    created_at: String,
    last_activity_at: String,
}

impl From<WorkspaceRow> for Workspace {
    fn from(row: WorkspaceRow) -> Self {
        Workspace {
            id: row.id,
            canonical_path: row.canonical_path,
            name: row.name,
            created_at: row.created_at.parse().unwrap_or_else(|_| Utc::now()),
            last_activity_at: row.last_activity_at.parse().unwrap_or_else(|_| Utc::now()),
        }
    }
}
