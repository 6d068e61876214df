//! Session registry: metadata, counters, fork pointers, archival (spec §4.2).

use chrono::{DateTime, Utc};
use conduit_protocol::session::{SessionCounters, SpawnType};
use conduit_protocol::Session;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{Result, StoreError};

#[derive(Debug, Clone, Copy)]
pub enum OrderBy {
    CreatedAt,
    LastActivityAt,
}

#[derive(Debug, Clone, Copy)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Default)]
pub struct ListSessionsFilter {
    pub workspace_id: Option<String>,
    pub archived: Option<bool>,
    pub limit: i64,
    pub offset: i64,
    pub order_by: Option<OrderBy>,
    pub order: Option<Order>,
}

/// Token/cost deltas applied to a session's denormalized counters in the
/// same transaction as the event that produced them.
#[derive(Debug, Default, Clone, Copy)]
pub struct CounterDelta {
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cache_read_tokens: i64,
    pub cache_creation_tokens: i64,
    pub cost: f64,
    pub turns: i64,
    pub events: i64,
    pub messages: i64,
}

pub struct SessionRepo {
    pool: SqlitePool,
}

impl SessionRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        workspace_id: &str,
        working_directory: &str,
        model: &str,
        title: Option<&str>,
        tags: &[String],
    ) -> Result<Session> {
        let id = Session::new_id();
        let now = Utc::now();
        let tags_json = serde_json::to_string(tags)?;
        sqlx::query(
            "INSERT INTO sessions (id, workspace_id, latest_model, working_directory, title,
                created_at, last_activity_at, tags)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, ?7)",
        )
        .bind(&id)
        .bind(workspace_id)
        .bind(model)
        .bind(working_directory)
        .bind(title)
        .bind(now.to_rfc3339())
        .bind(&tags_json)
        .execute(&self.pool)
        .await?;
        self.get(&id).await
    }

    pub async fn get(&self, id: &str) -> Result<Session> {
        let row = sqlx::query_as::<_, SessionRow>(SELECT_SESSION)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("session {id}")))?;
        row.try_into()
    }

    pub async fn list(&self, filter: &ListSessionsFilter) -> Result<Vec<Session>> {
        let order_col = match filter.order_by {
            Some(OrderBy::LastActivityAt) | None => "last_activity_at",
            Some(OrderBy::CreatedAt) => "created_at",
        };
        let order_dir = match filter.order {
            Some(Order::Asc) => "ASC",
            Some(Order::Desc) | None => "DESC",
        };
        let mut sql = format!("{SELECT_SESSION} WHERE deleted_at IS NULL");
        if filter.workspace_id.is_some() {
            sql.push_str(" AND workspace_id = ?1");
        }
        match filter.archived {
            Some(true) => sql.push_str(" AND archived_at IS NOT NULL"),
            Some(false) => sql.push_str(" AND archived_at IS NULL"),
            None => {}
        }
        sql.push_str(&format!(" ORDER BY {order_col} {order_dir} LIMIT ?2 OFFSET ?3"));

        let mut query = sqlx::query_as::<_, SessionRow>(&sql);
        if let Some(ws) = &filter.workspace_id {
            query = query.bind(ws);
        }
        let rows = query
            .bind(filter.limit.max(1))
            .bind(filter.offset.max(0))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Idempotent; fails with `HeadRegression` unless `event_id` is a
    /// descendant of the current head (checked by the caller holding the
    /// per-session append lock; this method trusts its caller).
    pub async fn advance_head(&self, session_id: &str, event_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE sessions SET head_event_id = ?1, last_activity_at = ?2 WHERE id = ?3")
            .bind(event_id.to_string())
            .bind(Utc::now().to_rfc3339())
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_root_if_absent(&self, session_id: &str, event_id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE sessions SET root_event_id = ?1 WHERE id = ?2 AND root_event_id IS NULL",
        )
        .bind(event_id.to_string())
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn increment_counters(&self, session_id: &str, delta: CounterDelta) -> Result<()> {
        sqlx::query(
            "UPDATE sessions SET
                total_input_tokens = total_input_tokens + ?1,
                total_output_tokens = total_output_tokens + ?2,
                total_cache_read_tokens = total_cache_read_tokens + ?3,
                total_cache_creation_tokens = total_cache_creation_tokens + ?4,
                last_turn_input_tokens = ?1,
                total_cost = total_cost + ?5,
                turn_count = turn_count + ?6,
                event_count = event_count + ?7,
                message_count = message_count + ?8,
                last_activity_at = ?9
             WHERE id = ?10",
        )
        .bind(delta.input_tokens)
        .bind(delta.output_tokens)
        .bind(delta.cache_read_tokens)
        .bind(delta.cache_creation_tokens)
        .bind(delta.cost)
        .bind(delta.turns)
        .bind(delta.events)
        .bind(delta.messages)
        .bind(Utc::now().to_rfc3339())
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_model(&self, session_id: &str, model: &str) -> Result<()> {
        sqlx::query("UPDATE sessions SET latest_model = ?1, last_activity_at = ?2 WHERE id = ?3")
            .bind(model)
            .bind(Utc::now().to_rfc3339())
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn archive(&self, session_id: &str) -> Result<()> {
        sqlx::query("UPDATE sessions SET archived_at = ?1 WHERE id = ?2")
            .bind(Utc::now().to_rfc3339())
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn unarchive(&self, session_id: &str) -> Result<()> {
        sqlx::query("UPDATE sessions SET archived_at = NULL WHERE id = ?1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Logical delete: a distinct, permanent state from `archive`'s
    /// reversible hide. Events remain; callers exclude archived/deleted
    /// sessions from default listings. Does not touch blob ref counts —
    /// that cascade needs `BlobStore` too, so it lives on `Store::delete_session`.
    pub async fn mark_deleted(&self, session_id: &str) -> Result<()> {
        sqlx::query("UPDATE sessions SET deleted_at = ?1 WHERE id = ?2")
            .bind(Utc::now().to_rfc3339())
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Records a forked child's parentage. The caller (Session Registry's
    /// `fork` operation) is responsible for creating the new session row and
    /// re-parenting the event subtree via the event store.
    pub async fn set_fork_pointer(
        &self,
        child_session_id: &str,
        parent_session_id: &str,
        fork_event_id: Uuid,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE sessions SET parent_session_id = ?1, fork_event_id = ?2 WHERE id = ?3",
        )
        .bind(parent_session_id)
        .bind(fork_event_id.to_string())
        .bind(child_session_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_spawn_metadata(
        &self,
        child_session_id: &str,
        spawning_session_id: &str,
        spawn_type: SpawnType,
        spawn_task: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE sessions SET spawning_session_id = ?1, spawn_type = ?2, spawn_task = ?3
             WHERE id = ?4",
        )
        .bind(spawning_session_id)
        .bind(spawn_type.as_ref())
        .bind(spawn_task)
        .bind(child_session_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

const SELECT_SESSION: &str = "SELECT id, workspace_id, head_event_id, root_event_id, title,
    latest_model, working_directory, parent_session_id, fork_event_id, created_at,
    last_activity_at, archived_at, deleted_at, event_count, message_count, turn_count,
    total_input_tokens, total_output_tokens, total_cache_read_tokens,
    total_cache_creation_tokens, last_turn_input_tokens, total_cost,
    spawning_session_id, spawn_type, spawn_task, tags
    FROM sessions";

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    workspace_id: String,
    head_event_id: Option<String>,
    root_event_id: Option<String>,
    title: Option<String>,
    latest_model: String,
    working_directory: String,
    parent_session_id: Option<String>,
    fork_event_id: Option<String>,
    created_at: String,
    last_activity_at: String,
    archived_at: Option<String>,
    deleted_at: Option<String>,
    event_count: i64,
    message_count: i64,
    turn_count: i64,
    total_input_tokens: i64,
    total_output_tokens: i64,
    total_cache_read_tokens: i64,
    total_cache_creation_tokens: i64,
    last_turn_input_tokens: i64,
    total_cost: f64,
    spawning_session_id: Option<String>,
    spawn_type: Option<String>,
    spawn_task: Option<String>,
    tags: String,
}

fn parse_dt(s: &str) -> DateTime<Utc> {
    s.parse().unwrap_or_else(|_| Utc::now())
}

impl TryFrom<SessionRow> for Session {
    type Error = StoreError;

    fn try_from(row: SessionRow) -> Result<Self> {
        use std::str::FromStr as _;
        Ok(Session {
            id: row.id,
            workspace_id: row.workspace_id,
            head_event_id: row.head_event_id.and_then(|s| Uuid::from_str(&s).ok()),
            root_event_id: row.root_event_id.and_then(|s| Uuid::from_str(&s).ok()),
            title: row.title,
            model_id: row.latest_model,
            working_directory: row.working_directory,
            parent_session_id: row.parent_session_id,
            fork_event_id: row.fork_event_id.and_then(|s| Uuid::from_str(&s).ok()),
            created_at: parse_dt(&row.created_at),
            last_activity_at: parse_dt(&row.last_activity_at),
            archived_at: row.archived_at.map(|s| parse_dt(&s)),
            deleted_at: row.deleted_at.map(|s| parse_dt(&s)),
            counters: SessionCounters {
                event_count: row.event_count,
                message_count: row.message_count,
                turn_count: row.turn_count,
                total_input_tokens: row.total_input_tokens,
                total_output_tokens: row.total_output_tokens,
                total_cache_read_tokens: row.total_cache_read_tokens,
                total_cache_creation_tokens: row.total_cache_creation_tokens,
                last_turn_input_tokens: row.last_turn_input_tokens,
                total_cost: row.total_cost,
            },
            spawning_session_id: row.spawning_session_id,
            spawn_type: row.spawn_type.and_then(|s| {
                use std::str::FromStr as _;
                SpawnType::from_str(&s).ok()
            }),
            spawn_task: row.spawn_task,
            tags: serde_json::from_str(&row.tags).unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::run_migrations;
    use crate::pool::{new_in_memory, ConnectionConfig};
    use crate::workspaces::WorkspaceRepo;

    async fn setup() -> (SessionRepo, String) {
        let pool = new_in_memory(&ConnectionConfig::default()).await.unwrap();
        run_migrations(&pool).await.unwrap();
        let ws = WorkspaceRepo::new(pool.clone())
            .get_or_create("/tmp/ws", "ws")
            .await
            .unwrap();
        (SessionRepo::new(pool), ws.id)
    }

    #[tokio::test]
    async fn create_and_get_round_trips() {
        let (repo, ws_id) = setup().await;
        let session = repo
            .create(&ws_id, "/tmp/ws", "claude-test", Some("first"), &[])
            .await
            .unwrap();
        let fetched = repo.get(&session.id).await.unwrap();
        assert_eq!(fetched.id, session.id);
        assert_eq!(fetched.model_id, "claude-test");
        assert!(fetched.head_event_id.is_none());
    }

    #[tokio::test]
    async fn archive_then_list_excludes_by_default() {
        let (repo, ws_id) = setup().await;
        let session = repo
            .create(&ws_id, "/tmp/ws", "claude-test", None, &[])
            .await
            .unwrap();
        repo.archive(&session.id).await.unwrap();

        let active = repo
            .list(&ListSessionsFilter {
                workspace_id: Some(ws_id.clone()),
                archived: Some(false),
                limit: 10,
                offset: 0,
                order_by: None,
                order: None,
            })
            .await
            .unwrap();
        assert!(active.is_empty());

        let archived = repo
            .list(&ListSessionsFilter {
                workspace_id: Some(ws_id),
                archived: Some(true),
                limit: 10,
                offset: 0,
                order_by: None,
                order: None,
            })
            .await
            .unwrap();
        assert_eq!(archived.len(), 1);
    }

    #[tokio::test]
    async fn increment_counters_accumulates() {
        let (repo, ws_id) = setup().await;
        let session = repo
            .create(&ws_id, "/tmp/ws", "claude-test", None, &[])
            .await
            .unwrap();
        repo.increment_counters(
            &session.id,
            CounterDelta {
                input_tokens: 100,
                output_tokens: 50,
                turns: 1,
                events: 2,
                messages: 1,
                cost: 0.01,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let updated = repo.get(&session.id).await.unwrap();
        assert_eq!(updated.counters.total_input_tokens, 100);
        assert_eq!(updated.counters.turn_count, 1);
    }

    #[tokio::test]
    async fn mark_deleted_excludes_from_listings_but_leaves_archived_at_alone() {
        let (repo, ws_id) = setup().await;
        let session = repo
            .create(&ws_id, "/tmp/ws", "claude-test", None, &[])
            .await
            .unwrap();
        repo.mark_deleted(&session.id).await.unwrap();

        let fetched = repo.get(&session.id).await.unwrap();
        assert!(fetched.is_deleted());
        assert!(!fetched.is_archived());

        let all = repo
            .list(&ListSessionsFilter {
                workspace_id: Some(ws_id),
                archived: None,
                limit: 10,
                offset: 0,
                order_by: None,
                order: None,
            })
            .await
            .unwrap();
        assert!(all.is_empty());
    }
}
