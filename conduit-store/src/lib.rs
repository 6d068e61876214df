//! SQLite-backed event store: append-only event tree, blob dedup, FTS,
//! and the pure reconstruction fold.

pub mod blobs;
pub mod branches;
pub mod error;
pub mod events;
pub mod migrations;
pub mod pool;
pub mod reconstruct;
pub mod sessions;
pub mod workspaces;

pub use blobs::BlobStore;
pub use branches::BranchRepo;
pub use error::{Result, StoreError};
pub use events::EventRepo;
pub use migrations::run_migrations;
pub use pool::ConnectionConfig;
pub use reconstruct::{reconstruct_from_events, rehydrate_truncated_payloads, ReconstructionResult};
pub use sessions::SessionRepo;
pub use workspaces::WorkspaceRepo;

use sqlx::SqlitePool;

/// Owns the pool and every repository. Constructed once per process.
pub struct Store {
    pub pool: SqlitePool,
    pub workspaces: WorkspaceRepo,
    pub sessions: SessionRepo,
    pub events: EventRepo,
    pub blobs: BlobStore,
    pub branches: BranchRepo,
}

impl Store {
    pub async fn open_file(path: &str, config: &ConnectionConfig) -> Result<Self> {
        let pool = pool::new_file(path, config).await?;
        Self::from_pool(pool).await
    }

    pub async fn open_in_memory(config: &ConnectionConfig) -> Result<Self> {
        let pool = pool::new_in_memory(config).await?;
        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self> {
        run_migrations(&pool).await?;
        Ok(Self {
            workspaces: WorkspaceRepo::new(pool.clone()),
            sessions: SessionRepo::new(pool.clone()),
            events: EventRepo::new(pool.clone()),
            blobs: BlobStore::new(pool.clone()),
            branches: BranchRepo::new(pool.clone()),
            pool,
        })
    }

    /// Lists a session's events, rehydrates anything spilled to a blob, and
    /// folds the result into provider-facing messages in one step.
    pub async fn reconstruct_session(&self, session_id: &str) -> Result<ReconstructionResult> {
        let events = self.events.list(session_id, None, None).await?;
        let events = rehydrate_truncated_payloads(events, &self.blobs).await;
        Ok(reconstruct_from_events(&events))
    }

    /// Logical delete with the blob ref-count cascade `archive` doesn't run
    /// (spec §4.1/§3.3): walks every event the session ever spilled content
    /// into and releases its blob before marking the session deleted.
    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        for blob_id in self.events.content_blob_ids(session_id).await? {
            self.blobs.release(&blob_id).await?;
        }
        self.sessions.mark_deleted(session_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_opens_and_migrates_in_memory() {
        let store = Store::open_in_memory(&ConnectionConfig::default()).await.unwrap();
        let ws = store.workspaces.get_or_create("/tmp/ws", "ws").await.unwrap();
        let session = store
            .sessions
            .create(&ws.id, "/tmp/ws", "claude-test", None, &[])
            .await
            .unwrap();
        let event = store
            .events
            .append(
                &session.id,
                conduit_protocol::EventType::MessageUser,
                serde_json::json!({"role": "user", "content": [{"type": "text", "text": "hi"}]}),
            )
            .await
            .unwrap();
        assert_eq!(event.sequence, 0);
    }

    #[tokio::test]
    async fn deleting_a_session_releases_its_spilled_blobs() {
        let store = Store::open_in_memory(&ConnectionConfig::default()).await.unwrap();
        let ws = store.workspaces.get_or_create("/tmp/ws", "ws").await.unwrap();
        let session = store
            .sessions
            .create(&ws.id, "/tmp/ws", "claude-test", None, &[])
            .await
            .unwrap();

        let big_text = "x".repeat(conduit_protocol::blob::LARGE_CONTENT_THRESHOLD_BYTES + 1);
        let event = store
            .events
            .append(
                &session.id,
                conduit_protocol::EventType::MessageUser,
                serde_json::json!({"role": "user", "content": [{"type": "text", "text": big_text}]}),
            )
            .await
            .unwrap();
        let blob_id = event.content_blob_id.clone().unwrap();
        assert_eq!(store.blobs.ref_count(&blob_id).await.unwrap(), 1);

        store.delete_session(&session.id).await.unwrap();

        assert_eq!(store.blobs.ref_count(&blob_id).await.unwrap(), 0);
        let deleted = store.sessions.get(&session.id).await.unwrap();
        assert!(deleted.is_deleted());
    }
}
