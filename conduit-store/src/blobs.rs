//! Content-addressed blob storage with ref-counted dedup (spec §3.1, §6.4).

use chrono::Utc;
use sha2::{Digest, Sha256};
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::error::Result;

#[derive(Clone)]
pub struct BlobStore {
    pool: SqlitePool,
}

impl BlobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn store(&self, bytes: &[u8], mime_type: &str) -> Result<String> {
        let mut tx = self.pool.begin().await?;
        let id = self.store_in_tx(&mut tx, bytes, mime_type).await?;
        tx.commit().await?;
        Ok(id)
    }

    /// Used by the event store so a blob spill rides in the same
    /// transaction as the event insert it backs.
    pub async fn store_in_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<String> {
        let hash = format!("{:x}", Sha256::digest(bytes));
        if let Some(id) =
            sqlx::query_scalar::<_, String>("SELECT id FROM blobs WHERE sha256 = ?1")
                .bind(&hash)
                .fetch_optional(&mut **tx)
                .await?
        {
            sqlx::query("UPDATE blobs SET ref_count = ref_count + 1 WHERE id = ?1")
                .bind(&id)
                .execute(&mut **tx)
                .await?;
            return Ok(id);
        }

        let id = format!("blob_{}", uuid::Uuid::now_v7());
        sqlx::query(
            "INSERT INTO blobs (id, sha256, bytes, mime_type, original_size, compressed_size,
                ref_count, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5, 1, ?6)",
        )
        .bind(&id)
        .bind(&hash)
        .bind(bytes)
        .bind(mime_type)
        .bind(bytes.len() as i64)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut **tx)
        .await?;
        Ok(id)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Vec<u8>>> {
        let bytes: Option<Vec<u8>> = sqlx::query_scalar("SELECT bytes FROM blobs WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(bytes)
    }

    pub async fn ref_count(&self, id: &str) -> Result<i64> {
        let count: Option<i64> = sqlx::query_scalar("SELECT ref_count FROM blobs WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(count.unwrap_or(0))
    }

    pub async fn release(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE blobs SET ref_count = ref_count - 1 WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Offline sweep: removes blobs with zero live references. Never
    /// touches a blob with ref_count > 0.
    pub async fn delete_unreferenced(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM blobs WHERE ref_count <= 0")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::run_migrations;
    use crate::pool::{new_in_memory, ConnectionConfig};

    async fn setup() -> BlobStore {
        let pool = new_in_memory(&ConnectionConfig::default()).await.unwrap();
        run_migrations(&pool).await.unwrap();
        BlobStore::new(pool)
    }

    #[tokio::test]
    async fn identical_bytes_dedup_into_one_blob_with_ref_count_two() {
        let store = setup().await;
        let a = store.store(b"same content", "text/plain").await.unwrap();
        let b = store.store(b"same content", "text/plain").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(store.ref_count(&a).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn sweep_never_removes_a_live_blob() {
        let store = setup().await;
        let id = store.store(b"kept", "text/plain").await.unwrap();
        store.delete_unreferenced().await.unwrap();
        assert!(store.get(&id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn sweep_removes_zero_count_blobs() {
        let store = setup().await;
        let id = store.store(b"gone", "text/plain").await.unwrap();
        store.release(&id).await.unwrap();
        let removed = store.delete_unreferenced().await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.get(&id).await.unwrap().is_none());
    }
}
