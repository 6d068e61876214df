//! Schema versioning (§6.3). Migrations run incrementally at startup, each
//! in its own transaction, tracked in sqlx's `_sqlx_migrations` table.

use sqlx::SqlitePool;

use crate::error::Result;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    MIGRATOR.run(pool).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{new_in_memory, ConnectionConfig};

    #[tokio::test]
    async fn migrations_apply_cleanly_to_a_fresh_database() {
        let pool = new_in_memory(&ConnectionConfig::default()).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let columns: Vec<String> = sqlx::query_scalar("SELECT name FROM pragma_table_info('sessions')")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert!(columns.contains(&"latest_model".to_string()));
        assert!(!columns.contains(&"provider".to_string()));
        assert!(!columns.contains(&"status".to_string()));
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let pool = new_in_memory(&ConnectionConfig::default()).await.unwrap();
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();
    }
}
