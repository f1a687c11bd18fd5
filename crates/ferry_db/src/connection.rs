//! Database connection management.

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

use crate::error::DbResult;

/// Connection to a ferry database.
///
/// One database holds both the identity map and the reference forum, so an
/// import run and its resumability state live in the same file.
#[derive(Debug, Clone)]
pub struct ForumDb {
    pool: SqlitePool,
}

impl ForumDb {
    /// Open or create a database at the given path.
    ///
    /// This will:
    /// 1. Create the database file if it doesn't exist
    /// 2. Run any pending migrations
    /// 3. Configure SQLite for durable single-writer use (WAL mode, etc.)
    pub async fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty() && !p.exists())
        {
            std::fs::create_dir_all(parent)?;
        }

        let path_str = path.to_string_lossy();
        info!("Opening ferry database: {}", path_str);

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .pragma("cache_size", "-32000") // 32MB cache
            .pragma("synchronous", "NORMAL") // Safe with WAL
            .pragma("temp_store", "MEMORY")
            .pragma("foreign_keys", "ON");

        // Identity map writes are compare-and-set; a single writer keeps them serialized.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        debug!("Database connection established");

        Self::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    /// Open an in-memory database (for testing).
    pub async fn open_in_memory() -> DbResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .journal_mode(SqliteJournalMode::Wal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(1) // In-memory must be single connection to share state
            .connect_with(options)
            .await?;

        Self::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    /// Run database migrations.
    async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
        debug!("Running database migrations");
        sqlx::migrate!("./migrations").run(pool).await?;
        info!("Database migrations complete");
        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Get database statistics.
    pub async fn stats(&self) -> DbResult<DbStats> {
        Ok(DbStats {
            mapping_count: self.count_rows("import_mappings").await?,
            group_count: self.count_rows("forum_groups").await?,
            user_count: self.count_rows("forum_users").await?,
            category_count: self.count_rows("forum_categories").await?,
            topic_count: self.count_rows("forum_topics").await?,
            post_count: self.count_rows("forum_posts").await?,
        })
    }

    async fn count_rows(&self, table: &'static str) -> DbResult<u64> {
        let sql = format!("SELECT COUNT(*) FROM {table}");
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count as u64)
    }

    /// Checkpoint the WAL file.
    pub async fn checkpoint(&self) -> DbResult<()> {
        debug!("Checkpointing WAL");
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Database statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DbStats {
    pub mapping_count: u64,
    pub group_count: u64,
    pub user_count: u64,
    pub category_count: u64,
    pub topic_count: u64,
    pub post_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_in_memory() {
        let db = ForumDb::open_in_memory().await.unwrap();
        let stats = db.stats().await.unwrap();
        assert_eq!(stats, DbStats::default());
    }

    #[tokio::test]
    async fn test_open_file_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ferry.db");

        let db = ForumDb::open(&path).await.unwrap();
        sqlx::query(
            "INSERT INTO import_mappings (namespace, kind, source_id, target_id, created_at) \
             VALUES ('ns', 'user', '1', 10, datetime('now'))",
        )
        .execute(db.pool())
        .await
        .unwrap();
        db.checkpoint().await.unwrap();
        db.close().await;

        let reopened = ForumDb::open(&path).await.unwrap();
        let stats = reopened.stats().await.unwrap();
        assert_eq!(stats.mapping_count, 1);
    }
}
