use sqlx::{
    Row,
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
};

/// Durable scan-progress cursors, one row per chain label.
///
/// The stored block number is the next block to scan: everything strictly
/// below it has been fully processed. The store itself is a plain upsert;
/// monotonicity is the scanner's concern.
#[derive(Debug, Clone)]
pub struct CursorStore {
    pool: SqlitePool,
}

impl CursorStore {
    pub async fn open(path: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        Self::connect(options).await
    }

    /// Ephemeral store for tests and dry runs.
    pub async fn open_in_memory() -> Result<Self, sqlx::Error> {
        Self::connect(SqliteConnectOptions::new().in_memory(true)).await
    }

    async fn connect(options: SqliteConnectOptions) -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.create_tables().await?;
        Ok(store)
    }

    async fn create_tables(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS monitor (
                chain_label TEXT UNIQUE NOT NULL,
                block_number INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Returns the persisted cursor, or `None` for a never-scanned chain.
    pub async fn get(&self, chain_label: &str) -> Result<Option<u64>, sqlx::Error> {
        let row = sqlx::query("SELECT block_number FROM monitor WHERE chain_label = ?")
            .bind(chain_label)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| row.get::<i64, _>(0) as u64))
    }

    pub async fn set(&self, chain_label: &str, block_number: u64) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT OR REPLACE INTO monitor (chain_label, block_number) VALUES (?, ?)")
            .bind(chain_label)
            .bind(block_number as i64)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
