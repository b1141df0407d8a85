//! Column-store persistence
//!
//! The backing store has no native vector type: each document is one row of
//! plain columns, with the embedding held as encoded text. Encoding and
//! decoding live in the vector crate; this module only moves rows.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use tokio::sync::RwLock;

use crate::{MmlabError, Result};

/// One persisted document row
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct ColumnRow {
    pub key: String,
    pub width: i64,
    pub height: i64,
    /// Delimiter-separated encoded embedding
    pub embedding: String,
}

impl ColumnRow {
    pub fn new(key: impl Into<String>, width: u32, height: u32, embedding: String) -> Self {
        Self {
            key: key.into(),
            width: i64::from(width),
            height: i64::from(height),
            embedding,
        }
    }
}

/// Trait for column-store operations
#[async_trait]
pub trait ColumnStore: Send + Sync {
    /// Replace every stored row with `rows`; either all rows land or none do.
    ///
    /// Returns the number of distinct keys stored.
    async fn replace_all(&self, rows: &[ColumnRow]) -> Result<u64>;

    /// Load every row, ordered by key
    async fn load_all(&self) -> Result<Vec<ColumnRow>>;

    /// Number of stored rows
    async fn count(&self) -> Result<u64>;
}

// ============================================================================
// PostgreSQL
// ============================================================================

/// PostgreSQL column store
pub struct PgColumnStore {
    pool: PgPool,
    table: String,
}

impl PgColumnStore {
    /// Create a new store connection
    pub async fn new(database_url: &str, table: &str, max_connections: u32) -> Result<Self> {
        validate_identifier(table)?;

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| MmlabError::DatabaseError(format!("PostgreSQL connection failed: {e}")))?;

        Ok(Self {
            pool,
            table: table.to_string(),
        })
    }

    /// Create from an existing pool
    pub fn from_pool(pool: PgPool, table: &str) -> Result<Self> {
        validate_identifier(table)?;
        Ok(Self {
            pool,
            table: table.to_string(),
        })
    }

    /// Create the documents table if it does not exist
    pub async fn init_schema(&self) -> Result<()> {
        let sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                key TEXT PRIMARY KEY,
                width BIGINT NOT NULL,
                height BIGINT NOT NULL,
                embedding TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            self.table
        );

        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| MmlabError::DatabaseError(format!("Failed to create table: {e}")))?;

        Ok(())
    }

    /// Table name
    pub fn table(&self) -> &str {
        &self.table
    }
}

#[async_trait]
impl ColumnStore for PgColumnStore {
    async fn replace_all(&self, rows: &[ColumnRow]) -> Result<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| MmlabError::DatabaseError(format!("Failed to begin transaction: {e}")))?;

        sqlx::query(&format!("DELETE FROM {}", self.table))
            .execute(&mut *tx)
            .await
            .map_err(|e| MmlabError::DatabaseError(format!("Failed to clear documents: {e}")))?;

        // Duplicate keys within a batch keep the last row, like the in-memory store
        let insert = format!(
            r#"
            INSERT INTO {} (key, width, height, embedding)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (key) DO UPDATE SET
                width = EXCLUDED.width,
                height = EXCLUDED.height,
                embedding = EXCLUDED.embedding
            "#,
            self.table
        );

        for row in rows {
            sqlx::query(&insert)
                .bind(&row.key)
                .bind(row.width)
                .bind(row.height)
                .bind(&row.embedding)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    MmlabError::DatabaseError(format!("Failed to insert {}: {e}", row.key))
                })?;
        }

        tx.commit()
            .await
            .map_err(|e| MmlabError::DatabaseError(format!("Failed to commit: {e}")))?;

        let written = rows
            .iter()
            .map(|r| r.key.as_str())
            .collect::<std::collections::BTreeSet<_>>()
            .len() as u64;

        tracing::info!("Persisted {} rows to {}", written, self.table);
        Ok(written)
    }

    async fn load_all(&self) -> Result<Vec<ColumnRow>> {
        let sql = format!(
            "SELECT key, width, height, embedding FROM {} ORDER BY key",
            self.table
        );

        sqlx::query_as::<_, ColumnRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MmlabError::DatabaseError(format!("Failed to load documents: {e}")))
    }

    async fn count(&self) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.table);

        let count: i64 = sqlx::query_scalar(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MmlabError::DatabaseError(format!("Failed to count documents: {e}")))?;

        Ok(count.max(0) as u64)
    }
}

/// Table names are interpolated into SQL, so only plain identifiers pass
fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };

    if valid && name.len() <= 63 {
        Ok(())
    } else {
        Err(MmlabError::ConfigError(format!(
            "Invalid table name: {name:?}"
        )))
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// In-process column store, for tests and database-less runs
#[derive(Default)]
pub struct MemoryColumnStore {
    rows: RwLock<Vec<ColumnRow>>,
}

impl MemoryColumnStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with rows, bypassing `replace_all`
    pub fn with_rows(rows: Vec<ColumnRow>) -> Self {
        Self {
            rows: RwLock::new(rows),
        }
    }
}

#[async_trait]
impl ColumnStore for MemoryColumnStore {
    async fn replace_all(&self, rows: &[ColumnRow]) -> Result<u64> {
        let mut deduped: Vec<ColumnRow> = Vec::with_capacity(rows.len());
        for row in rows {
            match deduped.iter_mut().find(|r| r.key == row.key) {
                Some(existing) => *existing = row.clone(),
                None => deduped.push(row.clone()),
            }
        }

        let written = deduped.len() as u64;
        *self.rows.write().await = deduped;
        Ok(written)
    }

    async fn load_all(&self) -> Result<Vec<ColumnRow>> {
        let mut rows = self.rows.read().await.clone();
        rows.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(rows)
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.rows.read().await.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("multimodal_documents").is_ok());
        assert!(validate_identifier("_docs2").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("2docs").is_err());
        assert!(validate_identifier("docs; DROP TABLE users").is_err());
        assert!(validate_identifier("public.docs").is_err());
    }

    #[tokio::test]
    async fn test_memory_store_replace_and_load() {
        let store = MemoryColumnStore::with_rows(vec![ColumnRow::new("stale", 1, 1, "0".into())]);

        let rows = vec![
            ColumnRow::new("b", 10, 20, "0,1".to_string()),
            ColumnRow::new("a", 30, 40, "1,0".to_string()),
            ColumnRow::new("b", 11, 21, "0.5,0.5".to_string()),
        ];

        let written = store.replace_all(&rows).await.unwrap();
        assert_eq!(written, 2);
        assert_eq!(store.count().await.unwrap(), 2);

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded[0].key, "a");
        assert_eq!(loaded[1].key, "b");
        assert_eq!(loaded[1].embedding, "0.5,0.5");
        assert_eq!(loaded[1].width, 11);
    }

    #[tokio::test]
    #[ignore = "requires a running PostgreSQL (DATABASE_URL)"]
    async fn test_pg_round_trip() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let store = PgColumnStore::new(&url, "mmlab_test_documents", 2)
            .await
            .unwrap();
        store.init_schema().await.unwrap();

        let rows = vec![ColumnRow::new("k1", 1, 2, "1,0,0".to_string())];
        assert_eq!(store.replace_all(&rows).await.unwrap(), 1);
        assert_eq!(store.load_all().await.unwrap(), rows);
        assert_eq!(store.count().await.unwrap(), 1);
    }
}
