//! Cache store abstraction and implementations.
//!
//! The published generation lives under two keys, `"adawat"` (records)
//! and `"tags"` (tag index). The [`CacheStore`] trait exposes multi-key
//! reads and writes so both keys always move together: a writer
//! publishes them in one transaction (or one lock critical section),
//! and a reader never observes the records of one generation with the
//! tags of another.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::RwLock;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::debug;

use crate::error::CatalogError;
use crate::models::{Generation, Record, TagIndex};

/// Cache key holding the enriched record set.
pub const RECORDS_KEY: &str = "adawat";
/// Cache key holding the tag index.
pub const TAGS_KEY: &str = "tags";

/// Key-value store over JSON values. Values persist until overwritten;
/// there is no TTL and no explicit deletion.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    async fn set(&self, key: &str, value: &Value) -> Result<()>;

    /// Read several keys as one consistent snapshot.
    async fn get_many(&self, keys: &[&str]) -> Result<Vec<Option<Value>>>;

    /// Write several keys so that all become visible together.
    async fn set_many(&self, entries: &[(&str, Value)]) -> Result<()>;
}

/// Publish a generation: both keys in a single atomic write.
pub async fn publish_generation(
    store: &dyn CacheStore,
    generation: &Generation,
) -> Result<(), CatalogError> {
    let records = serde_json::to_value(&generation.records)
        .context("failed to encode records")
        .map_err(CatalogError::Store)?;
    let tags = Value::Object(generation.tags.clone());

    store
        .set_many(&[(RECORDS_KEY, records), (TAGS_KEY, tags)])
        .await
        .map_err(CatalogError::Store)?;

    debug!(records = generation.records.len(), "published generation");
    Ok(())
}

/// Load the current generation as one consistent snapshot.
///
/// Fails with [`CatalogError::EmptyCatalog`] when no generation has
/// ever been published.
pub async fn load_generation(store: &dyn CacheStore) -> Result<Generation, CatalogError> {
    let mut values = store
        .get_many(&[RECORDS_KEY, TAGS_KEY])
        .await
        .map_err(CatalogError::Store)?;

    let tags = values.pop().flatten();
    let records = values.pop().flatten();

    let (Some(records), Some(tags)) = (records, tags) else {
        return Err(CatalogError::EmptyCatalog);
    };

    let records: Vec<Record> = serde_json::from_value(records)
        .context("stored records are not a JSON array of objects")
        .map_err(CatalogError::Store)?;
    let tags: TagIndex = match tags {
        Value::Object(map) => map,
        other => {
            return Err(CatalogError::Store(anyhow::anyhow!(
                "stored tags are not a JSON object: {other}"
            )))
        }
    };

    Ok(Generation { records, tags })
}

// ============ SQLite store ============

/// SQLite-backed [`CacheStore`]. One `cache` table keyed by string;
/// multi-key writes run in a single transaction.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (and create if missing) the cache database at `path`.
    pub async fn connect(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Create the cache table. Idempotent.
    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cache (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl CacheStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let raw: Option<String> = sqlx::query_scalar("SELECT value FROM cache WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        raw.map(|s| serde_json::from_str(&s).with_context(|| format!("corrupt cache value for key {key:?}")))
            .transpose()
    }

    async fn set(&self, key: &str, value: &Value) -> Result<()> {
        self.set_many(&[(key, value.clone())]).await
    }

    async fn get_many(&self, keys: &[&str]) -> Result<Vec<Option<Value>>> {
        // One transaction so the snapshot is consistent across keys.
        let mut tx = self.pool.begin().await?;
        let mut values = Vec::with_capacity(keys.len());

        for key in keys {
            let raw: Option<String> = sqlx::query_scalar("SELECT value FROM cache WHERE key = ?")
                .bind(key)
                .fetch_optional(&mut *tx)
                .await?;
            let value = raw
                .map(|s| {
                    serde_json::from_str(&s)
                        .with_context(|| format!("corrupt cache value for key {key:?}"))
                })
                .transpose()?;
            values.push(value);
        }

        tx.commit().await?;
        Ok(values)
    }

    async fn set_many(&self, entries: &[(&str, Value)]) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        for (key, value) in entries {
            let raw = serde_json::to_string(value)?;
            sqlx::query(
                r#"
                INSERT INTO cache (key, value, updated_at) VALUES (?, ?, ?)
                ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(key)
            .bind(raw)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

// ============ In-memory store ============

/// In-memory [`CacheStore`] for tests and ephemeral runs. A single
/// `RwLock` guards the whole map, so `get_many`/`set_many` are
/// trivially atomic.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let entries = self.entries.read().expect("cache lock poisoned");
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &Value) -> Result<()> {
        let mut entries = self.entries.write().expect("cache lock poisoned");
        entries.insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn get_many(&self, keys: &[&str]) -> Result<Vec<Option<Value>>> {
        let entries = self.entries.read().expect("cache lock poisoned");
        Ok(keys.iter().map(|k| entries.get(*k).cloned()).collect())
    }

    async fn set_many(&self, batch: &[(&str, Value)]) -> Result<()> {
        let mut entries = self.entries.write().expect("cache lock poisoned");
        for (key, value) in batch {
            entries.insert(key.to_string(), value.clone());
        }
        Ok(())
    }
}
