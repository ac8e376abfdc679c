//! Content cache trait and the SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::models::{CacheEntryRow, CacheStatus, NewCacheEntry};
use crate::repos::EntryRepo;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite, SqliteConnection};
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use time::OffsetDateTime;

/// Schema version written to `PRAGMA user_version` by this build.
pub const SCHEMA_VERSION: i64 = 1;

/// Namespace that entries imported from the legacy `googlephotos` table get.
pub const LEGACY_GOOGLEPHOTOS_NAMESPACE: &str = "googlephotos";

/// Persistent mapping from remote item identity to content hashes.
#[async_trait]
pub trait ContentCache: EntryRepo + Send + Sync {
    /// Bring the schema up to [`SCHEMA_VERSION`].
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;

    /// Schema version currently recorded in the database.
    async fn schema_version(&self) -> MetadataResult<i64>;
}

/// SQLite-based content cache.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    /// Last timestamp handed out, in unix nanoseconds.
    clock: AtomicI64,
}

impl SqliteStore {
    /// Open (creating if needed) the cache file at `path` and migrate it.
    pub async fn new(
        path: impl AsRef<Path>,
        busy_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();
        let busy_timeout = Duration::from_secs(busy_timeout_secs.unwrap_or(5));

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            // A second process sharing the file waits instead of failing.
            .busy_timeout(busy_timeout);

        let pool = SqlitePoolOptions::new()
            // One run owns the cache; a single connection serializes writes.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self {
            pool,
            clock: AtomicI64::new(0),
        };
        store.migrate().await?;

        tracing::debug!(path = %path.display(), "metadata cache opened");
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Current time, strictly later than any value previously returned.
    fn now(&self) -> OffsetDateTime {
        let wall = i64::try_from(OffsetDateTime::now_utc().unix_timestamp_nanos())
            .unwrap_or(i64::MAX);
        let mut prev = self.clock.load(Ordering::Acquire);
        loop {
            let next = wall.max(prev.saturating_add(1_000));
            match self
                .clock
                .compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => {
                    return OffsetDateTime::from_unix_timestamp_nanos(i128::from(next))
                        .unwrap_or_else(|_| OffsetDateTime::now_utc());
                }
                Err(actual) => prev = actual,
            }
        }
    }

    /// Copy rows from the pre-versioning `googlephotos` table, if present.
    ///
    /// The legacy table is left in place; only rows with a remote id and
    /// well-formed digests are imported.
    async fn import_legacy_googlephotos(&self, conn: &mut SqliteConnection) -> MetadataResult<()> {
        let legacy_exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='googlephotos')",
        )
        .fetch_one(&mut *conn)
        .await?;
        if !legacy_exists {
            return Ok(());
        }

        let columns: Vec<(i32, String, String, i32, Option<String>, i32)> =
            sqlx::query_as("PRAGMA table_info(googlephotos)")
                .fetch_all(&mut *conn)
                .await?;
        let column_names: HashSet<&str> = columns
            .iter()
            .map(|(_, name, _, _, _, _)| name.as_str())
            .collect();

        let required_columns = ["GooglephotosId", "Sha256", "Md5"];
        let missing: Vec<&str> = required_columns
            .iter()
            .filter(|col| !column_names.contains(*col))
            .copied()
            .collect();
        if !missing.is_empty() {
            tracing::warn!(
                missing = %missing.join(", "),
                "legacy googlephotos table lacks columns, not importing it"
            );
            return Ok(());
        }

        let now = self.now();
        let result = sqlx::query(
            "INSERT OR IGNORE INTO cache_entries \
             (namespace, remote_id, content_hash, weak_hash, last_updated, last_used) \
             SELECT ?, GooglephotosId, lower(Sha256), lower(Md5), ?, ? FROM googlephotos \
             WHERE COALESCE(GooglephotosId, '') <> '' \
               AND length(Sha256) = 64 AND length(Md5) = 32",
        )
        .bind(LEGACY_GOOGLEPHOTOS_NAMESPACE)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        tracing::info!(
            imported = result.rows_affected(),
            "imported legacy googlephotos cache entries"
        );
        Ok(())
    }
}

#[async_trait]
impl ContentCache for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        let mut tx = self.pool.begin().await?;

        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&mut *tx)
            .await?;

        if version > SCHEMA_VERSION {
            return Err(MetadataError::Migration(format!(
                "cache schema version {version} is newer than supported version {SCHEMA_VERSION}; \
                 refusing to modify it"
            )));
        }

        if version < 1 {
            sqlx::query(SCHEMA_V1_SQL).execute(&mut *tx).await?;
            self.import_legacy_googlephotos(&mut tx).await?;
        }

        if version != SCHEMA_VERSION {
            // PRAGMA does not take bound parameters.
            sqlx::query(&format!("PRAGMA user_version = {SCHEMA_VERSION}"))
                .execute(&mut *tx)
                .await?;
            tracing::info!(from = version, to = SCHEMA_VERSION, "cache schema migrated");
        }

        tx.commit().await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn schema_version(&self) -> MetadataResult<i64> {
        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await?;
        Ok(version)
    }
}

#[async_trait]
impl EntryRepo for SqliteStore {
    async fn lookup(
        &self,
        namespace: &str,
        remote_id: &str,
    ) -> MetadataResult<Option<CacheEntryRow>> {
        let row = sqlx::query_as::<_, CacheEntryRow>(
            "SELECT * FROM cache_entries WHERE namespace = ? AND remote_id = ?",
        )
        .bind(namespace)
        .bind(remote_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn upsert(&self, entry: &NewCacheEntry) -> MetadataResult<CacheEntryRow> {
        let missing: Vec<&str> = [
            ("namespace", entry.namespace.as_str()),
            ("remote_id", entry.remote_id.as_str()),
            ("content_hash", entry.content_hash.as_str()),
            ("weak_hash", entry.weak_hash.as_str()),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();
        if !missing.is_empty() {
            return Err(MetadataError::Validation(format!(
                "cache entry is missing {}",
                missing.join(", ")
            )));
        }

        let last_used = self.now();
        let last_updated = entry.last_updated.unwrap_or(last_used);

        // Single statement: the conflict check and the write happen atomically.
        let row = sqlx::query_as::<_, CacheEntryRow>(
            "INSERT INTO cache_entries \
             (namespace, remote_id, content_hash, weak_hash, last_updated, last_used) \
             VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT(namespace, remote_id) DO UPDATE SET \
                content_hash = excluded.content_hash, \
                weak_hash = excluded.weak_hash, \
                last_updated = excluded.last_updated, \
                last_used = excluded.last_used \
             RETURNING cache_id, namespace, remote_id, content_hash, weak_hash, last_updated, last_used",
        )
        .bind(&entry.namespace)
        .bind(&entry.remote_id)
        .bind(&entry.content_hash)
        .bind(&entry.weak_hash)
        .bind(last_updated)
        .bind(last_used)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn status(&self) -> MetadataResult<CacheStatus> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT namespace, COUNT(*) FROM cache_entries GROUP BY namespace ORDER BY namespace",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(CacheStatus {
            entries: rows.into_iter().collect(),
        })
    }
}

/// Version 1 schema.
const SCHEMA_V1_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS cache_entries (
    cache_id INTEGER PRIMARY KEY AUTOINCREMENT,
    namespace TEXT NOT NULL,
    remote_id TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    weak_hash TEXT NOT NULL,
    last_updated TEXT NOT NULL,
    last_used TEXT NOT NULL,
    UNIQUE (namespace, remote_id)
);
CREATE INDEX IF NOT EXISTS idx_cache_entries_content_hash ON cache_entries(content_hash);
"#;
