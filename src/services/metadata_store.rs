//! SQLite-backed metadata records, keyed by digest.
//!
//! Uniqueness is enforced by the table's primary key, so two concurrent
//! inserts for one digest cannot both succeed.

use crate::{
    models::object::{MetadataRow, ObjectRecord},
    services::{
        digest::Digest,
        storage_service::{StorageError, StorageResult},
    },
};
use chrono::{DateTime, Utc};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::{str::FromStr, sync::Arc};
use tracing::debug;

const INIT_SQL: &str = include_str!("../../migrations/0001_init.sql");

#[derive(Clone)]
pub struct MetadataStore {
    db: Arc<SqlitePool>,
}

impl MetadataStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Open a pool for `database_url`, creating the database file if needed.
    pub async fn connect(database_url: &str, max_connections: u32) -> StorageResult<Self> {
        let opts = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;
        Ok(Self::new(Arc::new(pool)))
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.db
    }

    /// Apply the embedded schema. Every statement is idempotent.
    pub async fn migrate(&self) -> StorageResult<()> {
        let statements = INIT_SQL
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        debug!("running {} migration statements", statements.len());
        for stmt in statements {
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }

    /// Connectivity check used by readiness checks.
    pub async fn ping(&self) -> StorageResult<()> {
        let one: i64 = sqlx::query_scalar("SELECT 1").fetch_one(&*self.db).await?;
        if one != 1 {
            return Err(StorageError::Sqlx(sqlx::Error::Protocol(format!(
                "unexpected result {one}"
            ))));
        }
        Ok(())
    }

    /// Fetch the record for `digest`. `None` means the object is not present.
    pub async fn lookup(&self, digest: &Digest) -> StorageResult<Option<ObjectRecord>> {
        let row = sqlx::query_as::<_, MetadataRow>(
            "SELECT hash, val_size, time_create, time_expire FROM metadata WHERE hash = ?",
        )
        .bind(digest.as_bytes().as_slice())
        .fetch_optional(&*self.db)
        .await?;

        match row {
            Some(row) => {
                let record = ObjectRecord::try_from(row).map_err(|err| {
                    StorageError::Corrupted {
                        digest: *digest,
                        reason: err.to_string(),
                    }
                })?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Insert a new record. Fails with `DuplicateKey` if one already exists.
    pub async fn insert(
        &self,
        digest: &Digest,
        size: u64,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> StorageResult<ObjectRecord> {
        let val_size = i64::try_from(size).map_err(|_| {
            StorageError::Sqlx(sqlx::Error::Protocol(format!(
                "object size {size} exceeds metadata range"
            )))
        })?;

        let result = sqlx::query(
            "INSERT INTO metadata (hash, val_size, time_create, time_expire) VALUES (?, ?, ?, ?)",
        )
        .bind(digest.as_bytes().as_slice())
        .bind(val_size)
        .bind(created_at)
        .bind(expires_at)
        .execute(&*self.db)
        .await;

        match result {
            Ok(_) => Ok(ObjectRecord {
                digest: *digest,
                size,
                created_at,
                expires_at,
            }),
            Err(err) if is_unique_violation(&err) => Err(StorageError::DuplicateKey(*digest)),
            Err(err) => Err(StorageError::Sqlx(err)),
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}
