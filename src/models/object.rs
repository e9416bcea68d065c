//! Metadata record for a stored object.

use crate::services::digest::{Digest, DigestError};
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use thiserror::Error;

/// One row per stored digest.
///
/// The record is the source of truth for existence: an object without a
/// record is treated as absent even if bytes happen to be on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectRecord {
    /// SHA-256 of the payload; primary key.
    pub digest: Digest,

    /// Payload length in bytes.
    pub size: u64,

    /// When the first successful PUT committed.
    pub created_at: DateTime<Utc>,

    /// `created_at` plus the configured horizon. Recorded only, never enforced.
    pub expires_at: DateTime<Utc>,
}

/// Raw `metadata` table row as SQLite returns it.
#[derive(FromRow, Debug)]
pub struct MetadataRow {
    pub hash: Vec<u8>,
    pub val_size: i64,
    pub time_create: DateTime<Utc>,
    pub time_expire: DateTime<Utc>,
}

/// A stored row that cannot describe a valid object.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error(transparent)]
    Digest(#[from] DigestError),
    #[error("negative size {0}")]
    NegativeSize(i64),
}

impl TryFrom<MetadataRow> for ObjectRecord {
    type Error = RecordError;

    fn try_from(row: MetadataRow) -> Result<Self, Self::Error> {
        Ok(Self {
            digest: Digest::from_slice(&row.hash)?,
            size: u64::try_from(row.val_size)
                .map_err(|_| RecordError::NegativeSize(row.val_size))?,
            created_at: row.time_create,
            expires_at: row.time_expire,
        })
    }
}
