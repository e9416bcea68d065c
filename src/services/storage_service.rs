//! src/services/storage_service.rs
//!
//! StorageService — the ingest and retrieval pipelines of the content-addressed
//! store. Metadata lives in SQLite (`MetadataStore`), payloads live on disk
//! beneath `root/{hex[0:3]}/{hex[3:6]}/{hex}` (`ObjectStore`).

use crate::{
    models::object::ObjectRecord,
    services::{
        digest::{Digest, DigestError},
        metadata_store::MetadataStore,
        object_store::ObjectStore,
    },
};
use bytes::Bytes;
use chrono::{Duration, Utc};
use std::{io, path::PathBuf};
use thiserror::Error;
use tokio::fs::File;
use tracing::{debug, error, warn};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid hash")]
    MalformedHash,
    #[error("invalid hash length: expected 32 bytes, got {0}")]
    InvalidLength(usize),
    #[error("hash invalid - does not match data (claimed {claimed}, computed {actual})")]
    HashMismatch { claimed: Digest, actual: Digest },
    #[error("content-length invalid - does not match data (declared {declared}, received {actual})")]
    LengthMismatch { declared: u64, actual: u64 },
    #[error("hash already exists: {0}")]
    DuplicateObject(Digest),
    #[error("payload already exists at {}", .0.display())]
    AlreadyExists(PathBuf),
    #[error("metadata for {0} already exists")]
    DuplicateKey(Digest),
    #[error("hash metadata not found: {0}")]
    NotFound(Digest),
    #[error("payload missing at {}", .0.display())]
    PayloadMissing(PathBuf),
    #[error("object {digest} is corrupted: {reason}")]
    Corrupted { digest: Digest, reason: String },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl StorageError {
    /// Content-addressing conflict: the digest is already stored.
    pub fn is_duplicate(&self) -> bool {
        matches!(
            self,
            StorageError::DuplicateObject(_)
                | StorageError::AlreadyExists(_)
                | StorageError::DuplicateKey(_)
        )
    }

    /// Infrastructure failure rather than a problem with the request.
    pub fn is_storage_unavailable(&self) -> bool {
        matches!(
            self,
            StorageError::Sqlx(_)
                | StorageError::Io(_)
                | StorageError::Corrupted { .. }
                | StorageError::PayloadMissing(_)
        )
    }
}

impl From<DigestError> for StorageError {
    fn from(err: DigestError) -> Self {
        match err {
            DigestError::Malformed => StorageError::MalformedHash,
            DigestError::InvalidLength(len) => StorageError::InvalidLength(len),
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Payload plus its metadata record, as returned by [`StorageService::get_object`].
#[derive(Debug)]
pub struct RetrievedObject {
    pub record: ObjectRecord,
    pub data: Bytes,
}

/// StorageService binds a metadata store and an object store into the two
/// operations the HTTP layer needs: store under a claimed hash, and fetch by
/// hash.
#[derive(Clone)]
pub struct StorageService {
    metadata: MetadataStore,
    objects: ObjectStore,
    /// Added to the creation time to compute `expires_at`.
    expiry_horizon: Duration,
}

impl StorageService {
    pub fn new(metadata: MetadataStore, objects: ObjectStore, expiry_horizon: Duration) -> Self {
        Self {
            metadata,
            objects,
            expiry_horizon,
        }
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    pub fn objects(&self) -> &ObjectStore {
        &self.objects
    }

    /// Store `body` under `claimed_hex`.
    ///
    /// Cheap structural checks run first, then the SHA-256 comparison, then
    /// the length check. Nothing touches disk beyond shard directories until
    /// the content is verified.
    pub async fn put_object(
        &self,
        claimed_hex: &str,
        body: Bytes,
        declared_len: u64,
    ) -> StorageResult<ObjectRecord> {
        let claimed = Digest::decode(claimed_hex)?;
        let path = self.objects.path_for(&claimed, true).await?;

        let mut orphaned = false;
        if self.objects.exists(&path).await? {
            if self.metadata.lookup(&claimed).await?.is_some() {
                return Err(StorageError::DuplicateObject(claimed));
            }
            orphaned = true;
        }

        let actual = compute_digest(body.clone()).await?;
        if actual != claimed {
            return Err(StorageError::HashMismatch { claimed, actual });
        }

        let actual_len = body.len() as u64;
        if declared_len != actual_len {
            return Err(StorageError::LengthMismatch {
                declared: declared_len,
                actual: actual_len,
            });
        }

        // Only a file this request linked into place is ever rolled back.
        let written = if orphaned {
            // Left behind by an interrupted ingest, or a peer's payload that is
            // not yet recorded. Swapping verified bytes in keeps the path
            // populated either way.
            warn!(digest = %claimed, "replacing payload with no metadata record");
            self.objects.replace(&path, &body).await?;
            None
        } else {
            Some(self.objects.write_new(&path, &body).await?)
        };

        let created_at = Utc::now();
        let expires_at = created_at + self.expiry_horizon;
        match self
            .metadata
            .insert(&claimed, actual_len, created_at, expires_at)
            .await
        {
            Ok(record) => {
                debug!(digest = %claimed, size = actual_len, "stored object");
                Ok(record)
            }
            Err(err @ StorageError::DuplicateKey(_)) => {
                // A record for identical content already exists; the payload we
                // just wrote completes that pair.
                warn!(digest = %claimed, "metadata record already present for new payload");
                Err(err)
            }
            Err(err) => {
                if let Some(written) = written {
                    if let Err(cleanup) = self.objects.remove_written(&written).await {
                        error!(
                            digest = %claimed,
                            path = %written.path().display(),
                            "failed to roll back payload after metadata error: {}", cleanup
                        );
                    }
                }
                Err(err)
            }
        }
    }

    /// Fetch the full payload stored under `claimed_hex`.
    pub async fn get_object(&self, claimed_hex: &str) -> StorageResult<RetrievedObject> {
        let (record, path) = self.locate(claimed_hex).await?;
        let data = self
            .objects
            .read_all(&path)
            .await
            .map_err(|err| missing_payload_anomaly(err, &record))?;

        check_size(&record, data.len() as u64)?;

        debug!(digest = %record.digest, size = record.size, "read object");
        Ok(RetrievedObject { record, data })
    }

    /// Fetch the metadata record and an open handle for streaming the payload.
    pub async fn get_object_reader(&self, claimed_hex: &str) -> StorageResult<(ObjectRecord, File)> {
        let (record, path) = self.locate(claimed_hex).await?;
        let file = self
            .objects
            .open(&path)
            .await
            .map_err(|err| missing_payload_anomaly(err, &record))?;
        check_size(&record, file.metadata().await?.len())?;
        Ok((record, file))
    }

    /// Decode, check metadata, and resolve the payload path without creating dirs.
    async fn locate(&self, claimed_hex: &str) -> StorageResult<(ObjectRecord, PathBuf)> {
        let digest = Digest::decode(claimed_hex)?;
        let record = self
            .metadata
            .lookup(&digest)
            .await?
            .ok_or(StorageError::NotFound(digest))?;
        let path = self.objects.path_for(&digest, false).await?;
        Ok((record, path))
    }
}

async fn compute_digest(body: Bytes) -> StorageResult<Digest> {
    tokio::task::spawn_blocking(move || Digest::compute(&body))
        .await
        .map_err(|err| StorageError::Io(io::Error::other(err)))
}

fn check_size(record: &ObjectRecord, on_disk: u64) -> StorageResult<()> {
    if on_disk == record.size {
        return Ok(());
    }
    error!(
        digest = %record.digest,
        recorded = record.size,
        on_disk,
        "payload size does not match metadata"
    );
    Err(StorageError::Corrupted {
        digest: record.digest,
        reason: format!("recorded size {} but {} bytes on disk", record.size, on_disk),
    })
}

/// A record without its payload is reported as not found, and logged.
fn missing_payload_anomaly(err: StorageError, record: &ObjectRecord) -> StorageError {
    match err {
        StorageError::PayloadMissing(path) => {
            error!(
                digest = %record.digest,
                path = %path.display(),
                "integrity anomaly: metadata record present but payload missing"
            );
            StorageError::NotFound(record.digest)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::metadata_store::tests::{temp_store, temp_store_with_connections};

    async fn service() -> (tempfile::TempDir, tempfile::TempDir, StorageService) {
        let (meta_tmp, metadata) = temp_store().await;
        let obj_tmp = tempfile::tempdir().unwrap();
        let objects = ObjectStore::new(obj_tmp.path());
        let svc = StorageService::new(metadata, objects, Duration::hours(24));
        (meta_tmp, obj_tmp, svc)
    }

    fn hex_of(data: &[u8]) -> String {
        Digest::compute(data).encode()
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let (_m, _o, svc) = service().await;
        let samples: [&[u8]; 3] = [b"", b"hello world", &[0xffu8; 4096]];
        for data in samples {
            let hex = hex_of(data);
            let record = svc
                .put_object(&hex, Bytes::copy_from_slice(data), data.len() as u64)
                .await
                .unwrap();
            assert_eq!(record.size, data.len() as u64);
            assert_eq!(record.expires_at - record.created_at, Duration::hours(24));

            let got = svc.get_object(&hex).await.unwrap();
            assert_eq!(got.data.as_ref(), data);
            assert_eq!(got.record.size, data.len() as u64);
        }
    }

    #[tokio::test]
    async fn uppercase_claim_is_accepted() {
        let (_m, _o, svc) = service().await;
        let hex = hex_of(b"case").to_ascii_uppercase();
        svc.put_object(&hex, Bytes::from_static(b"case"), 4)
            .await
            .unwrap();
        assert!(svc.get_object(&hex_of(b"case")).await.is_ok());
    }

    #[tokio::test]
    async fn hash_mismatch_is_rejected_and_nothing_stored() {
        let (_m, _o, svc) = service().await;
        let hex = hex_of(b"expected");
        let err = svc
            .put_object(&hex, Bytes::from_static(b"something else"), 14)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::HashMismatch { .. }));

        let path = svc
            .objects()
            .path_for(&Digest::decode(&hex).unwrap(), false)
            .await
            .unwrap();
        assert!(!path.exists());
        assert!(matches!(
            svc.get_object(&hex).await.unwrap_err(),
            StorageError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn length_mismatch_is_rejected_even_with_correct_hash() {
        let (_m, _o, svc) = service().await;
        let hex = hex_of(b"twelve bytes");
        let err = svc
            .put_object(&hex, Bytes::from_static(b"twelve bytes"), 11)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::LengthMismatch {
                declared: 11,
                actual: 12
            }
        ));
        assert!(svc.get_object(&hex).await.is_err());
    }

    #[tokio::test]
    async fn second_put_is_duplicate_and_original_survives() {
        let (_m, _o, svc) = service().await;
        let data = [0u8; 64];
        let hex = hex_of(&data);
        svc.put_object(&hex, Bytes::copy_from_slice(&data), 64)
            .await
            .unwrap();

        let err = svc
            .put_object(&hex, Bytes::copy_from_slice(&data), 64)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::DuplicateObject(_)));
        assert!(err.is_duplicate());

        let got = svc.get_object(&hex).await.unwrap();
        assert_eq!(got.data.as_ref(), &data[..]);
    }

    #[tokio::test]
    async fn malformed_claims_never_touch_storage() {
        let (_m, obj_tmp, svc) = service().await;
        let too_short = "ab".repeat(31);
        let non_hex = "zz".repeat(32);
        for bad in [too_short.as_str(), non_hex.as_str(), "abc"] {
            let put = svc
                .put_object(bad, Bytes::from_static(b"x"), 1)
                .await
                .unwrap_err();
            assert!(matches!(
                put,
                StorageError::MalformedHash | StorageError::InvalidLength(_)
            ));
            let get = svc.get_object(bad).await.unwrap_err();
            assert!(matches!(
                get,
                StorageError::MalformedHash | StorageError::InvalidLength(_)
            ));
        }
        assert_eq!(std::fs::read_dir(obj_tmp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn get_of_unknown_hash_is_not_found() {
        let (_m, _o, svc) = service().await;
        let err = svc.get_object(&hex_of(b"never stored")).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn missing_payload_with_record_is_not_found() {
        let (_m, _o, svc) = service().await;
        let hex = hex_of(b"vanishing");
        svc.put_object(&hex, Bytes::from_static(b"vanishing"), 9)
            .await
            .unwrap();
        let path = svc
            .objects()
            .path_for(&Digest::decode(&hex).unwrap(), false)
            .await
            .unwrap();
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(
            svc.get_object(&hex).await.unwrap_err(),
            StorageError::NotFound(_)
        ));
        assert!(matches!(
            svc.get_object_reader(&hex).await.unwrap_err(),
            StorageError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn truncated_payload_is_reported_corrupted() {
        let (_m, _o, svc) = service().await;
        let hex = hex_of(b"full length");
        svc.put_object(&hex, Bytes::from_static(b"full length"), 11)
            .await
            .unwrap();
        let path = svc
            .objects()
            .path_for(&Digest::decode(&hex).unwrap(), false)
            .await
            .unwrap();
        std::fs::write(&path, b"full").unwrap();

        let err = svc.get_object(&hex).await.unwrap_err();
        assert!(matches!(err, StorageError::Corrupted { .. }));
        assert!(err.is_storage_unavailable());
        assert!(matches!(
            svc.get_object_reader(&hex).await.unwrap_err(),
            StorageError::Corrupted { .. }
        ));
    }

    #[tokio::test]
    async fn orphaned_payload_is_reconciled_on_next_put() {
        let (_m, _o, svc) = service().await;
        let hex = hex_of(b"orphan");
        let digest = Digest::decode(&hex).unwrap();
        let path = svc.objects().path_for(&digest, true).await.unwrap();
        std::fs::write(&path, b"garbage").unwrap();

        svc.put_object(&hex, Bytes::from_static(b"orphan"), 6)
            .await
            .unwrap();

        assert_eq!(svc.get_object(&hex).await.unwrap().data.as_ref(), b"orphan");
    }

    #[tokio::test]
    async fn unverified_put_leaves_orphan_untouched() {
        let (_m, _o, svc) = service().await;
        let hex = hex_of(b"orphan");
        let digest = Digest::decode(&hex).unwrap();
        let path = svc.objects().path_for(&digest, true).await.unwrap();
        std::fs::write(&path, b"orphan").unwrap();

        let err = svc
            .put_object(&hex, Bytes::from_static(b"impostor"), 8)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::HashMismatch { .. }));
        assert_eq!(std::fs::read(&path).unwrap(), b"orphan");
    }

    #[tokio::test]
    async fn metadata_failure_rolls_back_payload() {
        let (_m, _o, svc) = service().await;
        sqlx::query("DROP TABLE metadata")
            .execute(svc.metadata().pool())
            .await
            .unwrap();

        let hex = hex_of(b"rollback");
        let err = svc
            .put_object(&hex, Bytes::from_static(b"rollback"), 8)
            .await
            .unwrap_err();
        assert!(err.is_storage_unavailable());

        let path = svc
            .objects()
            .path_for(&Digest::decode(&hex).unwrap(), false)
            .await
            .unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn record_without_payload_is_completed_by_put() {
        let (_m, _o, svc) = service().await;
        let data = b"half committed";
        let digest = Digest::compute(data);
        let now = Utc::now();
        svc.metadata()
            .insert(&digest, data.len() as u64, now, now)
            .await
            .unwrap();

        let err = svc
            .put_object(&digest.encode(), Bytes::from_static(data), data.len() as u64)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::DuplicateKey(_)));

        assert_eq!(svc.get_object(&digest.encode()).await.unwrap().data.as_ref(), data);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_identical_puts_store_exactly_once() {
        let (_m, metadata) = temp_store_with_connections(4).await;
        let obj_tmp = tempfile::tempdir().unwrap();
        let svc = StorageService::new(
            metadata,
            ObjectStore::new(obj_tmp.path()),
            Duration::hours(24),
        );

        for round in 0..20u8 {
            let data = Bytes::from(vec![round; 1024]);
            let hex = hex_of(&data);

            let tasks: Vec<_> = (0..8)
                .map(|_| {
                    let svc = svc.clone();
                    let hex = hex.clone();
                    let data = data.clone();
                    tokio::spawn(async move { svc.put_object(&hex, data, 1024).await })
                })
                .collect();

            let mut stored = 0;
            for task in tasks {
                match task.await.unwrap() {
                    Ok(record) => {
                        stored += 1;
                        assert_eq!(record.size, 1024);
                    }
                    Err(err) => assert!(err.is_duplicate(), "round {round}: {err}"),
                }
            }
            assert_eq!(stored, 1, "round {round}");

            let got = svc.get_object(&hex).await.unwrap();
            assert_eq!(got.data, data);
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn orphan_replacement_survives_peer_rollback() {
        let (_m, _o, svc) = service().await;
        let data = Bytes::from_static(b"contended");
        let digest = Digest::compute(&data);
        let path = svc.objects().path_for(&digest, true).await.unwrap();

        // A first writer has linked its payload but not yet recorded it.
        let first = svc.objects().write_new(&path, &data).await.unwrap();

        // A second writer sees an unrecorded payload and completes the pair.
        svc.put_object(&digest.encode(), data.clone(), data.len() as u64)
            .await
            .unwrap();

        // The first writer's metadata step fails and it rolls back.
        svc.objects().remove_written(&first).await.unwrap();

        assert_eq!(svc.get_object(&digest.encode()).await.unwrap().data, data);
    }
}
