//! Filesystem payload storage beneath a sharded root.
//!
//! Payloads are written to a temp file next to their final location and then
//! claimed with a hard link. `link(2)` fails when the target exists, which
//! gives exclusive-create semantics without ever overwriting a payload, and
//! readers only ever see a fully written, fsynced file. A payload left without
//! a metadata record is replaced with `rename(2)`, never unlinked first.

use crate::services::{
    digest::Digest,
    shard,
    storage_service::{StorageError, StorageResult},
};
use bytes::Bytes;
use std::{
    fs::Metadata,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct ObjectStore {
    root: PathBuf,
}

impl ObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve the payload path for `digest`, creating shard dirs on request.
    pub async fn path_for(&self, digest: &Digest, create_dirs: bool) -> StorageResult<PathBuf> {
        Ok(shard::resolve(&self.root, digest, create_dirs).await?)
    }

    pub async fn exists(&self, path: &Path) -> StorageResult<bool> {
        Ok(fs::try_exists(path).await?)
    }

    /// Write `data` to `path` unless something is already there.
    ///
    /// The returned handle remembers which file this call created, so a
    /// later rollback never removes a payload written by someone else.
    pub async fn write_new(&self, path: &Path, data: &[u8]) -> StorageResult<WrittenPayload> {
        let tmp_path = temp_path_beside(path)?;

        let identity = match write_synced(&tmp_path, data).await {
            Ok(identity) => identity,
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
        };

        let claimed = fs::hard_link(&tmp_path, path).await;
        if let Err(err) = fs::remove_file(&tmp_path).await {
            debug!("failed to remove temp file {}: {}", tmp_path.display(), err);
        }

        match claimed {
            Ok(()) => Ok(WrittenPayload {
                path: path.to_path_buf(),
                identity,
            }),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                Err(StorageError::AlreadyExists(path.to_path_buf()))
            }
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    /// Atomically swap `data` in at `path`, replacing whatever is there.
    ///
    /// The path is never observed missing or partially written. Only used for
    /// verified content over a payload that has no metadata record.
    pub async fn replace(&self, path: &Path, data: &[u8]) -> StorageResult<()> {
        let tmp_path = temp_path_beside(path)?;

        let result = match write_synced(&tmp_path, data).await {
            Ok(_) => fs::rename(&tmp_path, path).await,
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        Ok(())
    }

    /// Remove a payload created by [`ObjectStore::write_new`], but only if the
    /// file at its path is still the one that call created.
    pub async fn remove_written(&self, written: &WrittenPayload) -> StorageResult<()> {
        let current = match fs::metadata(&written.path).await {
            Ok(meta) => file_identity(&meta),
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(StorageError::Io(err)),
        };
        if current.is_some() && current != written.identity {
            debug!(
                "payload at {} was replaced; leaving it in place",
                written.path.display()
            );
            return Ok(());
        }

        match fs::remove_file(&written.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    /// Read the whole payload at `path`.
    pub async fn read_all(&self, path: &Path) -> StorageResult<Bytes> {
        fs::read(path)
            .await
            .map(Bytes::from)
            .map_err(|err| not_found_or_io(err, path))
    }

    /// Open the payload at `path` for streaming.
    pub async fn open(&self, path: &Path) -> StorageResult<File> {
        File::open(path)
            .await
            .map_err(|err| not_found_or_io(err, path))
    }
}

/// A payload file this process linked into place.
#[derive(Debug, Clone)]
pub struct WrittenPayload {
    path: PathBuf,
    identity: Option<FileIdentity>,
}

impl WrittenPayload {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// `(device, inode)` of a file.
type FileIdentity = (u64, u64);

#[cfg(unix)]
fn file_identity(meta: &Metadata) -> Option<FileIdentity> {
    use std::os::unix::fs::MetadataExt;
    Some((meta.dev(), meta.ino()))
}

#[cfg(not(unix))]
fn file_identity(_meta: &Metadata) -> Option<FileIdentity> {
    None
}

fn temp_path_beside(path: &Path) -> StorageResult<PathBuf> {
    let parent = path.parent().ok_or_else(|| {
        StorageError::Io(io::Error::other("object path missing parent directory"))
    })?;
    Ok(parent.join(format!(".tmp-{}", Uuid::new_v4())))
}

async fn write_synced(path: &Path, data: &[u8]) -> io::Result<Option<FileIdentity>> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(data).await?;
    file.flush().await?;
    file.sync_all().await?;
    Ok(file_identity(&file.metadata().await?))
}

fn not_found_or_io(err: io::Error, path: &Path) -> StorageError {
    if err.kind() == ErrorKind::NotFound {
        StorageError::PayloadMissing(path.to_path_buf())
    } else {
        StorageError::Io(err)
    }
}
