//! Two-level shard layout for object payloads.
//!
//! A digest with hex form `abcdef0123...` lives at
//! `root/abc/def/abcdef0123...`. Each level fans out over 4096 prefixes.

use crate::services::digest::Digest;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::fs;

const SHARD_WIDTH: usize = 3;

/// Compute the payload path for `digest` beneath `root`. Touches nothing on disk.
pub fn shard_path(root: &Path, digest: &Digest) -> PathBuf {
    let hex = digest.encode();
    let mut path = root.to_path_buf();
    path.push(&hex[..SHARD_WIDTH]);
    path.push(&hex[SHARD_WIDTH..SHARD_WIDTH * 2]);
    path.push(hex);
    path
}

/// Resolve the payload path, optionally creating both shard directories.
///
/// The outer directory is created before the inner one. A directory that
/// already exists (including one created concurrently) is not an error.
pub async fn resolve(root: &Path, digest: &Digest, create_dirs: bool) -> io::Result<PathBuf> {
    let path = shard_path(root, digest);
    if create_dirs {
        let inner = path
            .parent()
            .ok_or_else(|| io::Error::other("shard path missing parent directory"))?;
        let outer = inner
            .parent()
            .ok_or_else(|| io::Error::other("shard path missing outer directory"))?;
        create_dir_idempotent(outer).await?;
        create_dir_idempotent(inner).await?;
    }
    Ok(path)
}

async fn create_dir_idempotent(dir: &Path) -> io::Result<()> {
    match fs::create_dir(dir).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::AlreadyExists => {
            match fs::metadata(dir).await {
                Ok(meta) if meta.is_dir() => Ok(()),
                _ => Err(err),
            }
        }
        Err(err) => Err(err),
    }
}
