//! SHA-256 digests and their hex form.
//!
//! A [`Digest`] is the identity of a stored object. The canonical external
//! representation is 64 lowercase hex characters.

use sha2::{Digest as _, Sha256};
use std::fmt;
use thiserror::Error;

/// Raw digest length in bytes.
pub const DIGEST_LEN: usize = 32;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DigestError {
    #[error("invalid hash")]
    Malformed,
    #[error("invalid hash length: expected 32 bytes, got {0}")]
    InvalidLength(usize),
}

/// A 32-byte SHA-256 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    /// Hash `data` with SHA-256.
    pub fn compute(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Parse a hex string. Case-insensitive.
    pub fn decode(hex_str: &str) -> Result<Self, DigestError> {
        let lowered = hex_str.to_ascii_lowercase();
        let raw = hex::decode(&lowered).map_err(|_| DigestError::Malformed)?;
        let bytes: [u8; DIGEST_LEN] = raw
            .as_slice()
            .try_into()
            .map_err(|_| DigestError::InvalidLength(raw.len()))?;
        Ok(Self(bytes))
    }

    /// Lowercase hex, always 64 characters.
    pub fn encode(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    pub fn from_slice(raw: &[u8]) -> Result<Self, DigestError> {
        raw.try_into()
            .map(Self)
            .map_err(|_| DigestError::InvalidLength(raw.len()))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.encode())
    }
}
