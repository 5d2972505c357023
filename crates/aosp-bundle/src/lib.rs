//! Overlay bundling
//!
//! Packs a local directory into a deterministic gzip-compressed tar rooted at
//! the directory's base name, and unpacks such a blob into a destination
//! directory. A directory that does not exist packs to an empty blob, and an
//! empty blob unpacks to nothing: a missing overlay degrades the build rather
//! than aborting it.

mod pack;
mod unpack;

pub use pack::{pack, Packer};
pub use unpack::{unpack, UnpackSummary};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};

/// Errors for bundling operations
#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Walk error: {0}")]
    WalkError(#[from] walkdir::Error),

    #[error("Symlink escapes bundle root: {path}")]
    SymlinkEscapesRoot { path: PathBuf },

    #[error("Archive entry escapes destination: {path}")]
    EntryEscapesDestination { path: PathBuf },

    #[error("Path has no base name: {0}")]
    NoBaseName(PathBuf),

    #[error("Invalid base64 payload for {origin}: {source}")]
    Decode {
        origin: String,
        #[source]
        source: base64::DecodeError,
    },

    #[error("Digest mismatch for {origin}: expected {expected}, got {actual}")]
    DigestMismatch {
        origin: String,
        expected: String,
        actual: String,
    },
}

/// A packed directory tree, ready to ship to the remote environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayBlob {
    origin: PathBuf,
    root_name: String,
    bytes: Vec<u8>,
}

impl OverlayBlob {
    /// The blob produced for a missing directory.
    pub fn empty(origin: impl Into<PathBuf>) -> Self {
        Self {
            origin: origin.into(),
            root_name: String::new(),
            bytes: Vec::new(),
        }
    }

    pub(crate) fn new(origin: PathBuf, root_name: String, bytes: Vec<u8>) -> Self {
        Self {
            origin,
            root_name,
            bytes,
        }
    }

    /// Rebuild a blob from its transport form, verifying the digest.
    ///
    /// An empty payload decodes to an empty blob without a digest check.
    pub fn from_base64(
        origin: &str,
        root_name: &str,
        data_b64: &str,
        expected_sha256: &str,
    ) -> Result<Self, BundleError> {
        if data_b64.is_empty() {
            return Ok(Self::empty(origin));
        }

        let bytes = STANDARD.decode(data_b64).map_err(|source| BundleError::Decode {
            origin: origin.to_string(),
            source,
        })?;

        let actual = sha256_hex(&bytes);
        if !expected_sha256.eq_ignore_ascii_case(&actual) {
            return Err(BundleError::DigestMismatch {
                origin: origin.to_string(),
                expected: expected_sha256.to_string(),
                actual,
            });
        }

        Ok(Self::new(PathBuf::from(origin), root_name.to_string(), bytes))
    }

    /// Local path this blob was packed from.
    pub fn origin(&self) -> &Path {
        &self.origin
    }

    /// Top-level directory name inside the archive (empty for an empty blob).
    pub fn root_name(&self) -> &str {
        &self.root_name
    }

    /// Compressed archive bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Compressed size in bytes.
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// SHA-256 of the compressed bytes.
    pub fn sha256(&self) -> String {
        sha256_hex(&self.bytes)
    }

    /// Base64 of the compressed bytes.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
