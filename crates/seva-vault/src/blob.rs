//! # Blob Storage
//!
//! Raw document bytes are content-addressed by their SHA-256 digest. Writing
//! the same bytes twice is a no-op, so a blob written for an upload whose
//! metadata commit later fails is harmless: it is simply unreferenced.
//!
//! Two backends:
//!
//! - [`FsBlobStore`]: `{root}/{hex[0..2]}/{hex}.bin`, written to a temp
//!   file in the same directory and renamed into place, so a reader never
//!   sees a partial blob. An existing file that no longer matches its
//!   digest is rewritten.
//! - [`MemoryBlobStore`]: a locked map, for tests and database-less runs.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tempfile::NamedTempFile;

use crate::digest::ContentDigest;
use crate::error::VaultError;

/// Content-addressed byte storage.
pub trait BlobStore: Send + Sync + std::fmt::Debug {
    /// Store `bytes` under `digest`. Returns the storage URI.
    fn put(&self, digest: &ContentDigest, bytes: &[u8]) -> Result<String, VaultError>;

    /// Fetch the bytes stored under `digest`, if any.
    fn get(&self, digest: &ContentDigest) -> Result<Option<Vec<u8>>, VaultError>;
}

/// Filesystem-backed blob store.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// The root directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, digest: &ContentDigest) -> PathBuf {
        let hex = digest.to_hex();
        self.root.join(&hex[..2]).join(format!("{hex}.bin"))
    }
}

impl BlobStore for FsBlobStore {
    fn put(&self, digest: &ContentDigest, bytes: &[u8]) -> Result<String, VaultError> {
        let path = self.path_for(digest);
        let uri = format!("file://{}", path.display());
        match fs::read(&path) {
            Ok(existing) if digest.verify(&existing) => return Ok(uri),
            Ok(_) => tracing::warn!(path = %path.display(), "replacing damaged blob"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let dir = path
            .parent()
            .ok_or_else(|| std::io::Error::other("blob path has no parent directory"))?;
        fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| e.error)?;
        Ok(uri)
    }

    fn get(&self, digest: &ContentDigest) -> Result<Option<Vec<u8>>, VaultError> {
        match fs::read(self.path_for(digest)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory blob store.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<ContentDigest, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }

    /// Overwrite stored bytes without touching the digest key. Lets tests
    /// simulate on-disk corruption.
    #[cfg(test)]
    pub(crate) fn corrupt(&self, digest: &ContentDigest, bytes: Vec<u8>) {
        self.blobs.write().insert(*digest, bytes);
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, digest: &ContentDigest, bytes: &[u8]) -> Result<String, VaultError> {
        self.blobs
            .write()
            .entry(*digest)
            .or_insert_with(|| bytes.to_vec());
        Ok(format!("mem://sha256/{}", digest.to_hex()))
    }

    fn get(&self, digest: &ContentDigest) -> Result<Option<Vec<u8>>, VaultError> {
        Ok(self.blobs.read().get(digest).cloned())
    }
}
