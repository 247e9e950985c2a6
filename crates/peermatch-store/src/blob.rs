//! The blob interface the queue store is built on, plus the two
//! always-available backends.
//!
//! A backend stores opaque byte documents under string keys and must offer
//! one conditional primitive: overwrite a key only if its current content
//! still hashes to an expected digest. That single primitive carries the
//! whole optimistic-concurrency scheme; everything above it is pure
//! computation over loaded bytes.

use std::{
  collections::HashMap,
  convert::Infallible,
  future::Future,
  path::PathBuf,
  sync::{Arc, RwLock},
};

use bytes::Bytes;
use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `bytes`; the version token for a snapshot.
pub fn content_digest(bytes: &[u8]) -> String {
  hex::encode(Sha256::digest(bytes))
}

// ─── Trait ───────────────────────────────────────────────────────────────────

pub trait BlobStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Fetch the document at `key`, or `None` if it has never been written.
  fn get<'a>(
    &'a self,
    key: &'a str,
  ) -> impl Future<Output = Result<Option<Bytes>, Self::Error>> + Send + 'a;

  /// Conditionally overwrite `key`.
  ///
  /// With `expected_digest = Some(d)` the write succeeds only if the
  /// current content hashes to `d`; with `None` only if the key does not
  /// exist yet. Returns `false`, leaving the store unchanged, when the
  /// precondition fails.
  fn put_if<'a>(
    &'a self,
    key: &'a str,
    bytes: Bytes,
    expected_digest: Option<&'a str>,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;
}

// ─── In-memory backend ───────────────────────────────────────────────────────

/// Process-local backend. Cloning is cheap; clones share storage, so a
/// clone hands the same logical store to concurrent callers (which is what
/// the tests exercise).
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
  blobs: Arc<RwLock<HashMap<String, Bytes>>>,
}

impl MemoryBlobStore {
  pub fn new() -> Self { Self::default() }
}

impl BlobStore for MemoryBlobStore {
  type Error = Infallible;

  async fn get(&self, key: &str) -> Result<Option<Bytes>, Infallible> {
    let blobs = self.blobs.read().unwrap_or_else(|e| e.into_inner());
    Ok(blobs.get(key).cloned())
  }

  async fn put_if(
    &self,
    key: &str,
    bytes: Bytes,
    expected_digest: Option<&str>,
  ) -> Result<bool, Infallible> {
    // Compare and swap under one write lock; no await points inside.
    let mut blobs = self.blobs.write().unwrap_or_else(|e| e.into_inner());
    let current = blobs.get(key);
    let matches = match (current, expected_digest) {
      (None, None) => true,
      (Some(current), Some(expected)) => content_digest(current) == expected,
      _ => false,
    };
    if matches {
      blobs.insert(key.to_string(), bytes);
    }
    Ok(matches)
  }
}

// ─── Filesystem backend ──────────────────────────────────────────────────────

/// Backend storing each key as a file under a root directory.
///
/// The compare-and-swap is guarded by an in-process lock, which makes it
/// atomic for a single server process; multi-process deployments need a
/// backend with a native conditional write (see the `s3` feature).
#[derive(Clone)]
pub struct FsBlobStore {
  root: PathBuf,
  cas:  Arc<tokio::sync::Mutex<()>>,
}

impl FsBlobStore {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into(), cas: Arc::new(tokio::sync::Mutex::new(())) }
  }

  fn path_for(&self, key: &str) -> PathBuf { self.root.join(key) }

  async fn read_current(&self, key: &str) -> Result<Option<Bytes>, std::io::Error> {
    match tokio::fs::read(self.path_for(key)).await {
      Ok(bytes) => Ok(Some(Bytes::from(bytes))),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
      Err(e) => Err(e),
    }
  }
}

impl BlobStore for FsBlobStore {
  type Error = std::io::Error;

  async fn get(&self, key: &str) -> Result<Option<Bytes>, std::io::Error> {
    self.read_current(key).await
  }

  async fn put_if(
    &self,
    key: &str,
    bytes: Bytes,
    expected_digest: Option<&str>,
  ) -> Result<bool, std::io::Error> {
    let _guard = self.cas.lock().await;

    let current = self.read_current(key).await?;
    let matches = match (&current, expected_digest) {
      (None, None) => true,
      (Some(current), Some(expected)) => content_digest(current) == expected,
      _ => false,
    };
    if !matches {
      return Ok(false);
    }

    tokio::fs::create_dir_all(&self.root).await?;
    tokio::fs::write(self.path_for(key), &bytes).await?;
    Ok(true)
  }
}
