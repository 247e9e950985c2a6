//! The `QueueStore` trait and snapshot types.
//!
//! The trait is implemented by storage backends (e.g. the CSV-blob store in
//! `peermatch-store`). The store holds one logical document: the full
//! ordered sequence of records, addressed by an opaque version token.
//! Insertion order is the processing order used by the matchers.
//!
//! All mutation paths are expressed as load -> compute -> conditional save;
//! [`QueueStore::save`] must commit atomically and only if the store's
//! version still equals the expected one. There is no pessimistic locking.

use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::record::{GroupId, Record};

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// The full ordered record sequence at one point in time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
  pub records: Vec<Record>,
}

impl Snapshot {
  pub fn new(records: Vec<Record>) -> Self { Self { records } }

  pub fn len(&self) -> usize { self.records.len() }

  pub fn is_empty(&self) -> bool { self.records.is_empty() }

  pub fn find(&self, id: Uuid) -> Option<&Record> {
    self.records.iter().find(|r| r.id == id)
  }

  pub fn find_mut(&mut self, id: Uuid) -> Option<&mut Record> {
    self.records.iter_mut().find(|r| r.id == id)
  }

  /// The derived group view: every record sharing `group_id`, in store
  /// order.
  pub fn group_members(&self, group_id: &GroupId) -> Vec<&Record> {
    self
      .records
      .iter()
      .filter(|r| r.group_id.as_ref() == Some(group_id))
      .collect()
  }
}

// ─── Version token ───────────────────────────────────────────────────────────

/// Opaque token identifying one committed snapshot state. Backends derive
/// it from content (e.g. a digest) or an external conditional-write
/// primitive; the engine only ever compares and passes it back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version(String);

impl Version {
  pub fn new(token: impl Into<String>) -> Self { Self(token.into()) }

  pub fn as_str(&self) -> &str { &self.0 }
}

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Outcome of a failed store operation, generic over the backend's own
/// error type so conflicts stay distinguishable from outages.
#[derive(Debug, Error)]
pub enum StoreError<E> {
  /// The conditional save lost the race: the store's version no longer
  /// matches the expected one. Nothing was written.
  #[error("snapshot version conflict")]
  Conflict,

  #[error(transparent)]
  Backend(E),
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the shared record store.
///
/// All methods return `Send` futures so the trait can be used from
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait QueueStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Return the current snapshot and its version token. A store with no
  /// persisted document yet yields an empty snapshot.
  fn load(
    &self,
  ) -> impl Future<Output = Result<(Snapshot, Version), StoreError<Self::Error>>>
  + Send
  + '_;

  /// Atomically overwrite the whole snapshot, but only if the store's
  /// current version still equals `expected`. On a version mismatch the
  /// store is left unchanged and [`StoreError::Conflict`] is returned.
  fn save<'a>(
    &'a self,
    snapshot: &'a Snapshot,
    expected: &'a Version,
  ) -> impl Future<Output = Result<Version, StoreError<Self::Error>>> + Send + 'a;
}
