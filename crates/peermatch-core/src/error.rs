//! Error types for `peermatch-core`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  /// A request field failed validation. No mutation has occurred.
  #[error("invalid {field}: {message}")]
  Validation { field: &'static str, message: String },

  #[error("record not found: {0}")]
  NotFound(Uuid),

  /// Every optimistic commit attempt lost the race. The caller may retry
  /// the whole operation.
  #[error("the queue is busy, please try again")]
  Contention,

  /// The storage backend is unreachable or returned a corrupt snapshot.
  /// Load failures never produce a partial write.
  #[error("storage unavailable: {0}")]
  StorageUnavailable(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
    Self::Validation { field, message: message.into() }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
