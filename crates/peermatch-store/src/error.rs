//! Error type for `peermatch-store`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("blob backend error: {0}")]
  Blob(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("csv error: {0}")]
  Csv(#[from] csv::Error),

  /// The stored snapshot cannot be interpreted as a record sequence.
  #[error("corrupt snapshot: {0}")]
  Corrupt(String),
}

impl Error {
  pub fn blob(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Blob(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
