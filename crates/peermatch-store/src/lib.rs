//! CSV-snapshot backend for the peer-matching queue store.
//!
//! The whole queue is one CSV document held in a blob backend. The version
//! token of a snapshot is the SHA-256 digest of its serialized bytes, and
//! every save is a conditional overwrite against that digest, which gives
//! the optimistic compare-and-swap the engine's retry loop relies on.

mod store;

pub mod blob;
pub mod codec;
pub mod error;

#[cfg(feature = "s3")]
pub mod s3;

pub use blob::{BlobStore, FsBlobStore, MemoryBlobStore};
pub use error::{Error, Result};
pub use store::{CsvQueueStore, DEFAULT_BLOB_KEY};

#[cfg(test)]
mod tests;
