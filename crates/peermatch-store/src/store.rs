//! [`CsvQueueStore`] — the blob-backed implementation of
//! [`peermatch_core::store::QueueStore`].

use bytes::Bytes;

use peermatch_core::store::{QueueStore, Snapshot, StoreError, Version};

use crate::{
  blob::{BlobStore, content_digest},
  codec, Error,
};

/// Key the queue document lives under when none is configured.
pub const DEFAULT_BLOB_KEY: &str = "peer_queue.csv";

/// Version token of a store whose document has never been written.
const ABSENT_VERSION: &str = "absent";

/// Queue store holding the whole record sequence as one CSV document.
///
/// The version token is the SHA-256 digest of the document bytes; saving
/// maps directly onto the blob backend's conditional put.
#[derive(Clone)]
pub struct CsvQueueStore<B> {
  blob: B,
  key:  String,
}

impl<B> CsvQueueStore<B> {
  pub fn new(blob: B) -> Self { Self::with_key(blob, DEFAULT_BLOB_KEY) }

  pub fn with_key(blob: B, key: impl Into<String>) -> Self {
    Self { blob, key: key.into() }
  }
}

impl<B: BlobStore> QueueStore for CsvQueueStore<B> {
  type Error = Error;

  async fn load(&self) -> Result<(Snapshot, Version), StoreError<Error>> {
    let bytes = self
      .blob
      .get(&self.key)
      .await
      .map_err(|e| StoreError::Backend(Error::blob(e)))?;

    match bytes {
      None => Ok((Snapshot::default(), Version::new(ABSENT_VERSION))),
      Some(bytes) => {
        let snapshot = codec::decode(&bytes).map_err(StoreError::Backend)?;
        Ok((snapshot, Version::new(content_digest(&bytes))))
      }
    }
  }

  async fn save(
    &self,
    snapshot: &Snapshot,
    expected: &Version,
  ) -> Result<Version, StoreError<Error>> {
    let bytes = codec::encode(snapshot).map_err(StoreError::Backend)?;
    let version = Version::new(content_digest(&bytes));
    let expected_digest =
      (expected.as_str() != ABSENT_VERSION).then(|| expected.as_str());

    let committed = self
      .blob
      .put_if(&self.key, Bytes::from(bytes), expected_digest)
      .await
      .map_err(|e| StoreError::Backend(Error::blob(e)))?;

    if committed {
      Ok(version)
    } else {
      Err(StoreError::Conflict)
    }
  }
}
