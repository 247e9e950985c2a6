//! S3 blob backend (enabled with the `s3` cargo feature).
//!
//! Holds the queue document in a bucket, mapping [`BlobStore::put_if`]
//! onto S3's conditional writes:
//! `If-None-Match: *` for first creation, and `If-Match` against the ETag
//! observed during the digest check for overwrites. Either precondition
//! failing reports a clean CAS miss for the engine to retry.

use aws_config::BehaviorVersion;
use aws_sdk_s3::{
  Client,
  error::{ProvideErrorMetadata, SdkError},
  primitives::ByteStream,
};
use bytes::Bytes;
use thiserror::Error;
use tracing::debug;

use crate::blob::{BlobStore, content_digest};

#[derive(Debug, Error)]
pub enum S3Error {
  #[error("s3 error: {0}")]
  Aws(String),
}

pub struct S3BlobStore {
  client: Client,
  bucket: String,
}

impl S3BlobStore {
  pub fn new(client: Client, bucket: impl Into<String>) -> Self {
    Self { client, bucket: bucket.into() }
  }

  /// Build a client from ambient AWS configuration (environment, shared
  /// profile, instance metadata).
  pub async fn from_env(bucket: impl Into<String>) -> Self {
    let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    Self::new(Client::new(&config), bucket)
  }

  async fn get_with_etag(
    &self,
    key: &str,
  ) -> Result<Option<(Bytes, String)>, S3Error> {
    let output = match self
      .client
      .get_object()
      .bucket(&self.bucket)
      .key(key)
      .send()
      .await
    {
      Ok(output) => output,
      Err(e) if is_missing(&e) => return Ok(None),
      Err(e) => return Err(S3Error::Aws(e.to_string())),
    };

    let etag = output
      .e_tag()
      .map(str::to_string)
      .ok_or_else(|| S3Error::Aws("object has no etag".to_string()))?;
    let bytes = output
      .body
      .collect()
      .await
      .map_err(|e| S3Error::Aws(e.to_string()))?
      .into_bytes();
    Ok(Some((bytes, etag)))
  }
}

impl BlobStore for S3BlobStore {
  type Error = S3Error;

  async fn get(&self, key: &str) -> Result<Option<Bytes>, S3Error> {
    Ok(self.get_with_etag(key).await?.map(|(bytes, _)| bytes))
  }

  async fn put_if(
    &self,
    key: &str,
    bytes: Bytes,
    expected_digest: Option<&str>,
  ) -> Result<bool, S3Error> {
    let request = self
      .client
      .put_object()
      .bucket(&self.bucket)
      .key(key)
      .content_type("text/csv");

    let request = match expected_digest {
      None => request.if_none_match("*"),
      Some(expected) => {
        // Verify the digest against the current object, then make the
        // write conditional on that same object still being in place.
        let Some((current, etag)) = self.get_with_etag(key).await? else {
          return Ok(false);
        };
        if content_digest(&current) != expected {
          return Ok(false);
        }
        request.if_match(etag)
      }
    };

    match request.body(ByteStream::from(bytes)).send().await {
      Ok(_) => Ok(true),
      Err(e) if is_precondition_failed(&e) => {
        debug!(key, "conditional put lost the race");
        Ok(false)
      }
      Err(e) => Err(S3Error::Aws(e.to_string())),
    }
  }
}

fn is_missing(
  err: &SdkError<aws_sdk_s3::operation::get_object::GetObjectError>,
) -> bool {
  err
    .as_service_error()
    .map(|e| e.is_no_such_key())
    .unwrap_or(false)
}

fn is_precondition_failed<E>(err: &SdkError<E>) -> bool
where
  SdkError<E>: ProvideErrorMetadata,
{
  err.code() == Some("PreconditionFailed")
}
