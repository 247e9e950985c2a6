//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::{StatusCode, header},
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("invalid {field}: {message}")]
  Validation { field: &'static str, message: String },

  #[error("unauthorized")]
  Unauthorized,

  /// Optimistic retries were exhausted; the caller may simply try again.
  #[error("the queue is busy, please try again")]
  Contention,

  #[error("internal error: {0}")]
  Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<peermatch_core::Error> for ApiError {
  fn from(e: peermatch_core::Error) -> Self {
    use peermatch_core::Error as Core;
    match e {
      Core::Validation { field, message } => Self::Validation { field, message },
      Core::NotFound(id) => Self::NotFound(format!("record {id} not found")),
      Core::Contention => Self::Contention,
      Core::StorageUnavailable(e) => Self::Internal(e),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    match self {
      ApiError::NotFound(message) => {
        (StatusCode::NOT_FOUND, Json(json!({ "error": message })))
          .into_response()
      }
      ApiError::Validation { field, message } => (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({ "error": format!("invalid {field}: {message}"), "field": field })),
      )
        .into_response(),
      ApiError::Unauthorized => (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Basic realm=\"peermatch-admin\"")],
        Json(json!({ "error": "unauthorized" })),
      )
        .into_response(),
      ApiError::Contention => (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "error": "the queue is busy, please try again" })),
      )
        .into_response(),
      ApiError::Internal(e) => {
        tracing::error!(error = %e, "request failed");
        (
          StatusCode::INTERNAL_SERVER_ERROR,
          Json(json!({ "error": "internal error" })),
        )
          .into_response()
      }
    }
  }
}
