//! Admin-gated handlers: the fallback batch trigger and snapshot export.
//! Both sit behind HTTP Basic auth (see [`crate::auth`]).

use axum::{
  Json,
  extract::State,
  http::header,
  response::{IntoResponse, Response},
};
use serde_json::json;

use peermatch_core::{notify::Notifier, store::QueueStore};

use crate::{AppState, auth::Authenticated, error::ApiError};

/// `POST /admin/fallback` — run one relaxed matching pass.
pub async fn fallback<S, N>(
  _auth: Authenticated,
  State(state): State<AppState<S, N>>,
) -> Result<Json<serde_json::Value>, ApiError>
where
  S: QueueStore + 'static,
  N: Notifier + 'static,
{
  let groups_formed = state.engine.run_fallback_pass().await?;
  Ok(Json(json!({ "groups_formed": groups_formed })))
}

/// `GET /admin/export` — the full snapshot as a CSV attachment.
pub async fn export<S, N>(
  _auth: Authenticated,
  State(state): State<AppState<S, N>>,
) -> Result<Response, ApiError>
where
  S: QueueStore + 'static,
  N: Notifier + 'static,
{
  let snapshot = state.engine.export_all().await?;
  let bytes = peermatch_store::codec::encode(&snapshot)
    .map_err(|e| ApiError::Internal(Box::new(e)))?;

  Ok(
    (
      [
        (header::CONTENT_TYPE, "text/csv"),
        (
          header::CONTENT_DISPOSITION,
          "attachment; filename=\"peer_queue.csv\"",
        ),
      ],
      bytes,
    )
      .into_response(),
  )
}
