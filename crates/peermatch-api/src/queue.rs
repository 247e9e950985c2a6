//! Handlers for joining the queue, checking status, and withdrawing.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/api/join` | Body: the candidate fields |
//! | `GET`  | `/api/status/:id` | 404 if not found |
//! | `POST` | `/api/unpair` | Body: `{"id": ..., "reason": ...}` |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use peermatch_core::{
  engine::{JoinOutcome, JoinRequest},
  notify::Notifier,
  store::QueueStore,
};

use crate::{AppState, error::ApiError};

// ─── Join ─────────────────────────────────────────────────────────────────────

/// `POST /api/join`
pub async fn join<S, N>(
  State(state): State<AppState<S, N>>,
  Json(body): Json<JoinRequest>,
) -> Result<Response, ApiError>
where
  S: QueueStore + 'static,
  N: Notifier + 'static,
{
  let response = match state.engine.join(body).await? {
    JoinOutcome::Joined { id } => {
      (StatusCode::CREATED, Json(json!({ "id": id }))).into_response()
    }
    JoinOutcome::AlreadyQueued { id } => {
      Json(json!({ "already_queued": true, "id": id })).into_response()
    }
    JoinOutcome::AlreadyMatched { record, members } => Json(json!({
      "already_matched": true,
      "record": record,
      "members": members,
    }))
    .into_response(),
  };
  Ok(response)
}

// ─── Status ───────────────────────────────────────────────────────────────────

/// `GET /api/status/:id`
pub async fn status<S, N>(
  State(state): State<AppState<S, N>>,
  Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError>
where
  S: QueueStore + 'static,
  N: Notifier + 'static,
{
  let view = state.engine.status(id).await?;
  Ok(Json(json!({
    "matched": view.record.matched,
    "record": view.record,
    "members": view.members,
  })))
}

// ─── Unpair ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct UnpairBody {
  pub id:     Uuid,
  #[serde(default)]
  pub reason: String,
}

/// `POST /api/unpair`
pub async fn unpair<S, N>(
  State(state): State<AppState<S, N>>,
  Json(body): Json<UnpairBody>,
) -> Result<Json<serde_json::Value>, ApiError>
where
  S: QueueStore + 'static,
  N: Notifier + 'static,
{
  state.engine.unpair(body.id, &body.reason).await?;
  Ok(Json(json!({ "success": true })))
}
