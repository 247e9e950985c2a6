//! Handler for `/api/match` — one match attempt for a queued record.

use axum::{Json, extract::State};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use peermatch_core::{
  engine::MatchOutcome, notify::Notifier, store::QueueStore,
};

use crate::{AppState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct MatchBody {
  pub id: Uuid,
}

/// `POST /api/match` — body: `{"id": "..."}`
pub async fn attempt<S, N>(
  State(state): State<AppState<S, N>>,
  Json(body): Json<MatchBody>,
) -> Result<Json<serde_json::Value>, ApiError>
where
  S: QueueStore + 'static,
  N: Notifier + 'static,
{
  let response = match state.engine.attempt_match(body.id).await? {
    MatchOutcome::Pending => json!({ "matched": false }),
    MatchOutcome::Matched { group_id, members } => json!({
      "matched": true,
      "group_id": group_id,
      "members": members,
    }),
  };
  Ok(Json(response))
}
