//! JSON REST surface for the peer-matching engine.
//!
//! Exposes an axum [`Router`] backed by any [`QueueStore`] and
//! [`Notifier`]. Page rendering, TLS, and transport concerns are the
//! caller's responsibility; the two `/admin` routes are gated by HTTP
//! Basic auth.

pub mod admin;
pub mod auth;
pub mod error;
pub mod matching;
pub mod queue;

pub use error::ApiError;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use peermatch_core::{engine::Engine, notify::Notifier, store::QueueStore};

use auth::AuthConfig;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` (and the
/// `PEERMATCH_*` environment).
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  pub host:                String,
  pub port:                u16,
  /// Public base URL; used to build the status-check link carried by
  /// waiting notices.
  pub base_url:            String,
  pub store:               StoreConfig,
  pub admin_username:      String,
  pub admin_password_hash: String,
}

/// Which blob backend holds the queue document.
#[derive(Deserialize, Clone)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreConfig {
  /// Files under a local directory.
  Fs {
    root: std::path::PathBuf,
    #[serde(default = "default_blob_key")]
    key:  String,
  },
  /// An S3 bucket (requires a build with the `s3` feature).
  S3 {
    bucket: String,
    #[serde(default = "default_blob_key")]
    key:    String,
  },
}

fn default_blob_key() -> String {
  peermatch_store::DEFAULT_BLOB_KEY.to_string()
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S: QueueStore, N: Notifier> {
  pub engine: Arc<Engine<S, N>>,
  pub config: Arc<ServerConfig>,
  pub auth:   Arc<AuthConfig>,
}

impl<S: QueueStore, N: Notifier> Clone for AppState<S, N> {
  fn clone(&self) -> Self {
    Self {
      engine: self.engine.clone(),
      config: self.config.clone(),
      auth:   self.auth.clone(),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the API router for `state`.
pub fn router<S, N>(state: AppState<S, N>) -> Router
where
  S: QueueStore + 'static,
  N: Notifier + 'static,
{
  Router::new()
    .route("/api/join", post(queue::join::<S, N>))
    .route("/api/match", post(matching::attempt::<S, N>))
    .route("/api/status/{id}", get(queue::status::<S, N>))
    .route("/api/unpair", post(queue::unpair::<S, N>))
    .route("/admin/fallback", post(admin::fallback::<S, N>))
    .route("/admin/export", get(admin::export::<S, N>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

// ─── Integration tests ────────────────────────────────────────────────────────
