//! peermatch server binary.
//!
//! Reads `config.toml` (or the path given with `--config`), opens the
//! configured blob-backed queue store, and serves the JSON API.
//!
//! # Password hash generation
//!
//! To generate the argon2 PHC string for `admin_password_hash` in
//! config.toml:
//!
//! ```
//! cargo run -p peermatch-api --bin server -- --hash-password
//! ```

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use clap::Parser;
use peermatch_api::{AppState, ServerConfig, StoreConfig, auth::AuthConfig};
use peermatch_core::{engine::Engine, notify::LogNotifier};
use peermatch_store::{BlobStore, CsvQueueStore, FsBlobStore};
use rand_core::OsRng;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Peer matching server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Print the argon2 hash for a password entered on stdin and exit.
  #[arg(long)]
  hash_password: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Helper mode: hash a password and exit.
  if cli.hash_password {
    let password = read_password()?;
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
      .hash_password(password.as_bytes(), &salt)
      .map_err(|e| anyhow::anyhow!("argon2 error: {e}"))?
      .to_string();
    println!("{hash}");
    return Ok(());
  }

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("PEERMATCH"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  match server_cfg.store.clone() {
    StoreConfig::Fs { root, key } => {
      serve(CsvQueueStore::with_key(FsBlobStore::new(root), key), server_cfg)
        .await
    }
    #[cfg(feature = "s3")]
    StoreConfig::S3 { bucket, key } => {
      let blob = peermatch_store::s3::S3BlobStore::from_env(bucket).await;
      serve(CsvQueueStore::with_key(blob, key), server_cfg).await
    }
    #[cfg(not(feature = "s3"))]
    StoreConfig::S3 { .. } => {
      anyhow::bail!("this build has no S3 support; enable the `s3` feature")
    }
  }
}

async fn serve<B>(
  store: CsvQueueStore<B>,
  config: ServerConfig,
) -> anyhow::Result<()>
where
  B: BlobStore + 'static,
{
  let status_check_url =
    format!("{}/api/status", config.base_url.trim_end_matches('/'));
  let engine = Engine::new(store, LogNotifier, status_check_url);

  let state = AppState {
    engine: Arc::new(engine),
    auth:   Arc::new(AuthConfig {
      username:      config.admin_username.clone(),
      password_hash: config.admin_password_hash.clone(),
    }),
    config: Arc::new(config.clone()),
  };

  let app = peermatch_api::router(state);
  let address = format!("{}:{}", config.host, config.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Read a password from stdin.
fn read_password() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  let stdin = io::stdin();
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  stdin.lock().read_line(&mut line)?;
  Ok(
    line
      .trim_end_matches('\n')
      .trim_end_matches('\r')
      .to_string(),
  )
}
