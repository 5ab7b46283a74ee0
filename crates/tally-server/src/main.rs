//! tally server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`), opens an
//! in-process SQLite store, serves the ledger API over HTTP, and runs the
//! fixed-decay sweep on a timer in the background.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use anyhow::Context as _;
use chrono::Utc;
use clap::Parser;
use serde::Deserialize;
use tally_ledger::{LedgerService, TracingNotifier};
use tally_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Attendance violation point ledger server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
}

/// Runtime server configuration, deserialised from `config.toml` or
/// `TALLY_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
struct ServerConfig {
  #[serde(default = "default_host")]
  host:                String,
  #[serde(default = "default_port")]
  port:                u16,
  #[serde(default = "default_store_path")]
  store_path:          PathBuf,
  /// Seconds between fixed-decay sweeps. The first sweep runs at startup.
  #[serde(default = "default_sweep_interval_secs")]
  sweep_interval_secs: u64,
}

fn default_host() -> String { "127.0.0.1".to_string() }
fn default_port() -> u16 { 5080 }
fn default_store_path() -> PathBuf { PathBuf::from("tally.db") }
fn default_sweep_interval_secs() -> u64 { 3600 }

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

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("TALLY"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  // Expand `~` in store path.
  let store_path = expand_tilde(&server_cfg.store_path);

  // Open SQLite store.
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let service = Arc::new(LedgerService::new(store, TracingNotifier));

  // Fixed-decay sweep on a timer. The interval fires immediately, so a
  // server that was down over an expiry date catches up on startup.
  let sweeper = service.clone();
  let interval = Duration::from_secs(server_cfg.sweep_interval_secs);
  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
      ticker.tick().await;
      match sweeper.run_sweep(Utc::now().date_naive()).await {
        Ok(report) => tracing::debug!(
          users_swept = report.users_swept,
          points_expired = report.points_expired,
          recomputed = report.recomputed,
          failures = report.failures,
          "scheduled fixed decay sweep finished"
        ),
        Err(error) => tracing::error!(%error, "scheduled fixed decay sweep failed"),
      }
    }
  });

  let app = axum::Router::new()
    .nest("/api", tally_api::api_router(service))
    .layer(TraceLayer::new_for_http());

  let address = format!("{}:{}", server_cfg.host, server_cfg.port);
  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
