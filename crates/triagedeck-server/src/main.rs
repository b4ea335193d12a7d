//! triagedeck server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`), opens an
//! in-process SQLite store, spawns the export worker pool and expiry sweeper,
//! and serves the JSON API over HTTP.
//!
//! # Dev seed
//!
//! ```
//! cargo run -p triagedeck-server -- seed
//! ```

mod seed;
mod settings;

use std::{sync::Arc, time::Duration};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use triagedeck_api::{ApiConfig, AppState, rate_limit::RateLimiter};
use triagedeck_core::{
  clock::SkewWindow,
  cursor::CursorCodec,
  resolver::{PublicResolver, SignedResolver, StorageResolver},
};
use triagedeck_export::{ExpirySweeper, ExportWorker, WorkerConfig};
use triagedeck_store_sqlite::SqliteStore;

use settings::ServerConfig;

#[derive(Parser)]
#[command(author, version, about = "triagedeck review backend")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: std::path::PathBuf,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
  /// Run the HTTP server (the default).
  Serve,
  /// Create the local demo org, users, and project.
  Seed,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config.clone()).required(false))
    .add_source(config::Environment::with_prefix("TRIAGEDECK"))
    .build()
    .context("failed to read config file")?;
  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  let store = SqliteStore::open(&server_cfg.store_path)
    .await
    .with_context(|| {
      format!("failed to open store at {:?}", server_cfg.store_path)
    })?;

  match cli.command.unwrap_or(Command::Serve) {
    Command::Seed => seed::run(&store).await,
    Command::Serve => serve(server_cfg, store).await,
  }
}

async fn serve(cfg: ServerConfig, store: SqliteStore) -> anyhow::Result<()> {
  let store = Arc::new(store);

  let resolver: Arc<dyn StorageResolver> = match (&cfg.media_secret, &cfg.media_base_url)
  {
    (Some(secret), Some(base_url)) => {
      Arc::new(SignedResolver::new(secret.as_bytes(), base_url.clone()))
    }
    _ => Arc::new(PublicResolver),
  };

  let state = AppState {
    store:    Arc::clone(&store),
    resolver,
    cursors:  Arc::new(CursorCodec::new(
      cfg.cursor_secret.as_bytes(),
      cfg.cursor_ttl_ms,
    )),
    limiter:  Arc::new(RateLimiter::new(
      cfg.reads_per_minute,
      cfg.writes_per_minute,
    )),
    config:   Arc::new(ApiConfig {
      skew_window: SkewWindow::new(cfg.skew_window_ms),
      signed_url_ttl_ms: cfg.signed_url_ttl_ms,
      export_allowlist: cfg.export_allowlist.clone(),
      export_max_concurrent_per_user: cfg.export_max_concurrent_per_user,
    }),
  };

  // Export workers and the expiry sweeper share the store with the request
  // handlers; nothing else is shared.
  ExportWorker::spawn_pool(
    Arc::clone(&store),
    WorkerConfig {
      artifact_dir: cfg.artifact_dir.clone(),
      max_rows: cfg.export_max_rows,
      max_bytes: cfg.export_max_bytes,
      artifact_ttl_ms: cfg.export_ttl_ms,
      ..WorkerConfig::default()
    },
    cfg.export_workers,
  );
  tokio::spawn(
    ExpirySweeper::new(
      Arc::clone(&store),
      cfg.artifact_dir.clone(),
      Duration::from_secs(cfg.sweep_interval_secs),
    )
    .run(),
  );

  let app = triagedeck_api::api_router(state);
  let address = format!("{}:{}", cfg.host, cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}
