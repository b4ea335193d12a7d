//! Server configuration, deserialised from `config.toml` layered under
//! `TRIAGEDECK_*` environment variables.

use std::path::PathBuf;

use serde::Deserialize;

fn default_host() -> String { "127.0.0.1".to_string() }
fn default_port() -> u16 { 8000 }
fn default_store_path() -> PathBuf { PathBuf::from("data/triagedeck.db") }
fn default_artifact_dir() -> PathBuf { PathBuf::from("data/exports") }
fn default_cursor_ttl_ms() -> i64 { 7 * 24 * 60 * 60 * 1000 }
fn default_skew_window_ms() -> i64 { 24 * 60 * 60 * 1000 }
fn default_signed_url_ttl_ms() -> i64 { 15 * 60 * 1000 }
fn default_export_ttl_ms() -> i64 { 7 * 24 * 60 * 60 * 1000 }
fn default_export_max_rows() -> u64 { 1_000_000 }
fn default_export_max_bytes() -> u64 { 5 * 1024 * 1024 * 1024 }
fn default_export_workers() -> usize { 2 }
fn default_export_concurrency() -> u64 { 2 }
fn default_reads_per_minute() -> u32 { 600 }
fn default_writes_per_minute() -> u32 { 60 }
fn default_sweep_interval_secs() -> u64 { 60 }
fn default_export_allowlist() -> Vec<String> {
  [
    "item_id",
    "external_id",
    "decision_id",
    "note",
    "ts_server",
    "variant_key",
    "metadata.subject_id",
    "metadata.session_id",
  ]
  .iter()
  .map(|s| s.to_string())
  .collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host: String,
  #[serde(default = "default_port")]
  pub port: u16,
  #[serde(default = "default_store_path")]
  pub store_path: PathBuf,
  #[serde(default = "default_artifact_dir")]
  pub artifact_dir: PathBuf,

  /// Process-wide secret for cursor HMAC tags. Required.
  pub cursor_secret: String,
  /// When set (together with `media_base_url`), media URLs are HMAC-signed;
  /// otherwise logical URIs pass through unchanged.
  #[serde(default)]
  pub media_secret: Option<String>,
  #[serde(default)]
  pub media_base_url: Option<String>,

  #[serde(default = "default_cursor_ttl_ms")]
  pub cursor_ttl_ms: i64,
  #[serde(default = "default_skew_window_ms")]
  pub skew_window_ms: i64,
  #[serde(default = "default_signed_url_ttl_ms")]
  pub signed_url_ttl_ms: i64,

  #[serde(default = "default_export_ttl_ms")]
  pub export_ttl_ms: i64,
  #[serde(default = "default_export_max_rows")]
  pub export_max_rows: u64,
  #[serde(default = "default_export_max_bytes")]
  pub export_max_bytes: u64,
  #[serde(default = "default_export_workers")]
  pub export_workers: usize,
  #[serde(default = "default_export_concurrency")]
  pub export_max_concurrent_per_user: u64,
  #[serde(default = "default_export_allowlist")]
  pub export_allowlist: Vec<String>,

  #[serde(default = "default_reads_per_minute")]
  pub reads_per_minute: u32,
  #[serde(default = "default_writes_per_minute")]
  pub writes_per_minute: u32,
  #[serde(default = "default_sweep_interval_secs")]
  pub sweep_interval_secs: u64,
}
