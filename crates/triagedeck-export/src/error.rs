//! Error type for `triagedeck-export`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("parquet error: {0}")]
  Parquet(#[from] ::parquet::errors::ParquetError),

  /// The controller cancelled the job; partial output must be discarded.
  #[error("export cancelled")]
  Cancelled,

  /// Projected row count or serialized size exceeded the configured limit.
  #[error("export limit exceeded")]
  LimitExceeded,

  /// The project vanished (soft-deleted) between claim and snapshot.
  #[error("project missing")]
  ProjectMissing,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
