//! Error types for `triagedeck-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid decision schema: {0}")]
  InvalidSchema(String),

  #[error("unknown enum value: {0:?}")]
  UnknownValue(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
