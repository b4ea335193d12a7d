//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Every error crosses the boundary in the same envelope:
//! `{"error": {"code", "message", "details"}}`. `code` is a stable machine
//! token; `message` is for humans; `details` carries field paths when
//! relevant. No internal stack traces or store errors leak through.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use triagedeck_core::cursor::CursorError;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("authentication required")]
  Unauthorized,

  #[error("permission denied")]
  Forbidden,

  #[error("resource not found")]
  NotFound,

  #[error("{message}")]
  BadRequest {
    code:    &'static str,
    message: String,
  },

  #[error("{message}")]
  Validation {
    code:    &'static str,
    message: String,
    details: Option<serde_json::Value>,
  },

  #[error("{message}")]
  Conflict {
    code:    &'static str,
    message: String,
  },

  #[error("{message}")]
  Gone {
    code:    &'static str,
    message: String,
  },

  #[error("{message}")]
  RateLimited { message: String },

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  /// Wrap a store-layer error.
  pub fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }

  fn status(&self) -> StatusCode {
    match self {
      Self::Unauthorized => StatusCode::UNAUTHORIZED,
      Self::Forbidden => StatusCode::FORBIDDEN,
      Self::NotFound => StatusCode::NOT_FOUND,
      Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
      Self::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
      Self::Conflict { .. } => StatusCode::CONFLICT,
      Self::Gone { .. } => StatusCode::GONE,
      Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
      Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  fn code(&self) -> &'static str {
    match self {
      Self::Unauthorized => "unauthorized",
      Self::Forbidden => "forbidden",
      Self::NotFound => "not_found",
      Self::BadRequest { code, .. }
      | Self::Validation { code, .. }
      | Self::Conflict { code, .. }
      | Self::Gone { code, .. } => code,
      Self::RateLimited { .. } => "rate_limited",
      Self::Store(_) => "internal_error",
    }
  }
}

impl From<CursorError> for ApiError {
  fn from(_: CursorError) -> Self {
    // Invalid and expired cursors are indistinguishable to clients.
    Self::BadRequest {
      code:    "invalid_cursor",
      message: "Cursor is invalid or expired".to_string(),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    let message = match &self {
      // Never echo store internals to the client.
      Self::Store(e) => {
        tracing::error!(error = %e, "internal store error");
        "Internal error".to_string()
      }
      other => other.to_string(),
    };
    let details = match &self {
      Self::Validation {
        details: Some(d), ..
      } => d.clone(),
      _ => json!({}),
    };
    let body = json!({
      "error": {
        "code": self.code(),
        "message": message,
        "details": details,
      }
    });
    (status, Json(body)).into_response()
  }
}
