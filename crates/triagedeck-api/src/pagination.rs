//! Shared pagination plumbing: limit clamping and cursor decoding.

use serde::Deserialize;
use triagedeck_core::cursor::{CursorCodec, CursorKey, View};

use crate::error::ApiError;

/// Items: default 100, max 200.
pub const ITEMS_DEFAULT: usize = 100;
pub const ITEMS_MAX: usize = 200;
/// Decisions: default 500, max 2000.
pub const DECISIONS_DEFAULT: usize = 500;
pub const DECISIONS_MAX: usize = 2000;
/// Exports: default 50, max 100.
pub const EXPORTS_DEFAULT: usize = 50;
pub const EXPORTS_MAX: usize = 100;

/// Query parameters accepted by every paged endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
  pub cursor: Option<String>,
  pub limit:  Option<usize>,
}

/// Clamp a requested limit into `[1, max]`, defaulting when absent.
pub fn clamp_limit(requested: Option<usize>, default: usize, max: usize) -> usize {
  requested.unwrap_or(default).clamp(1, max)
}

/// Decode an optional cursor for `view`; absent cursors mean "first page".
pub fn decode_cursor(
  codec: &CursorCodec,
  view: View,
  cursor: Option<&str>,
  now: i64,
) -> Result<Option<CursorKey>, ApiError> {
  match cursor {
    None => Ok(None),
    Some(token) => Ok(Some(codec.decode(view, token, now)?)),
  }
}
