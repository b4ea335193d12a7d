//! Opaque, HMAC-tagged pagination cursors.
//!
//! A cursor is `base64url(payload) . base64url(tag)` where the payload is a
//! compact JSON envelope `{v, iat, key}` and the tag is HMAC-SHA256 over the
//! payload bytes, keyed by a process-wide secret. Clients cannot forge
//! positions, and internal offsets never leak. A cursor decodes only for the
//! view it was issued for, and only within its TTL (7 days by default).

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD as B64};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Cursor schema version; bumped if the envelope layout ever changes.
const CURSOR_VERSION: u8 = 1;

/// Default cursor lifetime: 7 days.
pub const DEFAULT_TTL_MS: i64 = 7 * 24 * 60 * 60 * 1000;

// ─── Views & keys ────────────────────────────────────────────────────────────

/// The ordered views that support cursor pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
  Items,
  Decisions,
  Exports,
}

/// The last-seen key tuple for a view. Tagged so a decoded key can never be
/// replayed against a different view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "view", rename_all = "lowercase")]
pub enum CursorKey {
  /// Items page in `(sort_key ASC, item_id ASC)` order.
  Items { sort_key: String, item_id: Uuid },
  /// Decisions page in `(ts_server ASC, item_id ASC)` order.
  Decisions { ts_server: i64, item_id: Uuid },
  /// Exports page in `(created_at DESC, export_id DESC)` order.
  Exports { created_at: i64, export_id: Uuid },
}

impl CursorKey {
  pub fn view(&self) -> View {
    match self {
      Self::Items { .. } => View::Items,
      Self::Decisions { .. } => View::Decisions,
      Self::Exports { .. } => View::Exports,
    }
  }
}

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Both variants surface to clients as `400 invalid_cursor`; they are
/// distinguished for logging only.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CursorError {
  #[error("invalid cursor")]
  Invalid,
  #[error("expired cursor")]
  Expired,
}

// ─── Codec ───────────────────────────────────────────────────────────────────

#[derive(Serialize, Deserialize)]
struct Envelope {
  v:   u8,
  iat: i64,
  key: CursorKey,
}

/// Encoder/decoder bound to a process-wide secret.
#[derive(Clone)]
pub struct CursorCodec {
  mac:    HmacSha256,
  ttl_ms: i64,
}

impl CursorCodec {
  pub fn new(secret: &[u8], ttl_ms: i64) -> Self {
    // HMAC accepts keys of any length; new_from_slice cannot fail.
    let mac =
      HmacSha256::new_from_slice(secret).expect("hmac accepts any key length");
    Self { mac, ttl_ms }
  }

  /// Encode `key` as an opaque token issued at `now`.
  pub fn encode(&self, key: &CursorKey, now: i64) -> String {
    let envelope = Envelope {
      v: CURSOR_VERSION,
      iat: now,
      key: key.clone(),
    };
    // Envelope serialization cannot fail: all fields are JSON-safe.
    let payload = serde_json::to_vec(&envelope).unwrap_or_default();
    let mut mac = self.mac.clone();
    mac.update(&payload);
    let tag = mac.finalize().into_bytes();
    format!("{}.{}", B64.encode(&payload), B64.encode(tag))
  }

  /// Decode a token for `view`, verifying the tag, schema version, view
  /// binding, and TTL. Every malformation maps to [`CursorError::Invalid`].
  pub fn decode(
    &self,
    view: View,
    token: &str,
    now: i64,
  ) -> Result<CursorKey, CursorError> {
    let (payload_b64, tag_b64) =
      token.split_once('.').ok_or(CursorError::Invalid)?;
    let payload =
      B64.decode(payload_b64).map_err(|_| CursorError::Invalid)?;
    let tag = B64.decode(tag_b64).map_err(|_| CursorError::Invalid)?;

    let mut mac = self.mac.clone();
    mac.update(&payload);
    mac.verify_slice(&tag).map_err(|_| CursorError::Invalid)?;

    let envelope: Envelope =
      serde_json::from_slice(&payload).map_err(|_| CursorError::Invalid)?;
    if envelope.v != CURSOR_VERSION || envelope.key.view() != view {
      return Err(CursorError::Invalid);
    }
    if now.saturating_sub(envelope.iat) > self.ttl_ms {
      return Err(CursorError::Expired);
    }
    Ok(envelope.key)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn codec() -> CursorCodec {
    CursorCodec::new(b"test-secret", DEFAULT_TTL_MS)
  }

  fn items_key() -> CursorKey {
    CursorKey::Items {
      sort_key: "00000042".into(),
      item_id:  Uuid::new_v4(),
    }
  }

  #[test]
  fn round_trip_per_view() {
    let c = codec();
    let now = 1_700_000_000_000;
    let keys = [
      items_key(),
      CursorKey::Decisions {
        ts_server: 12345,
        item_id:   Uuid::new_v4(),
      },
      CursorKey::Exports {
        created_at: 67890,
        export_id:  Uuid::new_v4(),
      },
    ];
    for key in keys {
      let token = c.encode(&key, now);
      let decoded = c.decode(key.view(), &token, now + 1000).unwrap();
      assert_eq!(decoded, key);
    }
  }

  #[test]
  fn wrong_view_is_invalid() {
    let c = codec();
    let token = c.encode(&items_key(), 0);
    assert_eq!(
      c.decode(View::Decisions, &token, 0),
      Err(CursorError::Invalid)
    );
  }

  #[test]
  fn tampered_payload_is_invalid() {
    let c = codec();
    let token = c.encode(&items_key(), 0);
    let (payload, tag) = token.split_once('.').unwrap();
    let mut bytes = B64.decode(payload).unwrap();
    bytes[10] ^= 0x01;
    let forged = format!("{}.{tag}", B64.encode(&bytes));
    assert_eq!(c.decode(View::Items, &forged, 0), Err(CursorError::Invalid));
  }

  #[test]
  fn wrong_secret_is_invalid() {
    let a = CursorCodec::new(b"secret-a", DEFAULT_TTL_MS);
    let b = CursorCodec::new(b"secret-b", DEFAULT_TTL_MS);
    let token = a.encode(&items_key(), 0);
    assert_eq!(b.decode(View::Items, &token, 0), Err(CursorError::Invalid));
  }

  #[test]
  fn garbage_tokens_are_invalid() {
    let c = codec();
    for junk in ["", ".", "not-a-cursor", "a.b", "!!!.???"] {
      assert_eq!(c.decode(View::Items, junk, 0), Err(CursorError::Invalid));
    }
  }

  #[test]
  fn truncated_token_is_invalid() {
    let c = codec();
    let token = c.encode(&items_key(), 0);
    let truncated = &token[..token.len() / 2];
    assert_eq!(c.decode(View::Items, truncated, 0), Err(CursorError::Invalid));
  }

  #[test]
  fn eight_day_old_cursor_is_expired() {
    let c = codec();
    let issued = 1_700_000_000_000;
    let token = c.encode(&items_key(), issued);
    let eight_days = 8 * 24 * 60 * 60 * 1000;
    assert_eq!(
      c.decode(View::Items, &token, issued + eight_days),
      Err(CursorError::Expired)
    );
  }

  #[test]
  fn cursor_at_exact_ttl_still_valid() {
    let c = codec();
    let issued = 1_700_000_000_000;
    let token = c.encode(&items_key(), issued);
    assert!(c.decode(View::Items, &token, issued + DEFAULT_TTL_MS).is_ok());
  }
}
