//! The storage-resolver contract: logical media URIs to browser-usable URLs.
//!
//! Logical URIs are what the store persists and what exports reference; a
//! resolver derives a short-lived URL from one at read time. The contract
//! forbids long-lived credentials in any response field — a resolver either
//! passes public URIs through unchanged or signs them with an expiry.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Lower bound on signed-URL TTL: 5 minutes.
pub const MIN_TTL_MS: i64 = 5 * 60 * 1000;
/// Upper bound on signed-URL TTL: 60 minutes.
pub const MAX_TTL_MS: i64 = 60 * 60 * 1000;
/// Default signed-URL TTL: 15 minutes.
pub const DEFAULT_TTL_MS: i64 = 15 * 60 * 1000;

/// Clamp a configured TTL into the permitted 5–60 minute band.
pub fn clamp_ttl_ms(ttl_ms: i64) -> i64 { ttl_ms.clamp(MIN_TTL_MS, MAX_TTL_MS) }

/// A browser-usable URL with its expiry (epoch ms).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedUrl {
  pub url:        String,
  pub expires_at: i64,
}

/// Translate a logical URI into a short-lived browser-usable URL.
///
/// Resolution is pure computation (presigning needs no I/O); implementations
/// that must call out to a storage API should do so behind their own cache.
pub trait StorageResolver: Send + Sync {
  fn resolve(&self, logical_uri: &str, ttl_ms: i64, now: i64) -> ResolvedUrl;
}

// ─── Public passthrough ──────────────────────────────────────────────────────

/// Identity resolver for public (or dev-served) media. The URL is the logical
/// URI itself; `expires_at` is still populated so clients refresh uniformly.
#[derive(Debug, Clone, Default)]
pub struct PublicResolver;

impl StorageResolver for PublicResolver {
  fn resolve(&self, logical_uri: &str, ttl_ms: i64, now: i64) -> ResolvedUrl {
    ResolvedUrl {
      url:        logical_uri.to_string(),
      expires_at: now + clamp_ttl_ms(ttl_ms),
    }
  }
}

// ─── HMAC-signed URLs ────────────────────────────────────────────────────────

/// Resolver for private storage fronted by a media gateway that verifies
/// `exp`/`sig` query parameters. The signing key never appears in the URL.
#[derive(Clone)]
pub struct SignedResolver {
  mac:      HmacSha256,
  base_url: String,
}

impl SignedResolver {
  pub fn new(secret: &[u8], base_url: impl Into<String>) -> Self {
    // HMAC accepts keys of any length; new_from_slice cannot fail.
    let mac =
      HmacSha256::new_from_slice(secret).expect("hmac accepts any key length");
    Self {
      mac,
      base_url: base_url.into(),
    }
  }

  fn sign(&self, logical_uri: &str, expires_at: i64) -> String {
    let mut mac = self.mac.clone();
    mac.update(logical_uri.as_bytes());
    mac.update(b"|");
    mac.update(expires_at.to_string().as_bytes());
    hex::encode(mac.finalize().into_bytes())
  }

  /// Verify a signature produced by [`SignedResolver::resolve`]; used by the
  /// gateway side and by tests.
  pub fn verify(&self, logical_uri: &str, expires_at: i64, sig: &str) -> bool {
    let mut mac = self.mac.clone();
    mac.update(logical_uri.as_bytes());
    mac.update(b"|");
    mac.update(expires_at.to_string().as_bytes());
    match hex::decode(sig) {
      Ok(raw) => mac.verify_slice(&raw).is_ok(),
      Err(_) => false,
    }
  }
}

impl StorageResolver for SignedResolver {
  fn resolve(&self, logical_uri: &str, ttl_ms: i64, now: i64) -> ResolvedUrl {
    let expires_at = now + clamp_ttl_ms(ttl_ms);
    let sig = self.sign(logical_uri, expires_at);
    ResolvedUrl {
      url: format!(
        "{}{logical_uri}?exp={expires_at}&sig={sig}",
        self.base_url
      ),
      expires_at,
    }
  }
}
