//! Export manifest assembly and content hashing.
//!
//! The manifest is serialized with alphabetically sorted keys so it, too,
//! hashes stably: it is converted to a `serde_json::Value` first, and the
//! default map representation orders keys.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use triagedeck_core::export::{ExportFilters, ExportFormat, LabelPolicy};
use uuid::Uuid;

/// `manifest.json` contents for a ready export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportManifest {
  pub decision_schema_version: u32,
  pub filters:                 ExportFilters,
  pub format:                  ExportFormat,
  pub include_fields:          Vec<String>,
  pub label_policy:            LabelPolicy,
  pub project_id:              Uuid,
  pub row_count:               u64,
  pub sha256:                  String,
  pub snapshot_at:             i64,
}

impl ExportManifest {
  /// Pretty-printed JSON with sorted keys at every level.
  pub fn to_canonical_json(&self) -> Result<Vec<u8>, serde_json::Error> {
    let value = serde_json::to_value(self)?;
    serde_json::to_vec_pretty(&value)
  }
}

/// Hex SHA-256 of a byte stream already held in memory.
pub fn sha256_hex(bytes: &[u8]) -> String {
  let mut hasher = Sha256::new();
  hasher.update(bytes);
  hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn manifest() -> ExportManifest {
    ExportManifest {
      decision_schema_version: 1,
      filters:                 ExportFilters::default(),
      format:                  ExportFormat::Jsonl,
      include_fields:          vec!["item_id".into(), "decision_id".into()],
      label_policy:            LabelPolicy::LatestPerUser,
      project_id:              Uuid::nil(),
      row_count:               3,
      sha256:                  "ab".repeat(32),
      snapshot_at:             1_700_000_000_000,
    }
  }

  #[test]
  fn keys_are_sorted_alphabetically() {
    let json = String::from_utf8(manifest().to_canonical_json().unwrap())
      .unwrap();
    let positions: Vec<usize> = [
      "\"decision_schema_version\"",
      "\"filters\"",
      "\"format\"",
      "\"include_fields\"",
      "\"label_policy\"",
      "\"project_id\"",
      "\"row_count\"",
      "\"sha256\"",
      "\"snapshot_at\"",
    ]
    .iter()
    .map(|k| json.find(k).expect("key present"))
    .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
  }

  #[test]
  fn canonical_json_is_deterministic() {
    let a = manifest().to_canonical_json().unwrap();
    let b = manifest().to_canonical_json().unwrap();
    assert_eq!(a, b);
  }

  #[test]
  fn sha256_matches_known_vector() {
    // SHA-256 of the empty string.
    assert_eq!(
      sha256_hex(b""),
      "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
  }
}
