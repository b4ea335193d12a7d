//! Project, decision schema, and per-project configuration.
//!
//! The decision schema is a versioned, dynamic document: old events stay
//! renderable under the schema version that was active when they were
//! recorded, so the schema is validated but never rewritten in place —
//! `version` increases monotonically on every change.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, item::MediaType};

// ─── Decision schema ─────────────────────────────────────────────────────────

/// One selectable choice in a project's decision schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
  pub id:     String,
  pub label:  String,
  /// Single-key binding the client may offer, e.g. `"p"`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub hotkey: Option<String>,
}

/// The set of decisions reviewers may record, plus the note policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionSchema {
  pub version:     u32,
  pub choices:     Vec<Choice>,
  #[serde(default)]
  pub allow_notes: bool,
}

/// Maximum length of a choice `id` and `label`.
const MAX_CHOICE_ID_LEN: usize = 64;
const MAX_CHOICE_LABEL_LEN: usize = 64;

fn valid_choice_id(id: &str) -> bool {
  !id.is_empty()
    && id.len() <= MAX_CHOICE_ID_LEN
    && id
      .bytes()
      .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
}

impl DecisionSchema {
  /// Check structural validity: non-empty choices, ids matching
  /// `^[A-Za-z0-9._-]{1,64}$` and unique, labels at most 64 characters.
  pub fn validate(&self) -> Result<()> {
    if self.version == 0 {
      return Err(Error::InvalidSchema("version must be >= 1".into()));
    }
    if self.choices.is_empty() {
      return Err(Error::InvalidSchema("choices must not be empty".into()));
    }
    let mut seen = std::collections::HashSet::new();
    for choice in &self.choices {
      if !valid_choice_id(&choice.id) {
        return Err(Error::InvalidSchema(format!(
          "invalid choice id: {:?}",
          choice.id
        )));
      }
      if choice.label.chars().count() > MAX_CHOICE_LABEL_LEN {
        return Err(Error::InvalidSchema(format!(
          "label too long for choice {:?}",
          choice.id
        )));
      }
      if !seen.insert(choice.id.as_str()) {
        return Err(Error::InvalidSchema(format!(
          "duplicate choice id: {:?}",
          choice.id
        )));
      }
    }
    Ok(())
  }

  /// Whether `decision_id` names a choice in this schema.
  pub fn has_choice(&self, decision_id: &str) -> bool {
    self.choices.iter().any(|c| c.id == decision_id)
  }
}

// ─── Project configuration ───────────────────────────────────────────────────

/// How the client is expected to navigate between variants of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantNavigationMode {
  Horizontal,
  Vertical,
  Both,
}

fn default_media_types() -> Vec<MediaType> { vec![MediaType::Image] }
fn default_navigation_mode() -> VariantNavigationMode {
  VariantNavigationMode::Horizontal
}
fn default_max_compare_variants() -> u8 { 2 }

/// Per-project configuration stored as a schema-validated document.
///
/// `export_allowlist` is the project-level override for which field paths an
/// export may include; when `None`, the server-global allowlist applies. The
/// two `*_enabled` policy flags realise the policy-driven parts of the role
/// matrix — they are configuration, never hardcoded branches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
  #[serde(default = "default_media_types")]
  pub media_types_supported: Vec<MediaType>,
  #[serde(default)]
  pub variants_enabled: bool,
  #[serde(default = "default_navigation_mode")]
  pub variant_navigation_mode: VariantNavigationMode,
  #[serde(default)]
  pub compare_mode_enabled: bool,
  #[serde(default = "default_max_compare_variants")]
  pub max_compare_variants: u8,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub export_allowlist: Option<Vec<String>>,
  #[serde(default)]
  pub viewer_exports_enabled: bool,
  #[serde(default)]
  pub reviewer_reads_others_exports: bool,
}

impl Default for ProjectConfig {
  fn default() -> Self {
    Self {
      media_types_supported:         default_media_types(),
      variants_enabled:              false,
      variant_navigation_mode:       default_navigation_mode(),
      compare_mode_enabled:          false,
      max_compare_variants:          default_max_compare_variants(),
      export_allowlist:              None,
      viewer_exports_enabled:        false,
      reviewer_reads_others_exports: false,
    }
  }
}

// ─── Project ─────────────────────────────────────────────────────────────────

/// A review project. Soft-deleted by setting `deleted_at`; soft-deleted
/// projects are excluded from every default read path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
  pub project_id:      Uuid,
  pub organization_id: Uuid,
  pub name:            String,
  pub slug:            String,
  pub decision_schema: DecisionSchema,
  pub config:          ProjectConfig,
  pub created_at:      i64,
  pub deleted_at:      Option<i64>,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn schema(choices: &[(&str, &str)]) -> DecisionSchema {
    DecisionSchema {
      version:     1,
      choices:     choices
        .iter()
        .map(|(id, label)| Choice {
          id:     (*id).into(),
          label:  (*label).into(),
          hotkey: None,
        })
        .collect(),
      allow_notes: true,
    }
  }

  #[test]
  fn valid_schema_passes() {
    let s = schema(&[("pass", "PASS"), ("fail", "FAIL"), ("skip.v2", "Skip")]);
    assert!(s.validate().is_ok());
    assert!(s.has_choice("pass"));
    assert!(!s.has_choice("maybe"));
  }

  #[test]
  fn duplicate_choice_id_rejected() {
    let s = schema(&[("pass", "PASS"), ("pass", "Also pass")]);
    assert!(s.validate().is_err());
  }

  #[test]
  fn invalid_choice_id_characters_rejected() {
    let s = schema(&[("not ok", "Not OK")]);
    assert!(s.validate().is_err());
    let s = schema(&[("", "Empty")]);
    assert!(s.validate().is_err());
  }

  #[test]
  fn overlong_choice_id_rejected() {
    let long = "x".repeat(65);
    let s = schema(&[(long.as_str(), "Long")]);
    assert!(s.validate().is_err());
  }

  #[test]
  fn zero_version_rejected() {
    let mut s = schema(&[("pass", "PASS")]);
    s.version = 0;
    assert!(s.validate().is_err());
  }

  #[test]
  fn config_defaults_from_empty_document() {
    let cfg: ProjectConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(cfg.max_compare_variants, 2);
    assert!(!cfg.variants_enabled);
    assert!(cfg.export_allowlist.is_none());
    assert!(!cfg.viewer_exports_enabled);
  }
}
