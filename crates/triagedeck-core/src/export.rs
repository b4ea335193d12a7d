//! Export jobs, filters, field allowlisting, and the snapshot row shape.
//!
//! An export job moves `queued → running → (ready | failed | expired)`.
//! Cancellation maps to `failed` with [`ERROR_CANCELLED`]. Ownership of
//! transitions is split: the worker performs `running → ready|failed`, the
//! sweeper performs `ready → expired`, and the controller performs
//! `queued|running → failed` on cancel.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Error code recorded when a job is cancelled by the controller.
pub const ERROR_CANCELLED: &str = "export_cancelled";
/// Error code recorded when the row or byte limit is exceeded.
pub const ERROR_LIMIT_EXCEEDED: &str = "export_limit_exceeded";
/// Coarse error code for anything else that fails a running job.
pub const ERROR_FAILED: &str = "export_failed";

// ─── Enums ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportStatus {
  Queued,
  Running,
  Ready,
  Failed,
  Expired,
}

impl ExportStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Queued => "queued",
      Self::Running => "running",
      Self::Ready => "ready",
      Self::Failed => "failed",
      Self::Expired => "expired",
    }
  }

  pub fn is_terminal(&self) -> bool {
    matches!(self, Self::Ready | Self::Failed | Self::Expired)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
  Jsonl,
  Csv,
  Parquet,
}

impl ExportFormat {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Jsonl => "jsonl",
      Self::Csv => "csv",
      Self::Parquet => "parquet",
    }
  }

  /// File extension of the dataset artifact.
  pub fn ext(&self) -> &'static str { self.as_str() }
}

impl Default for ExportFormat {
  fn default() -> Self { Self::Jsonl }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportMode {
  LabelsOnly,
  LabelsPlusUnlabeled,
}

impl Default for ExportMode {
  fn default() -> Self { Self::LabelsOnly }
}

/// How labels are selected for the dataset. Single-valued today, but a
/// schema-level enum so new policies are additive rather than breaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelPolicy {
  LatestPerUser,
}

impl Default for LabelPolicy {
  fn default() -> Self { Self::LatestPerUser }
}

// ─── Filters ─────────────────────────────────────────────────────────────────

/// Snapshot row filters. `metadata` is equality-over-values on dotted paths;
/// richer predicates are out of scope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportFilters {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub decision_ids: Option<Vec<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub from_ts:      Option<i64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub to_ts:        Option<i64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub user_ids:     Option<Vec<String>>,
  /// Dotted metadata path → required value, e.g. `"subject_id": "s-3"`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub metadata:     Option<BTreeMap<String, serde_json::Value>>,
}

// ─── Job ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportJob {
  pub export_id:      Uuid,
  pub project_id:     Uuid,
  pub requested_by:   String,
  pub status:         ExportStatus,
  pub mode:           ExportMode,
  pub label_policy:   LabelPolicy,
  pub format:         ExportFormat,
  pub filters:        ExportFilters,
  pub include_fields: Vec<String>,
  pub manifest:       Option<serde_json::Value>,
  pub file_uri:       Option<String>,
  pub error_code:     Option<String>,
  pub expires_at:     Option<i64>,
  pub created_at:     i64,
  pub completed_at:   Option<i64>,
}

// ─── Snapshot rows ───────────────────────────────────────────────────────────

/// One row of an export snapshot: a latest decision joined with its item, or
/// (under `labels_plus_unlabeled`) a bare item with the decision side `None`.
#[derive(Debug, Clone)]
pub struct ExportRow {
  pub item_id:             Uuid,
  pub external_id:         String,
  pub logical_uri:         String,
  pub metadata:            serde_json::Value,
  pub user_id:             Option<String>,
  pub event_id:            Option<Uuid>,
  pub decision_id:         Option<String>,
  pub note:                Option<String>,
  pub ts_client:           Option<i64>,
  pub ts_client_effective: Option<i64>,
  pub ts_server:           Option<i64>,
}

// ─── Allowlist & naming ──────────────────────────────────────────────────────

/// Check every requested field against the effective allowlist, returning the
/// first offending field. Dotted `metadata.*` paths are allowlisted verbatim.
pub fn check_allowlist<'a>(
  include_fields: &'a [String],
  allowlist: &[String],
) -> Result<(), &'a str> {
  for field in include_fields {
    if !allowlist.iter().any(|allowed| allowed == field) {
      return Err(field.as_str());
    }
  }
  Ok(())
}

/// Canonical dataset artifact name.
pub fn dataset_name(
  project_id: Uuid,
  snapshot_at: i64,
  format: ExportFormat,
) -> String {
  format!(
    "triagedeck_export_{}_{snapshot_at}.{}",
    project_id.hyphenated(),
    format.ext()
  )
}

/// Manifest sidecar name for a dataset artifact.
pub fn manifest_name(dataset: &str) -> String {
  let stem = dataset.rsplit_once('.').map(|(s, _)| s).unwrap_or(dataset);
  format!("{stem}_manifest.json")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn allowlist_accepts_listed_fields() {
    let allow =
      vec!["item_id".to_string(), "metadata.subject_id".to_string()];
    let fields =
      vec!["item_id".to_string(), "metadata.subject_id".to_string()];
    assert!(check_allowlist(&fields, &allow).is_ok());
  }

  #[test]
  fn allowlist_rejects_first_unlisted_field() {
    let allow = vec!["metadata.subject_id".to_string()];
    let fields = vec!["metadata.subject_id".to_string(), "ssn".to_string()];
    assert_eq!(check_allowlist(&fields, &allow), Err("ssn"));
  }

  #[test]
  fn artifact_names_are_stable() {
    let pid = Uuid::nil();
    let ds = dataset_name(pid, 1700000000000, ExportFormat::Csv);
    assert_eq!(
      ds,
      "triagedeck_export_00000000-0000-0000-0000-000000000000_1700000000000.csv"
    );
    assert_eq!(
      manifest_name(&ds),
      "triagedeck_export_00000000-0000-0000-0000-000000000000_1700000000000_manifest.json"
    );
  }

  #[test]
  fn status_terminality() {
    assert!(!ExportStatus::Queued.is_terminal());
    assert!(!ExportStatus::Running.is_terminal());
    assert!(ExportStatus::Ready.is_terminal());
    assert!(ExportStatus::Failed.is_terminal());
    assert!(ExportStatus::Expired.is_terminal());
  }
}
