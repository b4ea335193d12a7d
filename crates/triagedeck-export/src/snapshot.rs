//! Snapshot filtering and allow-listed field projection.
//!
//! The store hands the worker the full ordered row set buffered at claim
//! time; this module narrows it by the job's filters and projects each row
//! onto the `include_fields` list. Filters on decision attributes
//! (`decision_ids`, `user_ids`, `from_ts`/`to_ts`) exclude unlabeled rows,
//! which have no decision side to match; metadata equality applies to every
//! row.

use serde_json::Value;
use triagedeck_core::export::{ExportFilters, ExportRow};

// ─── Filtering ───────────────────────────────────────────────────────────────

fn matches(row: &ExportRow, filters: &ExportFilters) -> bool {
  if let Some(ids) = &filters.decision_ids {
    match &row.decision_id {
      Some(d) if ids.iter().any(|id| id == d) => {}
      _ => return false,
    }
  }
  if let Some(users) = &filters.user_ids {
    match &row.user_id {
      Some(u) if users.iter().any(|id| id == u) => {}
      _ => return false,
    }
  }
  if let Some(from) = filters.from_ts {
    match row.ts_server {
      Some(ts) if ts >= from => {}
      _ => return false,
    }
  }
  if let Some(to) = filters.to_ts {
    match row.ts_server {
      Some(ts) if ts <= to => {}
      _ => return false,
    }
  }
  if let Some(meta) = &filters.metadata {
    for (path, expected) in meta {
      match metadata_path(&row.metadata, path) {
        Some(actual) if actual == expected => {}
        _ => return false,
      }
    }
  }
  true
}

/// Keep only rows matching every filter, preserving the snapshot order.
pub fn apply_filters(
  rows: Vec<ExportRow>,
  filters: &ExportFilters,
) -> Vec<ExportRow> {
  rows.into_iter().filter(|r| matches(r, filters)).collect()
}

// ─── Projection ──────────────────────────────────────────────────────────────

/// Walk a dotted path inside a metadata document.
fn metadata_path<'a>(metadata: &'a Value, path: &str) -> Option<&'a Value> {
  let mut current = metadata;
  for segment in path.split('.') {
    current = current.as_object()?.get(segment)?;
  }
  Some(current)
}

/// The value of one projected field. Unknown fields and missing metadata
/// paths yield `Null`, which each serializer renders as its own null. Media
/// is referenced by logical URI only — no signed URL ever enters a dataset.
pub fn field_value(row: &ExportRow, field: &str) -> Value {
  fn opt_str(v: &Option<String>) -> Value {
    v.as_ref().map(|s| Value::from(s.clone())).unwrap_or(Value::Null)
  }
  fn opt_i64(v: Option<i64>) -> Value {
    v.map(Value::from).unwrap_or(Value::Null)
  }

  match field {
    "item_id" => Value::from(row.item_id.hyphenated().to_string()),
    "external_id" => Value::from(row.external_id.clone()),
    "uri" => Value::from(row.logical_uri.clone()),
    "user_id" => opt_str(&row.user_id),
    "event_id" => row
      .event_id
      .map(|e| Value::from(e.hyphenated().to_string()))
      .unwrap_or(Value::Null),
    "decision_id" => opt_str(&row.decision_id),
    "note" => opt_str(&row.note),
    "ts_client" => opt_i64(row.ts_client),
    "ts_client_effective" => opt_i64(row.ts_client_effective),
    "ts_server" => opt_i64(row.ts_server),
    "metadata" => row.metadata.clone(),
    other => match other.strip_prefix("metadata.") {
      Some(path) => {
        metadata_path(&row.metadata, path).cloned().unwrap_or(Value::Null)
      }
      None => Value::Null,
    },
  }
}
