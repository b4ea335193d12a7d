//! Decision events and the latest-decision projection.
//!
//! A decision event is an immutable record of one reviewer choice on one item
//! at a point in time. Events are append-only; the mutable-looking
//! "latest decision" per `(project, user, item)` is a recomputable projection
//! over them, maintained under a strict total order so that ingestion is
//! commutative — any permutation of the same event set converges to the same
//! projection.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::project::DecisionSchema;

/// Maximum note length in characters.
pub const MAX_NOTE_LEN: usize = 2000;

// ─── Events ──────────────────────────────────────────────────────────────────

/// A validated, clamped event ready for the store. All timestamp fields are
/// epoch milliseconds; `ts_client_effective` is `ts_client` clamped into the
/// skew window, and is what winner ordering uses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionEvent {
  /// Server-assigned row id, distinct from the client's `event_id`.
  pub id:                  Uuid,
  pub project_id:          Uuid,
  pub user_id:             String,
  /// Client-generated idempotency id, unique per `(project, user)`.
  pub event_id:            Uuid,
  pub item_id:             Uuid,
  pub decision_id:         String,
  pub note:                String,
  pub ts_client:           i64,
  pub ts_client_effective: i64,
  pub ts_server:           i64,
}

/// The winning event per `(project, user, item)`. Field-for-field a copy of
/// its source event; invariant I5 requires them to match bit-for-bit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionLatest {
  pub project_id:          Uuid,
  pub user_id:             String,
  pub item_id:             Uuid,
  pub event_id:            Uuid,
  pub decision_id:         String,
  pub note:                String,
  pub ts_client:           i64,
  pub ts_client_effective: i64,
  pub ts_server:           i64,
}

// ─── Winner ordering ─────────────────────────────────────────────────────────

/// The total-order key for winner selection: higher wins.
///
/// Ties on `ts_client_effective` fall through to `ts_server`, then to the
/// `event_id` bytes. Canonical lowercase-hyphenated UUID strings compare the
/// same way their bytes do, so this matches the store's lexicographic
/// comparison on encoded ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RankKey {
  pub ts_client_effective: i64,
  pub ts_server:           i64,
  pub event_id:            Uuid,
}

impl DecisionEvent {
  pub fn rank(&self) -> RankKey {
    RankKey {
      ts_client_effective: self.ts_client_effective,
      ts_server:           self.ts_server,
      event_id:            self.event_id,
    }
  }
}

impl DecisionLatest {
  pub fn rank(&self) -> RankKey {
    RankKey {
      ts_client_effective: self.ts_client_effective,
      ts_server:           self.ts_server,
      event_id:            self.event_id,
    }
  }

  pub fn from_event(event: &DecisionEvent) -> Self {
    Self {
      project_id:          event.project_id,
      user_id:             event.user_id.clone(),
      item_id:             event.item_id,
      event_id:            event.event_id,
      decision_id:         event.decision_id.clone(),
      note:                event.note.clone(),
      ts_client:           event.ts_client,
      ts_client_effective: event.ts_client_effective,
      ts_server:           event.ts_server,
    }
  }
}

// ─── Per-event dispositions ──────────────────────────────────────────────────

/// Why an event in a batch was rejected. Rejections are per-event and never
/// roll back batch peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
  InvalidEventId,
  InvalidItemId,
  InvalidDecisionId,
  InvalidNote,
  UnknownItem,
}

impl RejectReason {
  /// Stable machine token surfaced in per-event results.
  pub fn code(&self) -> &'static str {
    match self {
      Self::InvalidEventId => "invalid_event_id",
      Self::InvalidItemId => "invalid_item_id",
      Self::InvalidDecisionId => "invalid_decision_id",
      Self::InvalidNote => "invalid_note",
      Self::UnknownItem => "unknown_item",
    }
  }
}

/// Validate the schema-level fields of an event against the project's active
/// decision schema. Scope (item membership) and idempotency are checked by
/// the store.
pub fn validate_event(
  schema: &DecisionSchema,
  decision_id: &str,
  note: &str,
) -> Result<(), RejectReason> {
  if !schema.has_choice(decision_id) {
    return Err(RejectReason::InvalidDecisionId);
  }
  if note.chars().count() > MAX_NOTE_LEN {
    return Err(RejectReason::InvalidNote);
  }
  if !schema.allow_notes && !note.trim().is_empty() {
    return Err(RejectReason::InvalidNote);
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::project::Choice;

  fn schema(allow_notes: bool) -> DecisionSchema {
    DecisionSchema {
      version: 1,
      choices: vec![
        Choice {
          id:     "pass".into(),
          label:  "PASS".into(),
          hotkey: Some("p".into()),
        },
        Choice {
          id:     "fail".into(),
          label:  "FAIL".into(),
          hotkey: Some("f".into()),
        },
      ],
      allow_notes,
    }
  }

  fn event(tce: i64, tss: i64, event_id: Uuid) -> DecisionEvent {
    DecisionEvent {
      id:                  Uuid::new_v4(),
      project_id:          Uuid::nil(),
      user_id:             "u".into(),
      event_id,
      item_id:             Uuid::nil(),
      decision_id:         "pass".into(),
      note:                String::new(),
      ts_client:           tce,
      ts_client_effective: tce,
      ts_server:           tss,
    }
  }

  // ── Total order ───────────────────────────────────────────────────────────

  #[test]
  fn higher_effective_client_time_wins() {
    let a = event(100, 5, Uuid::new_v4());
    let b = event(90, 10, Uuid::new_v4());
    assert!(a.rank() > b.rank());
  }

  #[test]
  fn server_time_breaks_client_tie() {
    let a = event(100, 10, Uuid::new_v4());
    let b = event(100, 5, Uuid::new_v4());
    assert!(a.rank() > b.rank());
  }

  #[test]
  fn event_id_breaks_full_tie() {
    let low = Uuid::parse_str("00000000-0000-4000-8000-000000000001").unwrap();
    let high = Uuid::parse_str("ffffffff-0000-4000-8000-000000000001").unwrap();
    let a = event(100, 10, high);
    let b = event(100, 10, low);
    assert!(a.rank() > b.rank());
  }

  #[test]
  fn order_is_strict_and_total() {
    // Distinct event_ids guarantee no two keys compare equal.
    let a = event(100, 10, Uuid::new_v4());
    let b = event(100, 10, Uuid::new_v4());
    assert_ne!(a.rank().cmp(&b.rank()), std::cmp::Ordering::Equal);
    assert_eq!(a.rank().cmp(&b.rank()), b.rank().cmp(&a.rank()).reverse());
  }

  #[test]
  fn uuid_ord_matches_lexicographic_string_ord() {
    // The store compares hyphenated lowercase strings; they must agree with
    // `Uuid: Ord` for the tie-break to be consistent across layers.
    let mut ids: Vec<Uuid> = (0..64).map(|_| Uuid::new_v4()).collect();
    let mut strings: Vec<String> =
      ids.iter().map(|u| u.hyphenated().to_string()).collect();
    ids.sort();
    strings.sort();
    let restrung: Vec<String> =
      ids.iter().map(|u| u.hyphenated().to_string()).collect();
    assert_eq!(strings, restrung);
  }

  // ── Validation ────────────────────────────────────────────────────────────

  #[test]
  fn unknown_decision_id_rejected() {
    let err = validate_event(&schema(true), "maybe", "").unwrap_err();
    assert_eq!(err, RejectReason::InvalidDecisionId);
  }

  #[test]
  fn overlong_note_rejected() {
    let note = "x".repeat(MAX_NOTE_LEN + 1);
    let err = validate_event(&schema(true), "pass", &note).unwrap_err();
    assert_eq!(err, RejectReason::InvalidNote);
  }

  #[test]
  fn max_length_note_accepted() {
    let note = "x".repeat(MAX_NOTE_LEN);
    assert!(validate_event(&schema(true), "pass", &note).is_ok());
  }

  #[test]
  fn note_rejected_when_notes_disabled() {
    let err = validate_event(&schema(false), "pass", "a note").unwrap_err();
    assert_eq!(err, RejectReason::InvalidNote);
  }

  #[test]
  fn whitespace_note_allowed_when_notes_disabled() {
    assert!(validate_event(&schema(false), "pass", "  ").is_ok());
  }
}
