//! Handler for `POST /projects/{pid}/events` — idempotent batch ingestion.
//!
//! Per event, in input order: schema validation (ids are UUIDs, the decision
//! id names an active-schema choice, the note respects length and the
//! `allow_notes` gate), scope validation (the item exists in this project),
//! skew clamping, then the store's atomic apply. The endpoint is
//! partial-success: a rejected event never rolls back its batch peers, and a
//! duplicate idempotency key is a normal outcome, not an error. One server
//! timestamp is sampled per request and shared by every accepted event; the
//! event-id tie-break keeps winner selection deterministic under that tie.

use axum::{
  Json,
  extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use triagedeck_core::{
  clock::now_ms,
  decision::{DecisionEvent, RejectReason, validate_event},
  store::{ApplyResult, DeckStore},
};
use uuid::Uuid;

use crate::{
  AppState,
  error::ApiError,
  identity::{Caller, role_or_404},
  rate_limit::LimitClass,
};

/// Maximum events accepted in one request.
pub const MAX_BATCH: usize = 200;

// ─── Request / response bodies ────────────────────────────────────────────────

/// One event as submitted by the client. Ids arrive as raw strings so a
/// malformed id rejects that event alone instead of failing the whole batch.
#[derive(Debug, Deserialize)]
pub struct EventIn {
  pub event_id:    String,
  pub item_id:     String,
  pub decision_id: String,
  #[serde(default)]
  pub note:        String,
  pub ts_client:   i64,
}

#[derive(Debug, Deserialize)]
pub struct IngestBody {
  /// Opaque; echoed back, never persisted as an identifier.
  pub client_id:  String,
  /// Opaque; echoed back, never persisted as an identifier.
  pub session_id: String,
  #[serde(default)]
  pub events:     Vec<EventIn>,
}

#[derive(Debug, Serialize)]
struct EventResult {
  event_id: String,
  status:   &'static str,
  #[serde(skip_serializing_if = "Option::is_none")]
  error_code: Option<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
  acked:      usize,
  accepted:   usize,
  duplicate:  usize,
  rejected:   usize,
  server_ts:  i64,
  client_id:  String,
  session_id: String,
  results:    Vec<EventResult>,
}

// ─── Handler ──────────────────────────────────────────────────────────────────

/// `POST /api/v1/projects/{pid}/events`
pub async fn ingest<S>(
  State(state): State<AppState<S>>,
  caller: Caller,
  Path(project_id): Path<Uuid>,
  Json(body): Json<IngestBody>,
) -> Result<Json<IngestResponse>, ApiError>
where
  S: DeckStore + 'static,
{
  let role = role_or_404(&state, project_id, &caller.user_id).await?;
  if !role.can_write_events() {
    return Err(ApiError::Forbidden);
  }
  state.check_rate(&caller, LimitClass::Write)?;

  if body.events.len() > MAX_BATCH {
    return Err(ApiError::Validation {
      code:    "too_many_events",
      message: format!("Maximum {MAX_BATCH} events per request"),
      details: None,
    });
  }

  let project = state
    .store
    .get_project(project_id)
    .await
    .map_err(ApiError::store)?
    .ok_or(ApiError::NotFound)?;
  let schema = &project.decision_schema;

  // One `now` per request: every event accepted here shares this ts_server.
  let server_ts = now_ms();

  let mut accepted = 0usize;
  let mut duplicate = 0usize;
  let mut rejected = 0usize;
  let mut results = Vec::with_capacity(body.events.len());

  for event in &body.events {
    match process_one(&state, project_id, &caller, schema, event, server_ts)
      .await?
    {
      Disposition::Accepted => {
        accepted += 1;
        results.push(EventResult {
          event_id:   event.event_id.clone(),
          status:     "accepted",
          error_code: None,
        });
      }
      Disposition::Duplicate => {
        duplicate += 1;
        results.push(EventResult {
          event_id:   event.event_id.clone(),
          status:     "duplicate",
          error_code: None,
        });
      }
      Disposition::Rejected(reason) => {
        rejected += 1;
        results.push(EventResult {
          event_id:   event.event_id.clone(),
          status:     "rejected",
          error_code: Some(reason.code()),
        });
      }
    }
  }

  Ok(Json(IngestResponse {
    acked: accepted + duplicate,
    accepted,
    duplicate,
    rejected,
    server_ts,
    client_id: body.client_id,
    session_id: body.session_id,
    results,
  }))
}

enum Disposition {
  Accepted,
  Duplicate,
  Rejected(RejectReason),
}

async fn process_one<S>(
  state: &AppState<S>,
  project_id: Uuid,
  caller: &Caller,
  schema: &triagedeck_core::project::DecisionSchema,
  event: &EventIn,
  server_ts: i64,
) -> Result<Disposition, ApiError>
where
  S: DeckStore + 'static,
{
  let Ok(event_id) = Uuid::parse_str(&event.event_id) else {
    return Ok(Disposition::Rejected(RejectReason::InvalidEventId));
  };
  let Ok(item_id) = Uuid::parse_str(&event.item_id) else {
    return Ok(Disposition::Rejected(RejectReason::InvalidItemId));
  };
  if let Err(reason) = validate_event(schema, &event.decision_id, &event.note)
  {
    return Ok(Disposition::Rejected(reason));
  }
  let in_scope = state
    .store
    .has_item(project_id, item_id)
    .await
    .map_err(ApiError::store)?;
  if !in_scope {
    return Ok(Disposition::Rejected(RejectReason::UnknownItem));
  }

  let ts_client_effective =
    state.config.skew_window.clamp(event.ts_client, server_ts);

  let applied = state
    .store
    .apply_event(DecisionEvent {
      id: Uuid::new_v4(),
      project_id,
      user_id: caller.user_id.clone(),
      event_id,
      item_id,
      decision_id: event.decision_id.clone(),
      note: event.note.clone(),
      ts_client: event.ts_client,
      ts_client_effective,
      ts_server: server_ts,
    })
    .await
    .map_err(ApiError::store)?;

  Ok(match applied {
    ApplyResult::Accepted => Disposition::Accepted,
    ApplyResult::Duplicate => Disposition::Duplicate,
  })
}
