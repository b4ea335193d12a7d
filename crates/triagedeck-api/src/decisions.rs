//! Handler for `GET /projects/{pid}/decisions` — the caller's latest
//! decisions, cursor-paged in `(ts_server ASC, item_id ASC)` order.
//!
//! Strictly scoped to the calling user: there is no cross-user read here.

use axum::{
  Json,
  extract::{Path, Query, State},
};
use serde::Serialize;
use serde_json::json;
use triagedeck_core::{
  clock::now_ms,
  cursor::{CursorKey, View},
  store::{DecisionKey, DeckStore},
};
use uuid::Uuid;

use crate::{
  AppState,
  error::ApiError,
  identity::{Caller, role_or_404},
  pagination::{
    DECISIONS_DEFAULT, DECISIONS_MAX, PageParams, clamp_limit, decode_cursor,
  },
  rate_limit::LimitClass,
};

#[derive(Debug, Serialize)]
struct DecisionBody {
  item_id:             Uuid,
  decision_id:         String,
  note:                String,
  ts_client:           i64,
  ts_client_effective: i64,
  ts_server:           i64,
  event_id:            Uuid,
}

/// `GET /api/v1/projects/{pid}/decisions?cursor&limit`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  caller: Caller,
  Path(project_id): Path<Uuid>,
  Query(params): Query<PageParams>,
) -> Result<Json<serde_json::Value>, ApiError>
where
  S: DeckStore + 'static,
{
  state.check_rate(&caller, LimitClass::Read)?;
  role_or_404(&state, project_id, &caller.user_id).await?;

  let now = now_ms();
  let after = match decode_cursor(
    &state.cursors,
    View::Decisions,
    params.cursor.as_deref(),
    now,
  )? {
    Some(CursorKey::Decisions { ts_server, item_id }) => {
      Some(DecisionKey { ts_server, item_id })
    }
    _ => None,
  };
  let limit = clamp_limit(params.limit, DECISIONS_DEFAULT, DECISIONS_MAX);

  let page = state
    .store
    .list_latest(project_id, &caller.user_id, after, limit)
    .await
    .map_err(ApiError::store)?;

  let next_cursor = page.last().map(|last| {
    state.cursors.encode(
      &CursorKey::Decisions {
        ts_server: last.ts_server,
        item_id:   last.item_id,
      },
      now,
    )
  });

  let decisions: Vec<DecisionBody> = page
    .into_iter()
    .map(|l| DecisionBody {
      item_id:             l.item_id,
      decision_id:         l.decision_id,
      note:                l.note,
      ts_client:           l.ts_client,
      ts_client_effective: l.ts_client_effective,
      ts_server:           l.ts_server,
      event_id:            l.event_id,
    })
    .collect();

  Ok(Json(json!({ "decisions": decisions, "next_cursor": next_cursor })))
}
