//! JSON REST API for triagedeck.
//!
//! Exposes an axum [`Router`] backed by any
//! [`triagedeck_core::store::DeckStore`]. Session validation, TLS, and
//! transport concerns are the caller's responsibility; the fronting auth
//! adapter injects `x-user-id` and this crate resolves roles and enforces the
//! role matrix from there.
//!
//! # Mounting
//!
//! ```rust,ignore
//! axum::serve(listener, triagedeck_api::api_router(state)).await?;
//! ```

pub mod decisions;
pub mod error;
pub mod events;
pub mod exports;
pub mod identity;
pub mod items;
pub mod pagination;
pub mod projects;
pub mod rate_limit;

use std::sync::Arc;

use axum::{
  Json, Router,
  routing::{get, post},
};
use serde_json::json;
use triagedeck_core::{
  clock::{SkewWindow, now_ms},
  cursor::CursorCodec,
  resolver::{self, StorageResolver},
  store::DeckStore,
};

pub use error::ApiError;
use identity::Caller;
use rate_limit::{LimitClass, RateLimiter};

// ─── Configuration ───────────────────────────────────────────────────────────

fn default_allowlist() -> Vec<String> {
  [
    "item_id",
    "external_id",
    "decision_id",
    "note",
    "ts_server",
    "variant_key",
    "metadata.subject_id",
    "metadata.session_id",
  ]
  .iter()
  .map(|s| s.to_string())
  .collect()
}

/// Runtime knobs the API layer needs; assembled by the server binary from its
/// configuration sources.
#[derive(Debug, Clone)]
pub struct ApiConfig {
  pub skew_window: SkewWindow,
  pub signed_url_ttl_ms: i64,
  /// Server-global export allowlist; projects may override with their own.
  pub export_allowlist: Vec<String>,
  pub export_max_concurrent_per_user: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      skew_window: SkewWindow::default(),
      signed_url_ttl_ms: resolver::DEFAULT_TTL_MS,
      export_allowlist: default_allowlist(),
      export_max_concurrent_per_user: 2,
    }
  }
}

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S> {
  pub store:    Arc<S>,
  pub resolver: Arc<dyn StorageResolver>,
  pub cursors:  Arc<CursorCodec>,
  pub limiter:  Arc<RateLimiter>,
  pub config:   Arc<ApiConfig>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      store:    Arc::clone(&self.store),
      resolver: Arc::clone(&self.resolver),
      cursors:  Arc::clone(&self.cursors),
      limiter:  Arc::clone(&self.limiter),
      config:   Arc::clone(&self.config),
    }
  }
}

impl<S> AppState<S> {
  /// Enforce the per-user rate ceiling for this request class.
  pub fn check_rate(
    &self,
    caller: &Caller,
    class: LimitClass,
  ) -> Result<(), ApiError> {
    if self.limiter.check(&caller.user_id, class, now_ms()) {
      Ok(())
    } else {
      Err(ApiError::RateLimited {
        message: "Rate limit exceeded".to_string(),
      })
    }
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build a fully-materialised API router for `state`.
pub fn api_router<S>(state: AppState<S>) -> Router
where
  S: DeckStore + 'static,
{
  Router::new()
    .route("/health", get(health))
    .route("/api/v1/projects", get(projects::list::<S>))
    .route("/api/v1/projects/{pid}/config", get(projects::config::<S>))
    .route("/api/v1/projects/{pid}/items", get(items::list::<S>))
    .route("/api/v1/projects/{pid}/items/{iid}", get(items::get_one::<S>))
    .route(
      "/api/v1/projects/{pid}/items/{iid}/url",
      get(items::refresh_url::<S>),
    )
    .route("/api/v1/projects/{pid}/events", post(events::ingest::<S>))
    .route("/api/v1/projects/{pid}/decisions", get(decisions::list::<S>))
    .route(
      "/api/v1/projects/{pid}/exports",
      get(exports::list::<S>).post(exports::create::<S>),
    )
    .route(
      "/api/v1/projects/{pid}/exports/{eid}",
      get(exports::get_one::<S>).delete(exports::cancel::<S>),
    )
    .with_state(state)
}

/// `GET /health` — unauthenticated liveness probe.
async fn health() -> Json<serde_json::Value> {
  Json(json!({ "ok": true, "ts": now_ms() }))
}

// ─── Integration tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
  };
  use serde_json::{Value, json};
  use tower::ServiceExt as _;
  use triagedeck_core::{
    cursor::CursorKey, export::ExportStatus, store::DeckStore,
  };
  use uuid::Uuid;

  use super::test_helpers::*;
  use super::*;

  // ── Auth & visibility ─────────────────────────────────────────────────────

  #[tokio::test]
  async fn health_is_public() {
    let deck = make_deck().await;
    let resp = request(&deck, "GET", "/health", None, None).await;
    assert_eq!(resp.status(), StatusCode::OK);
  }

  #[tokio::test]
  async fn missing_identity_is_401() {
    let deck = make_deck().await;
    let resp = request(&deck, "GET", "/api/v1/projects", None, None).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(resp).await;
    assert_eq!(body["error"]["code"], "unauthorized");
  }

  #[tokio::test]
  async fn non_member_sees_404_not_403() {
    let deck = make_deck().await;
    let uri = format!("/api/v1/projects/{}/items", deck.project_id);
    let resp =
      request(&deck, "GET", &uri, Some("stranger@example.com"), None).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(resp).await["error"]["code"], "not_found");
  }

  #[tokio::test]
  async fn projects_lists_only_memberships() {
    let deck = make_deck().await;
    let resp =
      request(&deck, "GET", "/api/v1/projects", Some(REVIEWER), None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["projects"].as_array().unwrap().len(), 1);
    assert_eq!(body["projects"][0]["slug"], "demo-project");
  }

  #[tokio::test]
  async fn config_carries_schema_and_client_knobs() {
    let deck = make_deck().await;
    let uri = format!("/api/v1/projects/{}/config", deck.project_id);
    let resp = request(&deck, "GET", &uri, Some(VIEWER), None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["decision_schema"]["version"], 1);
    assert_eq!(
      body["decision_schema"]["choices"].as_array().unwrap().len(),
      2
    );
    assert_eq!(body["max_compare_variants"], 2);
    assert_eq!(body["variant_navigation_mode"], "both");
  }

  // ── Items & cursors ───────────────────────────────────────────────────────

  #[tokio::test]
  async fn items_page_with_cursor_until_exhausted() {
    let deck = make_deck().await;
    let base = format!("/api/v1/projects/{}/items", deck.project_id);

    let resp =
      request(&deck, "GET", &format!("{base}?limit=2"), Some(REVIEWER), None)
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["items"].as_array().unwrap().len(), 2);
    let cursor = body["next_cursor"].as_str().unwrap().to_string();

    let resp = request(
      &deck,
      "GET",
      &format!("{base}?limit=2&cursor={cursor}"),
      Some(REVIEWER),
      None,
    )
    .await;
    let body = json_body(resp).await;
    assert_eq!(body["items"].as_array().unwrap().len(), 1);

    // Variants ride along, ordered by sort_order.
    assert_eq!(body["items"][0]["variants"][0]["variant_key"], "before");
    assert_eq!(body["items"][0]["variants"][1]["variant_key"], "after");
  }

  #[tokio::test]
  async fn expired_cursor_is_400_invalid_cursor() {
    let deck = make_deck().await;
    let eight_days_ago = now_ms() - 8 * 24 * 60 * 60 * 1000;
    let stale = deck.state.cursors.encode(
      &CursorKey::Items {
        sort_key: "00000001".into(),
        item_id:  deck.items[0],
      },
      eight_days_ago,
    );
    let uri = format!(
      "/api/v1/projects/{}/items?cursor={stale}",
      deck.project_id
    );
    let resp = request(&deck, "GET", &uri, Some(REVIEWER), None).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(resp).await["error"]["code"], "invalid_cursor");
  }

  #[tokio::test]
  async fn cursor_from_another_view_is_rejected() {
    let deck = make_deck().await;
    let foreign = deck.state.cursors.encode(
      &CursorKey::Decisions {
        ts_server: 1,
        item_id:   deck.items[0],
      },
      now_ms(),
    );
    let uri = format!(
      "/api/v1/projects/{}/items?cursor={foreign}",
      deck.project_id
    );
    let resp = request(&deck, "GET", &uri, Some(REVIEWER), None).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn single_item_hydrates_and_missing_is_404() {
    let deck = make_deck().await;
    let uri = format!(
      "/api/v1/projects/{}/items/{}",
      deck.project_id, deck.items[0]
    );
    let resp = request(&deck, "GET", &uri, Some(VIEWER), None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["external_id"], "img_0001");

    let uri = format!(
      "/api/v1/projects/{}/items/{}",
      deck.project_id,
      Uuid::new_v4()
    );
    let resp = request(&deck, "GET", &uri, Some(VIEWER), None).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn url_refresh_resolves_item_and_variant() {
    let deck = make_deck().await;
    let base = format!(
      "/api/v1/projects/{}/items/{}/url",
      deck.project_id, deck.items[0]
    );

    let resp = request(&deck, "GET", &base, Some(REVIEWER), None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["uri"], "/media/img_0001.jpg");
    assert!(body["expires_at"].as_i64().unwrap() > now_ms());

    let resp = request(
      &deck,
      "GET",
      &format!("{base}?variant_key=after"),
      Some(REVIEWER),
      None,
    )
    .await;
    let body = json_body(resp).await;
    assert_eq!(body["uri"], "/media/img_0001_after.jpg");

    let resp = request(
      &deck,
      "GET",
      &format!("{base}?variant_key=nope"),
      Some(REVIEWER),
      None,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
  }

  // ── Event ingestion ───────────────────────────────────────────────────────

  fn batch(events: Vec<Value>) -> Value {
    json!({ "client_id": "c-1", "session_id": "s-1", "events": events })
  }

  fn ev(event_id: Uuid, item_id: Uuid, decision: &str, ts: i64) -> Value {
    json!({
      "event_id": event_id,
      "item_id": item_id,
      "decision_id": decision,
      "ts_client": ts,
    })
  }

  #[tokio::test]
  async fn duplicate_in_one_batch_is_absorbed() {
    let deck = make_deck().await;
    let uri = format!("/api/v1/projects/{}/events", deck.project_id);
    let shared = Uuid::new_v4();
    let body = batch(vec![
      ev(shared, deck.items[0], "pass", 100),
      ev(shared, deck.items[0], "pass", 100),
    ]);

    let resp = request(&deck, "POST", &uri, Some(REVIEWER), Some(body)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["acked"], 2);
    assert_eq!(body["accepted"], 1);
    assert_eq!(body["duplicate"], 1);
    assert_eq!(body["rejected"], 0);
    assert_eq!(body["results"][0]["status"], "accepted");
    assert_eq!(body["results"][1]["status"], "duplicate");

    let decisions = list_decisions(&deck, REVIEWER).await;
    assert_eq!(decisions.len(), 1);
  }

  #[tokio::test]
  async fn out_of_order_events_converge_to_newest_client_time() {
    let deck = make_deck().await;
    let uri = format!("/api/v1/projects/{}/events", deck.project_id);
    let newer = Uuid::new_v4();
    let older = Uuid::new_v4();
    let now = now_ms();

    // Newest-first arrival; the stale event must not overwrite.
    let resp = request(
      &deck,
      "POST",
      &uri,
      Some(REVIEWER),
      Some(batch(vec![ev(newer, deck.items[0], "pass", now)])),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = request(
      &deck,
      "POST",
      &uri,
      Some(REVIEWER),
      Some(batch(vec![ev(older, deck.items[0], "fail", now - 10_000)])),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let decisions = list_decisions(&deck, REVIEWER).await;
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0]["event_id"], json!(newer));
    assert_eq!(decisions[0]["decision_id"], "pass");
  }

  #[tokio::test]
  async fn far_past_client_timestamp_is_clamped_to_window() {
    let deck = make_deck().await;
    let uri = format!("/api/v1/projects/{}/events", deck.project_id);
    let resp = request(
      &deck,
      "POST",
      &uri,
      Some(REVIEWER),
      Some(batch(vec![ev(Uuid::new_v4(), deck.items[0], "pass", 0)])),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let server_ts = json_body(resp).await["server_ts"].as_i64().unwrap();

    let decisions = list_decisions(&deck, REVIEWER).await;
    assert_eq!(decisions[0]["ts_client"], 0);
    assert_eq!(
      decisions[0]["ts_client_effective"].as_i64().unwrap(),
      server_ts - 24 * 60 * 60 * 1000
    );
  }

  #[tokio::test]
  async fn viewer_cannot_write_events() {
    let deck = make_deck().await;
    let uri = format!("/api/v1/projects/{}/events", deck.project_id);
    let resp = request(
      &deck,
      "POST",
      &uri,
      Some(VIEWER),
      Some(batch(vec![ev(Uuid::new_v4(), deck.items[0], "pass", 100)])),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
  }

  #[tokio::test]
  async fn per_event_rejections_leave_batch_peers_committed() {
    let deck = make_deck().await;
    let uri = format!("/api/v1/projects/{}/events", deck.project_id);
    let good = Uuid::new_v4();
    let long_note = "x".repeat(2001);
    let body = json!({
      "client_id": "c-1",
      "session_id": "s-1",
      "events": [
        ev(good, deck.items[0], "pass", 100),
        ev(Uuid::new_v4(), deck.items[1], "maybe", 100),
        { "event_id": Uuid::new_v4(), "item_id": deck.items[1],
          "decision_id": "pass", "note": long_note, "ts_client": 100 },
        ev(Uuid::new_v4(), Uuid::new_v4(), "pass", 100),
        { "event_id": "not-a-uuid", "item_id": deck.items[1],
          "decision_id": "pass", "ts_client": 100 },
      ],
    });

    let resp = request(&deck, "POST", &uri, Some(REVIEWER), Some(body)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["accepted"], 1);
    assert_eq!(body["rejected"], 4);
    let codes: Vec<&str> = body["results"]
      .as_array()
      .unwrap()
      .iter()
      .filter_map(|r| r["error_code"].as_str())
      .collect();
    assert_eq!(
      codes,
      [
        "invalid_decision_id",
        "invalid_note",
        "unknown_item",
        "invalid_event_id"
      ]
    );
  }

  #[tokio::test]
  async fn oversized_batch_is_422() {
    let deck = make_deck().await;
    let uri = format!("/api/v1/projects/{}/events", deck.project_id);
    let events: Vec<Value> = (0..201)
      .map(|_| ev(Uuid::new_v4(), deck.items[0], "pass", 100))
      .collect();
    let resp =
      request(&deck, "POST", &uri, Some(REVIEWER), Some(batch(events))).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json_body(resp).await["error"]["code"], "too_many_events");
  }

  #[tokio::test]
  async fn decisions_are_scoped_to_the_caller() {
    let deck = make_deck().await;
    let uri = format!("/api/v1/projects/{}/events", deck.project_id);
    request(
      &deck,
      "POST",
      &uri,
      Some(REVIEWER),
      Some(batch(vec![ev(Uuid::new_v4(), deck.items[0], "pass", 100)])),
    )
    .await;

    assert_eq!(list_decisions(&deck, REVIEWER).await.len(), 1);
    assert_eq!(list_decisions(&deck, ADMIN).await.len(), 0);
  }

  #[tokio::test]
  async fn write_rate_ceiling_returns_429() {
    let deck = make_deck_with(default_project_config(), 600, 1).await;
    let uri = format!("/api/v1/projects/{}/events", deck.project_id);
    let resp = request(
      &deck,
      "POST",
      &uri,
      Some(REVIEWER),
      Some(batch(vec![ev(Uuid::new_v4(), deck.items[0], "pass", 100)])),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = request(
      &deck,
      "POST",
      &uri,
      Some(REVIEWER),
      Some(batch(vec![ev(Uuid::new_v4(), deck.items[0], "pass", 100)])),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json_body(resp).await["error"]["code"], "rate_limited");
  }

  // ── Exports ───────────────────────────────────────────────────────────────

  fn export_body(fields: &[&str]) -> Value {
    json!({ "include_fields": fields })
  }

  async fn create_export(deck: &Deck, user: &str, fields: &[&str]) -> Value {
    let uri = format!("/api/v1/projects/{}/exports", deck.project_id);
    let resp =
      request(deck, "POST", &uri, Some(user), Some(export_body(fields))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    json_body(resp).await
  }

  #[tokio::test]
  async fn export_create_queues_job() {
    let deck = make_deck().await;
    let body = create_export(&deck, REVIEWER, &["item_id", "decision_id"]).await;
    assert_eq!(body["status"], "queued");

    let eid = body["export_id"].as_str().unwrap();
    let uri =
      format!("/api/v1/projects/{}/exports/{eid}", deck.project_id);
    let resp = request(&deck, "GET", &uri, Some(REVIEWER), None).await;
    let body = json_body(resp).await;
    assert_eq!(body["status"], "queued");
    assert_eq!(body["download_url"], Value::Null);
  }

  #[tokio::test]
  async fn unlisted_field_is_422_and_creates_nothing() {
    let deck = make_deck().await;
    let uri = format!("/api/v1/projects/{}/exports", deck.project_id);
    let resp = request(
      &deck,
      "POST",
      &uri,
      Some(REVIEWER),
      Some(export_body(&["metadata.subject_id", "ssn"])),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(resp).await;
    assert_eq!(body["error"]["code"], "field_not_allowlisted");
    assert_eq!(body["error"]["details"]["field"], "ssn");

    let resp = request(&deck, "GET", &uri, Some(REVIEWER), None).await;
    assert_eq!(json_body(resp).await["exports"].as_array().unwrap().len(), 0);
  }

  #[tokio::test]
  async fn unknown_format_is_422() {
    let deck = make_deck().await;
    let uri = format!("/api/v1/projects/{}/exports", deck.project_id);
    let resp = request(
      &deck,
      "POST",
      &uri,
      Some(REVIEWER),
      Some(json!({ "format": "xlsx", "include_fields": ["item_id"] })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json_body(resp).await["error"]["code"], "invalid_format");
  }

  #[tokio::test]
  async fn third_concurrent_export_is_429() {
    let deck = make_deck().await;
    create_export(&deck, REVIEWER, &["item_id"]).await;
    create_export(&deck, REVIEWER, &["item_id"]).await;

    let uri = format!("/api/v1/projects/{}/exports", deck.project_id);
    let resp = request(
      &deck,
      "POST",
      &uri,
      Some(REVIEWER),
      Some(export_body(&["item_id"])),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
  }

  #[tokio::test]
  async fn viewer_export_rights_follow_org_policy() {
    // Policy off: viewer may not create exports.
    let deck = make_deck().await;
    let uri = format!("/api/v1/projects/{}/exports", deck.project_id);
    let resp = request(
      &deck,
      "POST",
      &uri,
      Some(VIEWER),
      Some(export_body(&["item_id"])),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // Policy on: the same request succeeds.
    let mut config = default_project_config();
    config.viewer_exports_enabled = true;
    let deck = make_deck_with(config, 600, 60).await;
    let uri = format!("/api/v1/projects/{}/exports", deck.project_id);
    let resp = request(
      &deck,
      "POST",
      &uri,
      Some(VIEWER),
      Some(export_body(&["item_id"])),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
  }

  #[tokio::test]
  async fn export_listing_hides_other_requesters_without_policy() {
    let deck = make_deck().await;
    create_export(&deck, REVIEWER, &["item_id"]).await;

    let uri = format!("/api/v1/projects/{}/exports", deck.project_id);
    let resp = request(&deck, "GET", &uri, Some(VIEWER), None).await;
    assert_eq!(json_body(resp).await["exports"].as_array().unwrap().len(), 0);

    let resp = request(&deck, "GET", &uri, Some(ADMIN), None).await;
    assert_eq!(json_body(resp).await["exports"].as_array().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn foreign_export_get_is_403_when_policy_disallows() {
    let deck = make_deck().await;
    let body = create_export(&deck, REVIEWER, &["item_id"]).await;
    let eid = body["export_id"].as_str().unwrap();
    let uri =
      format!("/api/v1/projects/{}/exports/{eid}", deck.project_id);

    let resp = request(&deck, "GET", &uri, Some(VIEWER), None).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = request(&deck, "GET", &uri, Some(ADMIN), None).await;
    assert_eq!(resp.status(), StatusCode::OK);
  }

  #[tokio::test]
  async fn cancel_is_idempotent_and_ready_conflicts() {
    let deck = make_deck().await;
    let body = create_export(&deck, REVIEWER, &["item_id"]).await;
    let eid = body["export_id"].as_str().unwrap().to_string();
    let uri =
      format!("/api/v1/projects/{}/exports/{eid}", deck.project_id);

    let resp = request(&deck, "DELETE", &uri, Some(REVIEWER), None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["status"], "failed");
    assert_eq!(body["error"]["code"], "export_cancelled");

    // Idempotent: a second DELETE succeeds.
    let resp = request(&deck, "DELETE", &uri, Some(REVIEWER), None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["status"], "failed");

    // A ready export conflicts.
    let body = create_export(&deck, REVIEWER, &["item_id"]).await;
    let ready_id =
      Uuid::parse_str(body["export_id"].as_str().unwrap()).unwrap();
    make_ready(&deck, ready_id, now_ms() + 60_000).await;
    let uri =
      format!("/api/v1/projects/{}/exports/{ready_id}", deck.project_id);
    let resp = request(&deck, "DELETE", &uri, Some(REVIEWER), None).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
  }

  #[tokio::test]
  async fn ready_export_past_ttl_is_410() {
    let deck = make_deck().await;
    let body = create_export(&deck, REVIEWER, &["item_id"]).await;
    let eid = Uuid::parse_str(body["export_id"].as_str().unwrap()).unwrap();
    make_ready(&deck, eid, now_ms() - 1).await;

    let uri = format!("/api/v1/projects/{}/exports/{eid}", deck.project_id);
    let resp = request(&deck, "GET", &uri, Some(REVIEWER), None).await;
    assert_eq!(resp.status(), StatusCode::GONE);
    assert_eq!(json_body(resp).await["error"]["code"], "export_expired");
  }

  #[tokio::test]
  async fn ready_export_exposes_manifest_and_download_url() {
    let deck = make_deck().await;
    let body = create_export(&deck, REVIEWER, &["item_id"]).await;
    let eid = Uuid::parse_str(body["export_id"].as_str().unwrap()).unwrap();
    make_ready(&deck, eid, now_ms() + 60_000).await;

    let uri = format!("/api/v1/projects/{}/exports/{eid}", deck.project_id);
    let resp = request(&deck, "GET", &uri, Some(REVIEWER), None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["status"], "ready");
    assert_eq!(body["manifest"]["row_count"], 0);
    assert_eq!(body["download_url"], "exports/test.jsonl");
  }

  // ── Helpers local to the test module ──────────────────────────────────────

  async fn list_decisions(deck: &Deck, user: &str) -> Vec<Value> {
    let uri = format!("/api/v1/projects/{}/decisions", deck.project_id);
    let resp = request(deck, "GET", &uri, Some(user), None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    json_body(resp).await["decisions"]
      .as_array()
      .unwrap()
      .clone()
  }

  /// Drive a queued job to `ready` the way the worker would.
  async fn make_ready(deck: &Deck, export_id: Uuid, expires_at: i64) {
    let store = &deck.state.store;
    loop {
      let claimed = store.claim_next_export_job().await.unwrap();
      let Some(job) = claimed else { break };
      if job.export_id == export_id {
        store
          .complete_export_job(
            export_id,
            json!({ "row_count": 0 }),
            "exports/test.jsonl".to_string(),
            now_ms(),
            expires_at,
          )
          .await
          .unwrap();
        break;
      }
      // Not the job under test; park it as failed so the loop terminates.
      store
        .fail_export_job(job.export_id, "export_failed", now_ms())
        .await
        .unwrap();
    }
    let status = store.export_status(export_id).await.unwrap();
    assert_eq!(status, Some(ExportStatus::Ready));
  }

  async fn json_body(resp: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
      .await
      .unwrap();
    serde_json::from_slice(&bytes).unwrap()
  }

  async fn request(
    deck: &Deck,
    method: &str,
    uri: &str,
    user: Option<&str>,
    body: Option<Value>,
  ) -> axum::response::Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
      builder = builder.header("x-user-id", user);
    }
    let req = match body {
      Some(v) => builder
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(v.to_string())),
      None => builder.body(Body::empty()),
    }
    .unwrap();
    api_router(deck.state.clone()).oneshot(req).await.unwrap()
  }
}

// ─── Shared test helpers ──────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod test_helpers {
  use std::sync::Arc;

  use triagedeck_core::{
    access::Role,
    cursor::{CursorCodec, DEFAULT_TTL_MS},
    item::{Item, ItemVariant, MediaType},
    project::{
      Choice, DecisionSchema, Project, ProjectConfig, VariantNavigationMode,
    },
    resolver::PublicResolver,
  };
  use triagedeck_store_sqlite::SqliteStore;
  use uuid::Uuid;

  use crate::{ApiConfig, AppState, rate_limit::RateLimiter};

  pub(crate) const ADMIN: &str = "admin@example.com";
  pub(crate) const REVIEWER: &str = "reviewer@example.com";
  pub(crate) const VIEWER: &str = "viewer@example.com";

  pub(crate) struct Deck {
    pub state:      AppState<SqliteStore>,
    pub project_id: Uuid,
    pub items:      Vec<Uuid>,
  }

  pub(crate) fn default_project_config() -> ProjectConfig {
    ProjectConfig {
      media_types_supported:         vec![
        MediaType::Image,
        MediaType::Video,
        MediaType::Pdf,
      ],
      variants_enabled:              true,
      variant_navigation_mode:       VariantNavigationMode::Both,
      compare_mode_enabled:          true,
      max_compare_variants:          2,
      export_allowlist:              None,
      viewer_exports_enabled:        false,
      reviewer_reads_others_exports: false,
    }
  }

  pub(crate) async fn make_deck() -> Deck {
    make_deck_with(default_project_config(), 600, 60).await
  }

  /// Seed the demo org/project (three roles, three items with before/after
  /// variants) behind a fresh in-memory store.
  pub(crate) async fn make_deck_with(
    project_config: ProjectConfig,
    reads_per_minute: u32,
    writes_per_minute: u32,
  ) -> Deck {
    let store = SqliteStore::open_in_memory().await.unwrap();

    let org_id = Uuid::new_v4();
    store.create_organization(org_id, "Local Org", 1000).await.unwrap();

    let project = Project {
      project_id:      Uuid::new_v4(),
      organization_id: org_id,
      name:            "Demo Project".into(),
      slug:            "demo-project".into(),
      decision_schema: DecisionSchema {
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
        allow_notes: true,
      },
      config:          project_config,
      created_at:      1000,
      deleted_at:      None,
    };
    store.create_project(&project).await.unwrap();

    for (user, role) in [
      (ADMIN, Role::Admin),
      (REVIEWER, Role::Reviewer),
      (VIEWER, Role::Viewer),
    ] {
      store
        .upsert_membership(project.project_id, user, role)
        .await
        .unwrap();
    }

    let mut items = Vec::new();
    for n in 1..=3u32 {
      let item = Item {
        item_id:     Uuid::new_v4(),
        project_id:  project.project_id,
        external_id: format!("img_{n:04}"),
        media_type:  MediaType::Image,
        logical_uri: format!("/media/img_{n:04}.jpg"),
        sort_key:    format!("{n:08}"),
        metadata:    serde_json::json!({
          "subject_id": format!("subject-{}", (n % 3) + 1),
          "session_id": format!("s-{}", (n % 5) + 1),
        }),
        created_at:  1000,
        deleted_at:  None,
      };
      store.create_item(&item).await.unwrap();
      for (key, label, order) in
        [("before", "Before", 10), ("after", "After", 20)]
      {
        store
          .create_variant(&ItemVariant {
            item_id:     item.item_id,
            variant_key: key.into(),
            label:       label.into(),
            logical_uri: format!("/media/img_{n:04}_{key}.jpg"),
            sort_order:  order,
            metadata:    serde_json::json!({}),
          })
          .await
          .unwrap();
      }
      items.push(item.item_id);
    }

    let state = AppState {
      store:    Arc::new(store),
      resolver: Arc::new(PublicResolver),
      cursors:  Arc::new(CursorCodec::new(b"test-secret", DEFAULT_TTL_MS)),
      limiter:  Arc::new(RateLimiter::new(reads_per_minute, writes_per_minute)),
      config:   Arc::new(ApiConfig::default()),
    };

    Deck {
      state,
      project_id: project.project_id,
      items,
    }
  }
}
