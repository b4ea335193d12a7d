//! The `DeckStore` trait and supporting key/result types.
//!
//! The trait is implemented by storage backends (e.g.
//! `triagedeck-store-sqlite`). Higher layers (`triagedeck-api`,
//! `triagedeck-export`) depend on this abstraction, not on any concrete
//! backend. The store exclusively owns all persisted state; every mutation
//! passes through one of its transactional operations, and every default read
//! excludes soft-deleted projects and items through a single shared predicate.

use std::future::Future;

use uuid::Uuid;

use crate::{
  access::Role,
  decision::{DecisionEvent, DecisionLatest},
  export::{ExportJob, ExportMode, ExportRow, ExportStatus},
  item::ItemWithVariants,
  project::Project,
};

// ─── Page keys ───────────────────────────────────────────────────────────────

/// Resume-after key for the items view, `(sort_key ASC, item_id ASC)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemKey {
  pub sort_key: String,
  pub item_id:  Uuid,
}

/// Resume-after key for the decisions view, `(ts_server ASC, item_id ASC)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecisionKey {
  pub ts_server: i64,
  pub item_id:   Uuid,
}

/// Resume-after key for the exports view, `(created_at DESC, id DESC)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportKey {
  pub created_at: i64,
  pub export_id:  Uuid,
}

// ─── Operation results ───────────────────────────────────────────────────────

/// Outcome of an idempotent event apply. Rejections (schema or scope) are
/// decided by the caller before the store is involved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyResult {
  /// The event was appended and the latest-decision row recomputed.
  Accepted,
  /// An event with the same `(project_id, user_id, event_id)` already exists.
  Duplicate,
}

/// Outcome of a controller-side cancellation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
  /// The job was queued or running and is now `failed (export_cancelled)`.
  Cancelled,
  /// The job was already `failed` or `expired`; cancel is idempotent.
  AlreadyTerminal(ExportStatus),
  /// The job is `ready`; a completed artifact cannot be cancelled.
  ReadyConflict,
  NotFound,
}

/// Minimal project listing row.
#[derive(Debug, Clone)]
pub struct ProjectSummary {
  pub project_id: Uuid,
  pub name:       String,
  pub slug:       String,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a triagedeck storage backend.
///
/// Writes to `decision_event` are append-only; `decision_latest` is only ever
/// touched inside the same transaction that appends an event (or by the
/// diagnostic rebuilder). Export-job status transitions are guarded by status
/// preconditions enforced inside the store's transactions.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait DeckStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Projects & membership ─────────────────────────────────────────────

  /// Projects the user is a member of, soft-deleted excluded, name order.
  fn list_projects<'a>(
    &'a self,
    user_id: &'a str,
  ) -> impl Future<Output = Result<Vec<ProjectSummary>, Self::Error>> + Send + 'a;

  /// Fetch a project with its schema and config. `None` if missing or
  /// soft-deleted.
  fn get_project(
    &self,
    project_id: Uuid,
  ) -> impl Future<Output = Result<Option<Project>, Self::Error>> + Send + '_;

  /// The caller's role in a project, `None` for non-members.
  fn role_in<'a>(
    &'a self,
    project_id: Uuid,
    user_id: &'a str,
  ) -> impl Future<Output = Result<Option<Role>, Self::Error>> + Send + 'a;

  // ── Items ─────────────────────────────────────────────────────────────

  /// One page of items after `after`, with variants eagerly loaded.
  fn list_items(
    &self,
    project_id: Uuid,
    after: Option<ItemKey>,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<ItemWithVariants>, Self::Error>> + Send + '_;

  /// Single-item hydration. `None` if missing or soft-deleted.
  fn get_item(
    &self,
    project_id: Uuid,
    item_id: Uuid,
  ) -> impl Future<Output = Result<Option<ItemWithVariants>, Self::Error>> + Send + '_;

  /// Scope check used by ingest: does the item exist (not soft-deleted) in
  /// this project?
  fn has_item(
    &self,
    project_id: Uuid,
    item_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Decisions ─────────────────────────────────────────────────────────

  /// Atomically append `event` and recompute the latest row for its
  /// `(project_id, user_id, item_id)` — a single transaction. Uniqueness of
  /// the idempotency key is enforced by the store's constraint, never by
  /// application-level locks.
  fn apply_event(
    &self,
    event: DecisionEvent,
  ) -> impl Future<Output = Result<ApplyResult, Self::Error>> + Send + '_;

  /// One page of the caller's latest decisions after `after`.
  fn list_latest<'a>(
    &'a self,
    project_id: Uuid,
    user_id: &'a str,
    after: Option<DecisionKey>,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<DecisionLatest>, Self::Error>> + Send + 'a;

  /// Diagnostic rebuilder: replay all events for the project under the
  /// winner total order and rewrite `decision_latest` from scratch. Returns
  /// the number of projection rows written. The result must equal what
  /// incremental ingestion produced.
  fn rebuild_latest(
    &self,
    project_id: Uuid,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  // ── Export jobs ───────────────────────────────────────────────────────

  fn create_export_job(
    &self,
    job: ExportJob,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_export_job(
    &self,
    project_id: Uuid,
    export_id: Uuid,
  ) -> impl Future<Output = Result<Option<ExportJob>, Self::Error>> + Send + '_;

  /// One page of export jobs, newest first.
  fn list_export_jobs(
    &self,
    project_id: Uuid,
    after: Option<ExportKey>,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<ExportJob>, Self::Error>> + Send + '_;

  /// Count of the requester's `queued` + `running` jobs in the project,
  /// used for the per-user concurrency cap.
  fn count_active_exports<'a>(
    &'a self,
    project_id: Uuid,
    requester: &'a str,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;

  /// Controller-owned cancel transition with status preconditions enforced
  /// inside the transaction.
  fn cancel_export_job(
    &self,
    project_id: Uuid,
    export_id: Uuid,
    now: i64,
  ) -> impl Future<Output = Result<CancelOutcome, Self::Error>> + Send + '_;

  // ── Worker-side operations ────────────────────────────────────────────

  /// Atomically transition the oldest `queued` job to `running` and return
  /// it. `None` when the queue is empty.
  fn claim_next_export_job(
    &self,
  ) -> impl Future<Output = Result<Option<ExportJob>, Self::Error>> + Send + '_;

  /// Current status of a job; polled by the worker at chunk boundaries to
  /// observe cooperative cancellation.
  fn export_status(
    &self,
    export_id: Uuid,
  ) -> impl Future<Output = Result<Option<ExportStatus>, Self::Error>> + Send + '_;

  /// Worker-owned `running → ready`. Returns `false` without writing if the
  /// job is no longer `running` (cancelled mid-flight) — the caller must
  /// then discard its artifact bytes.
  fn complete_export_job(
    &self,
    export_id: Uuid,
    manifest: serde_json::Value,
    file_uri: String,
    completed_at: i64,
    expires_at: i64,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Worker-owned `running → failed`. Returns `false` if the job was not
  /// `running` (e.g. already cancelled by the controller).
  fn fail_export_job<'a>(
    &'a self,
    export_id: Uuid,
    error_code: &'a str,
    completed_at: i64,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Sweeper-owned `ready → expired` for artifacts past their TTL. Returns
  /// the jobs transitioned so the sweeper can remove artifact files.
  fn expire_ready_jobs(
    &self,
    now: i64,
  ) -> impl Future<Output = Result<Vec<ExportJob>, Self::Error>> + Send + '_;

  /// The full snapshot row set for an export, ordered
  /// `(ts_server ASC, item_id ASC, user_id ASC)` with unlabeled items (mode
  /// permitting) appended in `item_id` order. Filters are applied by the
  /// worker on the buffered rows.
  fn export_snapshot(
    &self,
    project_id: Uuid,
    mode: ExportMode,
  ) -> impl Future<Output = Result<Vec<ExportRow>, Self::Error>> + Send + '_;
}
