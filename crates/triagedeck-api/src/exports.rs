//! Handlers for `/projects/{pid}/exports` — the export controller.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/exports` | Admission: role, policy, allowlist, concurrency |
//! | `GET`  | `/exports` | Cursor-paged, newest first |
//! | `GET`  | `/exports/{eid}` | Status + manifest + download URL; `410` past TTL |
//! | `DELETE` | `/exports/{eid}` | Idempotent cancel |
//!
//! Every create and download-URL issuance is audit-logged with
//! `{request_id, project_id, user_id, export_id, action}`.

use axum::{
  Json,
  extract::{Path, Query, State},
};
use serde::Deserialize;
use serde_json::json;
use triagedeck_core::{
  access::OrgPolicy,
  clock::now_ms,
  cursor::{CursorKey, View},
  export::{
    ExportFilters, ExportFormat, ExportJob, ExportMode, ExportStatus,
    LabelPolicy, check_allowlist,
  },
  store::{CancelOutcome, DeckStore, ExportKey},
};
use uuid::Uuid;

use crate::{
  AppState,
  error::ApiError,
  identity::{Caller, role_or_404},
  pagination::{
    EXPORTS_DEFAULT, EXPORTS_MAX, PageParams, clamp_limit, decode_cursor,
  },
  rate_limit::LimitClass,
};

// ─── Create ───────────────────────────────────────────────────────────────────

/// JSON body accepted by `POST /exports`. Enum-valued fields arrive as raw
/// strings so unknown values produce coded `422` errors rather than a
/// deserializer rejection.
#[derive(Debug, Deserialize)]
pub struct ExportCreateBody {
  #[serde(default)]
  pub mode:           Option<String>,
  #[serde(default)]
  pub label_policy:   Option<String>,
  #[serde(default)]
  pub format:         Option<String>,
  #[serde(default)]
  pub filters:        ExportFilters,
  #[serde(default)]
  pub include_fields: Vec<String>,
}

fn parse_mode(raw: Option<&str>) -> Result<ExportMode, ApiError> {
  match raw {
    None | Some("labels_only") => Ok(ExportMode::LabelsOnly),
    Some("labels_plus_unlabeled") => Ok(ExportMode::LabelsPlusUnlabeled),
    Some(other) => Err(ApiError::Validation {
      code:    "invalid_mode",
      message: format!("Unknown export mode: {other:?}"),
      details: None,
    }),
  }
}

fn parse_label_policy(raw: Option<&str>) -> Result<LabelPolicy, ApiError> {
  match raw {
    None | Some("latest_per_user") => Ok(LabelPolicy::LatestPerUser),
    Some(other) => Err(ApiError::Validation {
      code:    "invalid_label_policy",
      message: format!("Unknown label policy: {other:?}"),
      details: None,
    }),
  }
}

fn parse_format(raw: Option<&str>) -> Result<ExportFormat, ApiError> {
  match raw {
    None | Some("jsonl") => Ok(ExportFormat::Jsonl),
    Some("csv") => Ok(ExportFormat::Csv),
    Some("parquet") => Ok(ExportFormat::Parquet),
    Some(other) => Err(ApiError::Validation {
      code:    "invalid_format",
      message: format!("Unknown export format: {other:?}"),
      details: None,
    }),
  }
}

/// `POST /api/v1/projects/{pid}/exports`
pub async fn create<S>(
  State(state): State<AppState<S>>,
  caller: Caller,
  Path(project_id): Path<Uuid>,
  Json(body): Json<ExportCreateBody>,
) -> Result<Json<serde_json::Value>, ApiError>
where
  S: DeckStore + 'static,
{
  let role = role_or_404(&state, project_id, &caller.user_id).await?;
  let project = state
    .store
    .get_project(project_id)
    .await
    .map_err(ApiError::store)?
    .ok_or(ApiError::NotFound)?;
  let policy = OrgPolicy::from(&project.config);
  if !role.can_create_export(&policy) {
    return Err(ApiError::Forbidden);
  }

  let mode = parse_mode(body.mode.as_deref())?;
  let label_policy = parse_label_policy(body.label_policy.as_deref())?;
  let format = parse_format(body.format.as_deref())?;

  // Project allowlist overrides the server-global one.
  let allowlist = project
    .config
    .export_allowlist
    .as_ref()
    .unwrap_or(&state.config.export_allowlist);
  if let Err(field) = check_allowlist(&body.include_fields, allowlist) {
    return Err(ApiError::Validation {
      code:    "field_not_allowlisted",
      message: format!("Field not allowlisted: {field}"),
      details: Some(json!({ "field": field })),
    });
  }

  let active = state
    .store
    .count_active_exports(project_id, &caller.user_id)
    .await
    .map_err(ApiError::store)?;
  if active >= state.config.export_max_concurrent_per_user {
    return Err(ApiError::RateLimited {
      message: "Too many concurrent export jobs".to_string(),
    });
  }

  let job = ExportJob {
    export_id: Uuid::new_v4(),
    project_id,
    requested_by: caller.user_id.clone(),
    status: ExportStatus::Queued,
    mode,
    label_policy,
    format,
    filters: body.filters,
    include_fields: body.include_fields,
    manifest: None,
    file_uri: None,
    error_code: None,
    expires_at: None,
    created_at: now_ms(),
    completed_at: None,
  };
  state
    .store
    .create_export_job(job.clone())
    .await
    .map_err(ApiError::store)?;

  tracing::info!(
    request_id = %Uuid::new_v4(),
    project_id = %project_id,
    user_id = %caller.user_id,
    export_id = %job.export_id,
    action = "export_create",
    "export job queued"
  );

  Ok(Json(json!({ "export_id": job.export_id, "status": "queued" })))
}

// ─── List ─────────────────────────────────────────────────────────────────────

/// `GET /api/v1/projects/{pid}/exports?cursor&limit`
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
  let role = role_or_404(&state, project_id, &caller.user_id).await?;
  let policy = project_policy(&state, project_id).await?;

  let now = now_ms();
  let after = match decode_cursor(
    &state.cursors,
    View::Exports,
    params.cursor.as_deref(),
    now,
  )? {
    Some(CursorKey::Exports {
      created_at,
      export_id,
    }) => Some(ExportKey {
      created_at,
      export_id,
    }),
    _ => None,
  };
  let limit = clamp_limit(params.limit, EXPORTS_DEFAULT, EXPORTS_MAX);

  let page = state
    .store
    .list_export_jobs(project_id, after, limit)
    .await
    .map_err(ApiError::store)?;

  // The cursor advances over the raw page; visibility filtering happens
  // afterwards so pagination still terminates for non-admin callers.
  let next_cursor = page.last().map(|last| {
    state.cursors.encode(
      &CursorKey::Exports {
        created_at: last.created_at,
        export_id:  last.export_id,
      },
      now,
    )
  });

  let visible: Vec<&ExportJob> = page
    .iter()
    .filter(|job| {
      job.requested_by == caller.user_id
        || role.can_read_others_exports(&policy)
    })
    .collect();
  let exports: Vec<serde_json::Value> = visible
    .iter()
    .map(|job| {
      json!({
        "export_id": job.export_id,
        "status": job.status,
        "format": job.format,
        "mode": job.mode,
        "created_at": job.created_at,
      })
    })
    .collect();

  Ok(Json(json!({ "exports": exports, "next_cursor": next_cursor })))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /api/v1/projects/{pid}/exports/{eid}`
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  caller: Caller,
  Path((project_id, export_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<serde_json::Value>, ApiError>
where
  S: DeckStore + 'static,
{
  state.check_rate(&caller, LimitClass::Read)?;
  let role = role_or_404(&state, project_id, &caller.user_id).await?;
  let policy = project_policy(&state, project_id).await?;

  let job = state
    .store
    .get_export_job(project_id, export_id)
    .await
    .map_err(ApiError::store)?
    .ok_or(ApiError::NotFound)?;

  if job.requested_by != caller.user_id
    && !role.can_read_others_exports(&policy)
  {
    return Err(ApiError::Forbidden);
  }

  let now = now_ms();
  let past_ttl = job.expires_at.is_some_and(|e| e < now);
  if job.status == ExportStatus::Expired
    || (job.status == ExportStatus::Ready && past_ttl)
  {
    return Err(ApiError::Gone {
      code:    "export_expired",
      message: "Export has expired".to_string(),
    });
  }

  let download_url = match (&job.status, &job.file_uri) {
    (ExportStatus::Ready, Some(uri)) => {
      let resolved =
        state
          .resolver
          .resolve(uri, state.config.signed_url_ttl_ms, now);
      tracing::info!(
        request_id = %Uuid::new_v4(),
        project_id = %project_id,
        user_id = %caller.user_id,
        export_id = %export_id,
        action = "export_download_url",
        "download url issued"
      );
      Some(resolved.url)
    }
    _ => None,
  };

  Ok(Json(json!({
    "export_id": job.export_id,
    "status": job.status,
    "format": job.format,
    "mode": job.mode,
    "label_policy": job.label_policy,
    "created_at": job.created_at,
    "completed_at": job.completed_at,
    "error_code": job.error_code,
    "manifest": job.manifest,
    "download_url": download_url,
    "expires_at": job.expires_at,
  })))
}

// ─── Cancel ───────────────────────────────────────────────────────────────────

/// `DELETE /api/v1/projects/{pid}/exports/{eid}` — idempotent.
pub async fn cancel<S>(
  State(state): State<AppState<S>>,
  caller: Caller,
  Path((project_id, export_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<serde_json::Value>, ApiError>
where
  S: DeckStore + 'static,
{
  let role = role_or_404(&state, project_id, &caller.user_id).await?;
  let policy = project_policy(&state, project_id).await?;

  let job = state
    .store
    .get_export_job(project_id, export_id)
    .await
    .map_err(ApiError::store)?
    .ok_or(ApiError::NotFound)?;

  let own = job.requested_by == caller.user_id;
  if !role.can_cancel_export(own, &policy) {
    return Err(ApiError::Forbidden);
  }

  let outcome = state
    .store
    .cancel_export_job(project_id, export_id, now_ms())
    .await
    .map_err(ApiError::store)?;

  match outcome {
    CancelOutcome::Cancelled => Ok(Json(json!({
      "status": "failed",
      "error": { "code": triagedeck_core::export::ERROR_CANCELLED },
    }))),
    CancelOutcome::AlreadyTerminal(status) => {
      Ok(Json(json!({ "status": status })))
    }
    CancelOutcome::ReadyConflict => Err(ApiError::Conflict {
      code:    "export_ready",
      message: "Cannot cancel a ready export".to_string(),
    }),
    CancelOutcome::NotFound => Err(ApiError::NotFound),
  }
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

async fn project_policy<S>(
  state: &AppState<S>,
  project_id: Uuid,
) -> Result<OrgPolicy, ApiError>
where
  S: DeckStore + 'static,
{
  let project = state
    .store
    .get_project(project_id)
    .await
    .map_err(ApiError::store)?
    .ok_or(ApiError::NotFound)?;
  Ok(OrgPolicy::from(&project.config))
}
