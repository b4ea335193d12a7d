//! Handlers for `/projects` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/projects` | Projects visible to the caller |
//! | `GET`  | `/projects/{pid}/config` | Project, decision schema, client config |

use axum::{
  Json,
  extract::{Path, State},
};
use serde::Serialize;
use serde_json::json;
use triagedeck_core::store::DeckStore;
use uuid::Uuid;

use crate::{
  AppState,
  error::ApiError,
  identity::{Caller, role_or_404},
  rate_limit::LimitClass,
};

#[derive(Debug, Serialize)]
struct ProjectBody {
  project_id: Uuid,
  name:       String,
  slug:       String,
}

/// `GET /api/v1/projects`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  caller: Caller,
) -> Result<Json<serde_json::Value>, ApiError>
where
  S: DeckStore + 'static,
{
  state.check_rate(&caller, LimitClass::Read)?;
  let projects = state
    .store
    .list_projects(&caller.user_id)
    .await
    .map_err(ApiError::store)?;
  let bodies: Vec<ProjectBody> = projects
    .into_iter()
    .map(|p| ProjectBody {
      project_id: p.project_id,
      name:       p.name,
      slug:       p.slug,
    })
    .collect();
  Ok(Json(json!({ "projects": bodies })))
}

/// `GET /api/v1/projects/{pid}/config`
pub async fn config<S>(
  State(state): State<AppState<S>>,
  caller: Caller,
  Path(project_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError>
where
  S: DeckStore + 'static,
{
  state.check_rate(&caller, LimitClass::Read)?;
  role_or_404(&state, project_id, &caller.user_id).await?;

  let project = state
    .store
    .get_project(project_id)
    .await
    .map_err(ApiError::store)?
    .ok_or(ApiError::NotFound)?;

  Ok(Json(json!({
    "project": {
      "project_id": project.project_id,
      "name": project.name,
      "slug": project.slug,
    },
    "decision_schema": project.decision_schema,
    "media_types_supported": project.config.media_types_supported,
    "variants_enabled": project.config.variants_enabled,
    "variant_navigation_mode": project.config.variant_navigation_mode,
    "compare_mode_enabled": project.config.compare_mode_enabled,
    "max_compare_variants": project.config.max_compare_variants,
  })))
}
