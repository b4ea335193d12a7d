//! Caller identity extraction and the membership gate.
//!
//! Authentication itself is an external adapter: the fronting proxy validates
//! the session and injects `x-user-id` (the dev adapter trusts it directly).
//! This module only resolves the identity and the caller's project role.
//! Non-membership — and a soft-deleted project — surface as `404`, never
//! `403`, so outsiders cannot enumerate project ids.

use axum::{extract::FromRequestParts, http::request::Parts};
use triagedeck_core::{access::Role, store::DeckStore};
use uuid::Uuid;

use crate::{AppState, error::ApiError};

/// The authenticated caller, as asserted by the auth adapter.
#[derive(Debug, Clone)]
pub struct Caller {
  pub user_id: String,
  pub email:   String,
}

impl<S> FromRequestParts<AppState<S>> for Caller
where
  S: DeckStore + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    _state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    let user_id = parts
      .headers
      .get("x-user-id")
      .and_then(|v| v.to_str().ok())
      .filter(|v| !v.is_empty())
      .ok_or(ApiError::Unauthorized)?
      .to_string();
    // The dev adapter uses the email address as the user id.
    Ok(Caller {
      email: user_id.clone(),
      user_id,
    })
  }
}

/// Resolve the caller's role in a project, or `404` for non-members.
pub async fn role_or_404<S>(
  state: &AppState<S>,
  project_id: Uuid,
  user_id: &str,
) -> Result<Role, ApiError>
where
  S: DeckStore,
{
  state
    .store
    .role_in(project_id, user_id)
    .await
    .map_err(ApiError::store)?
    .ok_or(ApiError::NotFound)
}
