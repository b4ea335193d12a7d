//! Handlers for `/projects/{pid}/items` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/items` | Cursor-paged, default 100, max 200; variants eager |
//! | `GET`  | `/items/{iid}` | Single-item hydration for deep links |
//! | `GET`  | `/items/{iid}/url` | Signed-URL refresh, `?variant_key=` optional |

use axum::{
  Json,
  extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use triagedeck_core::{
  clock::now_ms,
  cursor::{CursorKey, View},
  item::ItemWithVariants,
  store::{DeckStore, ItemKey},
};
use uuid::Uuid;

use crate::{
  AppState,
  error::ApiError,
  identity::{Caller, role_or_404},
  pagination::{ITEMS_DEFAULT, ITEMS_MAX, PageParams, clamp_limit, decode_cursor},
  rate_limit::LimitClass,
};

// ─── Response shaping ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct VariantBody {
  variant_key: String,
  label:       String,
  /// Browser-usable URL derived from the variant's logical URI.
  uri:         String,
  sort_order:  i32,
  metadata:    serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct ItemBody {
  item_id:     Uuid,
  external_id: String,
  media_type:  triagedeck_core::item::MediaType,
  uri:         String,
  variants:    Vec<VariantBody>,
  metadata:    serde_json::Value,
}

impl<S> AppState<S> {
  fn item_body(&self, hydrated: ItemWithVariants, now: i64) -> ItemBody {
    let ttl = self.config.signed_url_ttl_ms;
    let variants = hydrated
      .variants
      .into_iter()
      .map(|v| VariantBody {
        variant_key: v.variant_key,
        label:       v.label,
        uri:         self.resolver.resolve(&v.logical_uri, ttl, now).url,
        sort_order:  v.sort_order,
        metadata:    v.metadata,
      })
      .collect();
    let item = hydrated.item;
    ItemBody {
      item_id:     item.item_id,
      external_id: item.external_id,
      media_type:  item.media_type,
      uri:         self.resolver.resolve(&item.logical_uri, ttl, now).url,
      variants,
      metadata:    item.metadata,
    }
  }
}

// ─── List ─────────────────────────────────────────────────────────────────────

/// `GET /api/v1/projects/{pid}/items?cursor&limit`
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
    View::Items,
    params.cursor.as_deref(),
    now,
  )? {
    Some(CursorKey::Items { sort_key, item_id }) => {
      Some(ItemKey { sort_key, item_id })
    }
    _ => None,
  };
  let limit = clamp_limit(params.limit, ITEMS_DEFAULT, ITEMS_MAX);

  let page = state
    .store
    .list_items(project_id, after, limit)
    .await
    .map_err(ApiError::store)?;

  let next_cursor = page.last().map(|last| {
    state.cursors.encode(
      &CursorKey::Items {
        sort_key: last.item.sort_key.clone(),
        item_id:  last.item.item_id,
      },
      now,
    )
  });
  let items: Vec<ItemBody> =
    page.into_iter().map(|iv| state.item_body(iv, now)).collect();

  Ok(Json(json!({ "items": items, "next_cursor": next_cursor })))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /api/v1/projects/{pid}/items/{iid}`
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  caller: Caller,
  Path((project_id, item_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ItemBody>, ApiError>
where
  S: DeckStore + 'static,
{
  state.check_rate(&caller, LimitClass::Read)?;
  role_or_404(&state, project_id, &caller.user_id).await?;

  let hydrated = state
    .store
    .get_item(project_id, item_id)
    .await
    .map_err(ApiError::store)?
    .ok_or(ApiError::NotFound)?;

  Ok(Json(state.item_body(hydrated, now_ms())))
}

// ─── URL refresh ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct UrlParams {
  pub variant_key: Option<String>,
}

/// `GET /api/v1/projects/{pid}/items/{iid}/url?variant_key=`
pub async fn refresh_url<S>(
  State(state): State<AppState<S>>,
  caller: Caller,
  Path((project_id, item_id)): Path<(Uuid, Uuid)>,
  Query(params): Query<UrlParams>,
) -> Result<Json<serde_json::Value>, ApiError>
where
  S: DeckStore + 'static,
{
  state.check_rate(&caller, LimitClass::Read)?;
  role_or_404(&state, project_id, &caller.user_id).await?;

  let hydrated = state
    .store
    .get_item(project_id, item_id)
    .await
    .map_err(ApiError::store)?
    .ok_or(ApiError::NotFound)?;

  let logical_uri = match &params.variant_key {
    Some(key) => hydrated
      .variants
      .iter()
      .find(|v| &v.variant_key == key)
      .map(|v| v.logical_uri.clone())
      .ok_or(ApiError::NotFound)?,
    None => hydrated.item.logical_uri.clone(),
  };

  let now = now_ms();
  let resolved =
    state
      .resolver
      .resolve(&logical_uri, state.config.signed_url_ttl_ms, now);

  Ok(Json(json!({
    "item_id": item_id,
    "uri": resolved.url,
    "expires_at": resolved.expires_at,
  })))
}
