//! Items and their variants.
//!
//! An item is immutable except for soft-deletion. Its media is referenced by
//! a *logical URI* — a stable, unsigned reference that is persisted and
//! exported; browser-usable URLs are derived from it at read time by the
//! storage resolver.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The broad media category of an item, used by clients to pick a renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
  Image,
  Video,
  Pdf,
  Other,
}

impl MediaType {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Image => "image",
      Self::Video => "video",
      Self::Pdf => "pdf",
      Self::Other => "other",
    }
  }
}

/// A reviewable unit of media within a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
  pub item_id:     Uuid,
  pub project_id:  Uuid,
  /// Caller-stable identifier from the ingesting pipeline, e.g. `img_0042`.
  pub external_id: String,
  pub media_type:  MediaType,
  pub logical_uri: String,
  /// Opaque ordering key; items page in `(sort_key, item_id)` order.
  pub sort_key:    String,
  pub metadata:    serde_json::Value,
  pub created_at:  i64,
  pub deleted_at:  Option<i64>,
}

/// An alternative rendition of an item (e.g. "before"/"after").
/// Keyed by `(item_id, variant_key)`; transitively soft-deleted with its item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemVariant {
  pub item_id:     Uuid,
  pub variant_key: String,
  pub label:       String,
  pub logical_uri: String,
  pub sort_order:  i32,
  pub metadata:    serde_json::Value,
}

/// An item with its variants eagerly loaded, ordered
/// `(sort_order ASC, variant_key ASC)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemWithVariants {
  pub item:     Item,
  pub variants: Vec<ItemVariant>,
}
