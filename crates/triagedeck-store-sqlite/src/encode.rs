//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! UUIDs are stored as hyphenated lowercase strings — their lexicographic
//! order equals `Uuid: Ord`, which the event-id tie-break relies on.
//! Structured fields (decision schema, config, metadata, filters, manifests)
//! are stored as compact JSON.

use triagedeck_core::{
  access::Role,
  decision::DecisionLatest,
  export::{
    ExportFilters, ExportFormat, ExportJob, ExportMode, ExportRow,
    ExportStatus, LabelPolicy,
  },
  item::{Item, ItemVariant, MediaType},
  project::Project,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── Enum columns ────────────────────────────────────────────────────────────

pub fn encode_media_type(m: MediaType) -> &'static str { m.as_str() }

pub fn decode_media_type(s: &str) -> Result<MediaType> {
  match s {
    "image" => Ok(MediaType::Image),
    "video" => Ok(MediaType::Video),
    "pdf" => Ok(MediaType::Pdf),
    "other" => Ok(MediaType::Other),
    other => Err(Error::Decode(format!("unknown media type: {other:?}"))),
  }
}

pub fn decode_role(s: &str) -> Result<Role> { Ok(Role::parse(s)?) }

pub fn encode_status(s: ExportStatus) -> &'static str { s.as_str() }

pub fn decode_status(s: &str) -> Result<ExportStatus> {
  match s {
    "queued" => Ok(ExportStatus::Queued),
    "running" => Ok(ExportStatus::Running),
    "ready" => Ok(ExportStatus::Ready),
    "failed" => Ok(ExportStatus::Failed),
    "expired" => Ok(ExportStatus::Expired),
    other => Err(Error::Decode(format!("unknown export status: {other:?}"))),
  }
}

pub fn encode_mode(m: ExportMode) -> &'static str {
  match m {
    ExportMode::LabelsOnly => "labels_only",
    ExportMode::LabelsPlusUnlabeled => "labels_plus_unlabeled",
  }
}

pub fn decode_mode(s: &str) -> Result<ExportMode> {
  match s {
    "labels_only" => Ok(ExportMode::LabelsOnly),
    "labels_plus_unlabeled" => Ok(ExportMode::LabelsPlusUnlabeled),
    other => Err(Error::Decode(format!("unknown export mode: {other:?}"))),
  }
}

pub fn encode_label_policy(p: LabelPolicy) -> &'static str {
  match p {
    LabelPolicy::LatestPerUser => "latest_per_user",
  }
}

pub fn decode_label_policy(s: &str) -> Result<LabelPolicy> {
  match s {
    "latest_per_user" => Ok(LabelPolicy::LatestPerUser),
    other => Err(Error::Decode(format!("unknown label policy: {other:?}"))),
  }
}

pub fn encode_format(f: ExportFormat) -> &'static str { f.as_str() }

pub fn decode_format(s: &str) -> Result<ExportFormat> {
  match s {
    "jsonl" => Ok(ExportFormat::Jsonl),
    "csv" => Ok(ExportFormat::Csv),
    "parquet" => Ok(ExportFormat::Parquet),
    other => Err(Error::Decode(format!("unknown export format: {other:?}"))),
  }
}

// ─── JSON columns ────────────────────────────────────────────────────────────

pub fn encode_json<T: serde::Serialize>(value: &T) -> Result<String> {
  Ok(serde_json::to_string(value)?)
}

pub fn decode_json<T: serde::de::DeserializeOwned>(s: &str) -> Result<T> {
  Ok(serde_json::from_str(s)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `project` row.
pub struct RawProject {
  pub id:                   String,
  pub organization_id:      String,
  pub name:                 String,
  pub slug:                 String,
  pub decision_schema_json: String,
  pub config_json:          String,
  pub created_at:           i64,
  pub deleted_at:           Option<i64>,
}

impl RawProject {
  pub fn into_project(self) -> Result<Project> {
    Ok(Project {
      project_id:      decode_uuid(&self.id)?,
      organization_id: decode_uuid(&self.organization_id)?,
      name:            self.name,
      slug:            self.slug,
      decision_schema: decode_json(&self.decision_schema_json)?,
      config:          decode_json(&self.config_json)?,
      created_at:      self.created_at,
      deleted_at:      self.deleted_at,
    })
  }
}

/// Raw strings read directly from an `item` row.
pub struct RawItem {
  pub id:            String,
  pub project_id:    String,
  pub external_id:   String,
  pub media_type:    String,
  pub logical_uri:   String,
  pub sort_key:      String,
  pub metadata_json: String,
  pub created_at:    i64,
  pub deleted_at:    Option<i64>,
}

impl RawItem {
  pub fn into_item(self) -> Result<Item> {
    Ok(Item {
      item_id:     decode_uuid(&self.id)?,
      project_id:  decode_uuid(&self.project_id)?,
      external_id: self.external_id,
      media_type:  decode_media_type(&self.media_type)?,
      logical_uri: self.logical_uri,
      sort_key:    self.sort_key,
      metadata:    decode_json(&self.metadata_json)?,
      created_at:  self.created_at,
      deleted_at:  self.deleted_at,
    })
  }
}

/// Raw strings read directly from an `item_variant` row.
pub struct RawVariant {
  pub item_id:       String,
  pub variant_key:   String,
  pub label:         String,
  pub logical_uri:   String,
  pub sort_order:    i32,
  pub metadata_json: String,
}

impl RawVariant {
  pub fn into_variant(self) -> Result<ItemVariant> {
    Ok(ItemVariant {
      item_id:     decode_uuid(&self.item_id)?,
      variant_key: self.variant_key,
      label:       self.label,
      logical_uri: self.logical_uri,
      sort_order:  self.sort_order,
      metadata:    decode_json(&self.metadata_json)?,
    })
  }
}

/// Raw strings read directly from a `decision_latest` row.
pub struct RawLatest {
  pub project_id:          String,
  pub user_id:             String,
  pub item_id:             String,
  pub event_id:            String,
  pub decision_id:         String,
  pub note:                String,
  pub ts_client:           i64,
  pub ts_client_effective: i64,
  pub ts_server:           i64,
}

impl RawLatest {
  pub fn into_latest(self) -> Result<DecisionLatest> {
    Ok(DecisionLatest {
      project_id:          decode_uuid(&self.project_id)?,
      user_id:             self.user_id,
      item_id:             decode_uuid(&self.item_id)?,
      event_id:            decode_uuid(&self.event_id)?,
      decision_id:         self.decision_id,
      note:                self.note,
      ts_client:           self.ts_client,
      ts_client_effective: self.ts_client_effective,
      ts_server:           self.ts_server,
    })
  }
}

/// Raw strings read directly from an `export_job` row.
pub struct RawExportJob {
  pub id:                  String,
  pub project_id:          String,
  pub requested_by:        String,
  pub status:              String,
  pub mode:                String,
  pub label_policy:        String,
  pub format:              String,
  pub filters_json:        String,
  pub include_fields_json: String,
  pub manifest_json:       Option<String>,
  pub file_uri:            Option<String>,
  pub error_code:          Option<String>,
  pub expires_at:          Option<i64>,
  pub created_at:          i64,
  pub completed_at:        Option<i64>,
}

impl RawExportJob {
  pub fn into_job(self) -> Result<ExportJob> {
    let filters: ExportFilters = decode_json(&self.filters_json)?;
    let include_fields: Vec<String> = decode_json(&self.include_fields_json)?;
    let manifest = self
      .manifest_json
      .as_deref()
      .map(decode_json::<serde_json::Value>)
      .transpose()?;
    Ok(ExportJob {
      export_id: decode_uuid(&self.id)?,
      project_id: decode_uuid(&self.project_id)?,
      requested_by: self.requested_by,
      status: decode_status(&self.status)?,
      mode: decode_mode(&self.mode)?,
      label_policy: decode_label_policy(&self.label_policy)?,
      format: decode_format(&self.format)?,
      filters,
      include_fields,
      manifest,
      file_uri: self.file_uri,
      error_code: self.error_code,
      expires_at: self.expires_at,
      created_at: self.created_at,
      completed_at: self.completed_at,
    })
  }
}

/// Raw strings read for one export-snapshot row (latest joined with item, or
/// a bare unlabeled item with the decision side absent).
pub struct RawExportRow {
  pub item_id:             String,
  pub external_id:         String,
  pub logical_uri:         String,
  pub metadata_json:       String,
  pub user_id:             Option<String>,
  pub event_id:            Option<String>,
  pub decision_id:         Option<String>,
  pub note:                Option<String>,
  pub ts_client:           Option<i64>,
  pub ts_client_effective: Option<i64>,
  pub ts_server:           Option<i64>,
}

impl RawExportRow {
  pub fn into_row(self) -> Result<ExportRow> {
    Ok(ExportRow {
      item_id:             decode_uuid(&self.item_id)?,
      external_id:         self.external_id,
      logical_uri:         self.logical_uri,
      metadata:            decode_json(&self.metadata_json)?,
      user_id:             self.user_id,
      event_id:            self
        .event_id
        .as_deref()
        .map(decode_uuid)
        .transpose()?,
      decision_id:         self.decision_id,
      note:                self.note,
      ts_client:           self.ts_client,
      ts_client_effective: self.ts_client_effective,
      ts_server:           self.ts_server,
    })
  }
}
