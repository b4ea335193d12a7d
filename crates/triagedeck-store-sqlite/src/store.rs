//! [`SqliteStore`] — the SQLite implementation of [`DeckStore`].

use std::{collections::HashMap, path::Path};

use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use triagedeck_core::{
  access::Role,
  decision::{DecisionEvent, DecisionLatest},
  export::{self, ExportJob, ExportMode, ExportRow, ExportStatus},
  item::{Item, ItemVariant, ItemWithVariants},
  project::Project,
  store::{
    ApplyResult, CancelOutcome, DecisionKey, DeckStore, ExportKey, ItemKey,
    ProjectSummary,
  },
};

use crate::{
  Error, Result,
  encode::{
    RawExportJob, RawExportRow, RawItem, RawLatest, RawProject, RawVariant,
    decode_role, encode_format, encode_json, encode_label_policy,
    encode_media_type, encode_mode, encode_status, encode_uuid,
  },
  schema::SCHEMA,
};

const ITEM_COLS: &str = "id, project_id, external_id, media_type, \
                         logical_uri, sort_key, metadata_json, created_at, \
                         deleted_at";

const JOB_COLS: &str = "id, project_id, requested_by, status, mode, \
                        label_policy, format, filters_json, \
                        include_fields_json, manifest_json, file_uri, \
                        error_code, expires_at, created_at, completed_at";

fn item_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawItem> {
  Ok(RawItem {
    id:            row.get(0)?,
    project_id:    row.get(1)?,
    external_id:   row.get(2)?,
    media_type:    row.get(3)?,
    logical_uri:   row.get(4)?,
    sort_key:      row.get(5)?,
    metadata_json: row.get(6)?,
    created_at:    row.get(7)?,
    deleted_at:    row.get(8)?,
  })
}

fn job_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawExportJob> {
  Ok(RawExportJob {
    id:                  row.get(0)?,
    project_id:          row.get(1)?,
    requested_by:        row.get(2)?,
    status:              row.get(3)?,
    mode:                row.get(4)?,
    label_policy:        row.get(5)?,
    format:              row.get(6)?,
    filters_json:        row.get(7)?,
    include_fields_json: row.get(8)?,
    manifest_json:       row.get(9)?,
    file_uri:            row.get(10)?,
    error_code:          row.get(11)?,
    expires_at:          row.get(12)?,
    created_at:          row.get(13)?,
    completed_at:        row.get(14)?,
  })
}

/// Load variants for `item_id`, ordered `(sort_order ASC, variant_key ASC)`.
fn variants_for(
  conn: &rusqlite::Connection,
  item_id: &str,
) -> rusqlite::Result<Vec<RawVariant>> {
  let mut stmt = conn.prepare(
    "SELECT item_id, variant_key, label, logical_uri, sort_order, \
     metadata_json
     FROM item_variant WHERE item_id = ?1
     ORDER BY sort_order ASC, variant_key ASC",
  )?;
  stmt
    .query_map(rusqlite::params![item_id], |row| {
      Ok(RawVariant {
        item_id:       row.get(0)?,
        variant_key:   row.get(1)?,
        label:         row.get(2)?,
        logical_uri:   row.get(3)?,
        sort_order:    row.get(4)?,
        metadata_json: row.get(5)?,
      })
    })?
    .collect()
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A triagedeck store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Provisioning ──────────────────────────────────────────────────────────
  //
  // Admin provisioning is an external concern; these inherent methods exist
  // for the dev seed and for tests, and are not part of the DeckStore seam.

  pub async fn create_organization(
    &self,
    organization_id: Uuid,
    name: &str,
    created_at: i64,
  ) -> Result<()> {
    let id_str = encode_uuid(organization_id);
    let name = name.to_owned();
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO organization (id, name, created_at) VALUES (?1, ?2, ?3)",
          rusqlite::params![id_str, name, created_at],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  pub async fn create_project(&self, project: &Project) -> Result<()> {
    let id_str = encode_uuid(project.project_id);
    let org_str = encode_uuid(project.organization_id);
    let name = project.name.clone();
    let slug = project.slug.clone();
    let schema_json = encode_json(&project.decision_schema)?;
    let config_json = encode_json(&project.config)?;
    let created_at = project.created_at;
    let deleted_at = project.deleted_at;
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO project (id, organization_id, name, slug, \
           decision_schema_json, config_json, created_at, deleted_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            id_str,
            org_str,
            name,
            slug,
            schema_json,
            config_json,
            created_at,
            deleted_at,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  pub async fn upsert_membership(
    &self,
    project_id: Uuid,
    user_id: &str,
    role: Role,
  ) -> Result<()> {
    let pid_str = encode_uuid(project_id);
    let user = user_id.to_owned();
    let role_str = role.as_str().to_owned();
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO project_membership (project_id, user_id, role)
           VALUES (?1, ?2, ?3)
           ON CONFLICT (project_id, user_id) DO UPDATE SET role = excluded.role",
          rusqlite::params![pid_str, user, role_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  pub async fn create_item(&self, item: &Item) -> Result<()> {
    let id_str = encode_uuid(item.item_id);
    let pid_str = encode_uuid(item.project_id);
    let external_id = item.external_id.clone();
    let media_type = encode_media_type(item.media_type).to_owned();
    let logical_uri = item.logical_uri.clone();
    let sort_key = item.sort_key.clone();
    let metadata_json = encode_json(&item.metadata)?;
    let created_at = item.created_at;
    let deleted_at = item.deleted_at;
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO item (id, project_id, external_id, media_type, \
           logical_uri, sort_key, metadata_json, created_at, deleted_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
          rusqlite::params![
            id_str,
            pid_str,
            external_id,
            media_type,
            logical_uri,
            sort_key,
            metadata_json,
            created_at,
            deleted_at,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  pub async fn create_variant(&self, variant: &ItemVariant) -> Result<()> {
    let item_str = encode_uuid(variant.item_id);
    let variant_key = variant.variant_key.clone();
    let label = variant.label.clone();
    let logical_uri = variant.logical_uri.clone();
    let sort_order = variant.sort_order;
    let metadata_json = encode_json(&variant.metadata)?;
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO item_variant (item_id, variant_key, label, \
           logical_uri, sort_order, metadata_json)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![
            item_str,
            variant_key,
            label,
            logical_uri,
            sort_order,
            metadata_json,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  pub async fn soft_delete_item(
    &self,
    project_id: Uuid,
    item_id: Uuid,
    now: i64,
  ) -> Result<()> {
    let pid_str = encode_uuid(project_id);
    let id_str = encode_uuid(item_id);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE item SET deleted_at = ?3
           WHERE id = ?1 AND project_id = ?2 AND deleted_at IS NULL",
          rusqlite::params![id_str, pid_str, now],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  pub async fn soft_delete_project(
    &self,
    project_id: Uuid,
    now: i64,
  ) -> Result<()> {
    let pid_str = encode_uuid(project_id);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE project SET deleted_at = ?2
           WHERE id = ?1 AND deleted_at IS NULL",
          rusqlite::params![pid_str, now],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── DeckStore impl ──────────────────────────────────────────────────────────

impl DeckStore for SqliteStore {
  type Error = Error;

  // ── Projects & membership ─────────────────────────────────────────────────

  async fn list_projects(&self, user_id: &str) -> Result<Vec<ProjectSummary>> {
    let user = user_id.to_owned();
    let rows: Vec<(String, String, String)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT p.id, p.name, p.slug
           FROM project p
           JOIN project_membership m ON m.project_id = p.id
           WHERE m.user_id = ?1 AND p.deleted_at IS NULL
           ORDER BY p.name ASC, p.id ASC",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![user], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows
      .into_iter()
      .map(|(id, name, slug)| {
        Ok(ProjectSummary {
          project_id: crate::encode::decode_uuid(&id)?,
          name,
          slug,
        })
      })
      .collect()
  }

  async fn get_project(&self, project_id: Uuid) -> Result<Option<Project>> {
    let pid_str = encode_uuid(project_id);
    let raw: Option<RawProject> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT id, organization_id, name, slug, decision_schema_json, \
               config_json, created_at, deleted_at
               FROM project WHERE id = ?1 AND deleted_at IS NULL",
              rusqlite::params![pid_str],
              |row| {
                Ok(RawProject {
                  id:                   row.get(0)?,
                  organization_id:      row.get(1)?,
                  name:                 row.get(2)?,
                  slug:                 row.get(3)?,
                  decision_schema_json: row.get(4)?,
                  config_json:          row.get(5)?,
                  created_at:           row.get(6)?,
                  deleted_at:           row.get(7)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawProject::into_project).transpose()
  }

  async fn role_in(
    &self,
    project_id: Uuid,
    user_id: &str,
  ) -> Result<Option<Role>> {
    let pid_str = encode_uuid(project_id);
    let user = user_id.to_owned();
    let role_str: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT m.role
               FROM project_membership m
               JOIN project p ON p.id = m.project_id
               WHERE m.project_id = ?1 AND m.user_id = ?2
                 AND p.deleted_at IS NULL",
              rusqlite::params![pid_str, user],
              |row| row.get(0),
            )
            .optional()?,
        )
      })
      .await?;

    role_str.as_deref().map(decode_role).transpose()
  }

  // ── Items ─────────────────────────────────────────────────────────────────

  async fn list_items(
    &self,
    project_id: Uuid,
    after: Option<ItemKey>,
    limit: usize,
  ) -> Result<Vec<ItemWithVariants>> {
    let pid_str = encode_uuid(project_id);
    let after_sort = after.as_ref().map(|k| k.sort_key.clone());
    let after_id = after.as_ref().map(|k| encode_uuid(k.item_id));
    let limit = limit as i64;

    let raws: Vec<(RawItem, Vec<RawVariant>)> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {ITEM_COLS} FROM item
           WHERE project_id = ?1 AND deleted_at IS NULL
             AND (?2 IS NULL OR sort_key > ?2
                  OR (sort_key = ?2 AND id > ?3))
           ORDER BY sort_key ASC, id ASC
           LIMIT ?4"
        );
        let mut stmt = conn.prepare(&sql)?;
        let items = stmt
          .query_map(
            rusqlite::params![pid_str, after_sort, after_id, limit],
            item_from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut out = Vec::with_capacity(items.len());
        for item in items {
          let variants = variants_for(conn, &item.id)?;
          out.push((item, variants));
        }
        Ok(out)
      })
      .await?;

    raws
      .into_iter()
      .map(|(item, variants)| {
        Ok(ItemWithVariants {
          item:     item.into_item()?,
          variants: variants
            .into_iter()
            .map(RawVariant::into_variant)
            .collect::<Result<_>>()?,
        })
      })
      .collect()
  }

  async fn get_item(
    &self,
    project_id: Uuid,
    item_id: Uuid,
  ) -> Result<Option<ItemWithVariants>> {
    let pid_str = encode_uuid(project_id);
    let id_str = encode_uuid(item_id);

    let raw: Option<(RawItem, Vec<RawVariant>)> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {ITEM_COLS} FROM item
           WHERE id = ?1 AND project_id = ?2 AND deleted_at IS NULL"
        );
        let item = conn
          .query_row(&sql, rusqlite::params![id_str, pid_str], item_from_row)
          .optional()?;
        match item {
          Some(item) => {
            let variants = variants_for(conn, &item.id)?;
            Ok(Some((item, variants)))
          }
          None => Ok(None),
        }
      })
      .await?;

    raw
      .map(|(item, variants)| {
        Ok(ItemWithVariants {
          item:     item.into_item()?,
          variants: variants
            .into_iter()
            .map(RawVariant::into_variant)
            .collect::<Result<_>>()?,
        })
      })
      .transpose()
  }

  async fn has_item(&self, project_id: Uuid, item_id: Uuid) -> Result<bool> {
    let pid_str = encode_uuid(project_id);
    let id_str = encode_uuid(item_id);
    let found: bool = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT 1 FROM item
               WHERE id = ?1 AND project_id = ?2 AND deleted_at IS NULL",
              rusqlite::params![id_str, pid_str],
              |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false),
        )
      })
      .await?;
    Ok(found)
  }

  // ── Decisions ─────────────────────────────────────────────────────────────

  async fn apply_event(&self, event: DecisionEvent) -> Result<ApplyResult> {
    let id_str = encode_uuid(event.id);
    let pid_str = encode_uuid(event.project_id);
    let user = event.user_id.clone();
    let event_id_str = encode_uuid(event.event_id);
    let item_str = encode_uuid(event.item_id);
    let decision_id = event.decision_id.clone();
    let note = event.note.clone();
    let ts_client = event.ts_client;
    let ts_client_effective = event.ts_client_effective;
    let ts_server = event.ts_server;

    let result: ApplyResult = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let dup = tx
          .query_row(
            "SELECT 1 FROM decision_event
             WHERE project_id = ?1 AND user_id = ?2 AND event_id = ?3",
            rusqlite::params![pid_str, user, event_id_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if dup {
          return Ok(ApplyResult::Duplicate);
        }

        let inserted = tx.execute(
          "INSERT INTO decision_event (id, project_id, user_id, event_id, \
           item_id, decision_id, note, ts_client, ts_client_effective, \
           ts_server)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
          rusqlite::params![
            id_str,
            pid_str,
            user,
            event_id_str,
            item_str,
            decision_id,
            note,
            ts_client,
            ts_client_effective,
            ts_server,
          ],
        );
        match inserted {
          Ok(_) => {}
          Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
          {
            // A concurrent writer committed the same idempotency key first.
            return Ok(ApplyResult::Duplicate);
          }
          Err(e) => return Err(e.into()),
        }

        let incumbent: Option<(i64, i64, String)> = tx
          .query_row(
            "SELECT ts_client_effective, ts_server, event_id
             FROM decision_latest
             WHERE project_id = ?1 AND user_id = ?2 AND item_id = ?3",
            rusqlite::params![pid_str, user, item_str],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
          )
          .optional()?;

        let wins = match &incumbent {
          None => true,
          Some((tce, tss, eid)) => {
            (ts_client_effective, ts_server, event_id_str.as_str())
              > (*tce, *tss, eid.as_str())
          }
        };

        if wins {
          tx.execute(
            "INSERT INTO decision_latest (project_id, user_id, item_id, \
             event_id, decision_id, note, ts_client, ts_client_effective, \
             ts_server)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT (project_id, user_id, item_id) DO UPDATE SET
               event_id            = excluded.event_id,
               decision_id         = excluded.decision_id,
               note                = excluded.note,
               ts_client           = excluded.ts_client,
               ts_client_effective = excluded.ts_client_effective,
               ts_server           = excluded.ts_server",
            rusqlite::params![
              pid_str,
              user,
              item_str,
              event_id_str,
              decision_id,
              note,
              ts_client,
              ts_client_effective,
              ts_server,
            ],
          )?;
        }

        tx.commit()?;
        Ok(ApplyResult::Accepted)
      })
      .await?;

    Ok(result)
  }

  async fn list_latest(
    &self,
    project_id: Uuid,
    user_id: &str,
    after: Option<DecisionKey>,
    limit: usize,
  ) -> Result<Vec<DecisionLatest>> {
    let pid_str = encode_uuid(project_id);
    let user = user_id.to_owned();
    let after_ts = after.map(|k| k.ts_server);
    let after_id = after.map(|k| encode_uuid(k.item_id));
    let limit = limit as i64;

    let raws: Vec<RawLatest> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT l.project_id, l.user_id, l.item_id, l.event_id, \
           l.decision_id, l.note, l.ts_client, l.ts_client_effective, \
           l.ts_server
           FROM decision_latest l
           JOIN item i ON i.id = l.item_id
           WHERE l.project_id = ?1 AND l.user_id = ?2
             AND i.deleted_at IS NULL
             AND (?3 IS NULL OR l.ts_server > ?3
                  OR (l.ts_server = ?3 AND l.item_id > ?4))
           ORDER BY l.ts_server ASC, l.item_id ASC
           LIMIT ?5",
        )?;
        let rows = stmt
          .query_map(
            rusqlite::params![pid_str, user, after_ts, after_id, limit],
            |row| {
              Ok(RawLatest {
                project_id:          row.get(0)?,
                user_id:             row.get(1)?,
                item_id:             row.get(2)?,
                event_id:            row.get(3)?,
                decision_id:         row.get(4)?,
                note:                row.get(5)?,
                ts_client:           row.get(6)?,
                ts_client_effective: row.get(7)?,
                ts_server:           row.get(8)?,
              })
            },
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawLatest::into_latest).collect()
  }

  async fn rebuild_latest(&self, project_id: Uuid) -> Result<u64> {
    let pid_str = encode_uuid(project_id);

    let written: u64 = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        // Replay every event, folding winners per (user_id, item_id) under
        // the same total order incremental ingestion uses.
        let mut winners: HashMap<(String, String), RawLatest> = HashMap::new();
        {
          let mut stmt = tx.prepare(
            "SELECT project_id, user_id, item_id, event_id, decision_id, \
             note, ts_client, ts_client_effective, ts_server
             FROM decision_event WHERE project_id = ?1",
          )?;
          let rows = stmt.query_map(rusqlite::params![pid_str], |row| {
            Ok(RawLatest {
              project_id:          row.get(0)?,
              user_id:             row.get(1)?,
              item_id:             row.get(2)?,
              event_id:            row.get(3)?,
              decision_id:         row.get(4)?,
              note:                row.get(5)?,
              ts_client:           row.get(6)?,
              ts_client_effective: row.get(7)?,
              ts_server:           row.get(8)?,
            })
          })?;
          for row in rows {
            let row = row?;
            let key = (row.user_id.clone(), row.item_id.clone());
            match winners.get(&key) {
              Some(cur)
                if (cur.ts_client_effective, cur.ts_server, &cur.event_id)
                  >= (row.ts_client_effective, row.ts_server, &row.event_id) =>
              {}
              _ => {
                winners.insert(key, row);
              }
            }
          }
        }

        tx.execute(
          "DELETE FROM decision_latest WHERE project_id = ?1",
          rusqlite::params![pid_str],
        )?;

        let mut count = 0u64;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO decision_latest (project_id, user_id, item_id, \
             event_id, decision_id, note, ts_client, ts_client_effective, \
             ts_server)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
          )?;
          for winner in winners.values() {
            stmt.execute(rusqlite::params![
              winner.project_id,
              winner.user_id,
              winner.item_id,
              winner.event_id,
              winner.decision_id,
              winner.note,
              winner.ts_client,
              winner.ts_client_effective,
              winner.ts_server,
            ])?;
            count += 1;
          }
        }

        tx.commit()?;
        Ok(count)
      })
      .await?;

    Ok(written)
  }

  // ── Export jobs ───────────────────────────────────────────────────────────

  async fn create_export_job(&self, job: ExportJob) -> Result<()> {
    let id_str = encode_uuid(job.export_id);
    let pid_str = encode_uuid(job.project_id);
    let requested_by = job.requested_by.clone();
    let status = encode_status(job.status).to_owned();
    let mode = encode_mode(job.mode).to_owned();
    let label_policy = encode_label_policy(job.label_policy).to_owned();
    let format = encode_format(job.format).to_owned();
    let filters_json = encode_json(&job.filters)?;
    let include_fields_json = encode_json(&job.include_fields)?;
    let manifest_json =
      job.manifest.as_ref().map(encode_json).transpose()?;
    let file_uri = job.file_uri.clone();
    let error_code = job.error_code.clone();
    let expires_at = job.expires_at;
    let created_at = job.created_at;
    let completed_at = job.completed_at;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO export_job (id, project_id, requested_by, status, \
           mode, label_policy, format, filters_json, include_fields_json, \
           manifest_json, file_uri, error_code, expires_at, created_at, \
           completed_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, \
           ?14, ?15)",
          rusqlite::params![
            id_str,
            pid_str,
            requested_by,
            status,
            mode,
            label_policy,
            format,
            filters_json,
            include_fields_json,
            manifest_json,
            file_uri,
            error_code,
            expires_at,
            created_at,
            completed_at,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_export_job(
    &self,
    project_id: Uuid,
    export_id: Uuid,
  ) -> Result<Option<ExportJob>> {
    let pid_str = encode_uuid(project_id);
    let id_str = encode_uuid(export_id);

    let raw: Option<RawExportJob> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {JOB_COLS} FROM export_job
           WHERE id = ?1 AND project_id = ?2"
        );
        Ok(
          conn
            .query_row(&sql, rusqlite::params![id_str, pid_str], job_from_row)
            .optional()?,
        )
      })
      .await?;

    raw.map(RawExportJob::into_job).transpose()
  }

  async fn list_export_jobs(
    &self,
    project_id: Uuid,
    after: Option<ExportKey>,
    limit: usize,
  ) -> Result<Vec<ExportJob>> {
    let pid_str = encode_uuid(project_id);
    let after_created = after.map(|k| k.created_at);
    let after_id = after.map(|k| encode_uuid(k.export_id));
    let limit = limit as i64;

    let raws: Vec<RawExportJob> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {JOB_COLS} FROM export_job
           WHERE project_id = ?1
             AND (?2 IS NULL OR created_at < ?2
                  OR (created_at = ?2 AND id < ?3))
           ORDER BY created_at DESC, id DESC
           LIMIT ?4"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(
            rusqlite::params![pid_str, after_created, after_id, limit],
            job_from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawExportJob::into_job).collect()
  }

  async fn count_active_exports(
    &self,
    project_id: Uuid,
    requester: &str,
  ) -> Result<u64> {
    let pid_str = encode_uuid(project_id);
    let requester = requester.to_owned();
    let count: i64 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*) FROM export_job
           WHERE project_id = ?1 AND requested_by = ?2
             AND status IN ('queued', 'running')",
          rusqlite::params![pid_str, requester],
          |row| row.get(0),
        )?)
      })
      .await?;
    Ok(count as u64)
  }

  async fn cancel_export_job(
    &self,
    project_id: Uuid,
    export_id: Uuid,
    now: i64,
  ) -> Result<CancelOutcome> {
    let pid_str = encode_uuid(project_id);
    let id_str = encode_uuid(export_id);

    let outcome: CancelOutcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let status: Option<String> = tx
          .query_row(
            "SELECT status FROM export_job
             WHERE id = ?1 AND project_id = ?2",
            rusqlite::params![id_str, pid_str],
            |row| row.get(0),
          )
          .optional()?;

        let outcome = match status.as_deref() {
          None => CancelOutcome::NotFound,
          Some("ready") => CancelOutcome::ReadyConflict,
          Some("failed") => {
            CancelOutcome::AlreadyTerminal(ExportStatus::Failed)
          }
          Some("expired") => {
            CancelOutcome::AlreadyTerminal(ExportStatus::Expired)
          }
          Some(_) => {
            tx.execute(
              "UPDATE export_job
               SET status = 'failed', error_code = ?3, completed_at = ?4
               WHERE id = ?1 AND project_id = ?2
                 AND status IN ('queued', 'running')",
              rusqlite::params![
                id_str,
                pid_str,
                export::ERROR_CANCELLED,
                now
              ],
            )?;
            CancelOutcome::Cancelled
          }
        };
        tx.commit()?;
        Ok(outcome)
      })
      .await?;

    Ok(outcome)
  }

  // ── Worker-side operations ────────────────────────────────────────────────

  async fn claim_next_export_job(&self) -> Result<Option<ExportJob>> {
    let raw: Option<RawExportJob> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let sql = format!(
          "SELECT {JOB_COLS} FROM export_job
           WHERE status = 'queued'
           ORDER BY created_at ASC, id ASC
           LIMIT 1"
        );
        let job = tx.query_row(&sql, [], job_from_row).optional()?;

        let job = match job {
          Some(mut job) => {
            let changed = tx.execute(
              "UPDATE export_job SET status = 'running'
               WHERE id = ?1 AND status = 'queued'",
              rusqlite::params![job.id],
            )?;
            if changed == 1 {
              job.status = "running".to_owned();
              Some(job)
            } else {
              None
            }
          }
          None => None,
        };

        tx.commit()?;
        Ok(job)
      })
      .await?;

    raw.map(RawExportJob::into_job).transpose()
  }

  async fn export_status(
    &self,
    export_id: Uuid,
  ) -> Result<Option<ExportStatus>> {
    let id_str = encode_uuid(export_id);
    let status: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT status FROM export_job WHERE id = ?1",
              rusqlite::params![id_str],
              |row| row.get(0),
            )
            .optional()?,
        )
      })
      .await?;
    status
      .as_deref()
      .map(crate::encode::decode_status)
      .transpose()
  }

  async fn complete_export_job(
    &self,
    export_id: Uuid,
    manifest: serde_json::Value,
    file_uri: String,
    completed_at: i64,
    expires_at: i64,
  ) -> Result<bool> {
    let id_str = encode_uuid(export_id);
    let manifest_json = encode_json(&manifest)?;
    let published: bool = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE export_job
           SET status = 'ready', manifest_json = ?2, file_uri = ?3,
               completed_at = ?4, expires_at = ?5
           WHERE id = ?1 AND status = 'running'",
          rusqlite::params![
            id_str,
            manifest_json,
            file_uri,
            completed_at,
            expires_at
          ],
        )?;
        Ok(changed == 1)
      })
      .await?;
    Ok(published)
  }

  async fn fail_export_job(
    &self,
    export_id: Uuid,
    error_code: &str,
    completed_at: i64,
  ) -> Result<bool> {
    let id_str = encode_uuid(export_id);
    let code = error_code.to_owned();
    let failed: bool = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE export_job
           SET status = 'failed', error_code = ?2, completed_at = ?3
           WHERE id = ?1 AND status = 'running'",
          rusqlite::params![id_str, code, completed_at],
        )?;
        Ok(changed == 1)
      })
      .await?;
    Ok(failed)
  }

  async fn expire_ready_jobs(&self, now: i64) -> Result<Vec<ExportJob>> {
    let raws: Vec<RawExportJob> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let sql = format!(
          "SELECT {JOB_COLS} FROM export_job
           WHERE status = 'ready' AND expires_at IS NOT NULL
             AND expires_at < ?1"
        );
        let jobs = {
          let mut stmt = tx.prepare(&sql)?;
          stmt
            .query_map(rusqlite::params![now], job_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        for job in &jobs {
          tx.execute(
            "UPDATE export_job SET status = 'expired'
             WHERE id = ?1 AND status = 'ready'",
            rusqlite::params![job.id],
          )?;
        }
        tx.commit()?;
        Ok(jobs)
      })
      .await?;

    raws
      .into_iter()
      .map(|mut raw| {
        raw.status = "expired".to_owned();
        raw.into_job()
      })
      .collect()
  }

  async fn export_snapshot(
    &self,
    project_id: Uuid,
    mode: ExportMode,
  ) -> Result<Vec<ExportRow>> {
    let pid_str = encode_uuid(project_id);
    let include_unlabeled = mode == ExportMode::LabelsPlusUnlabeled;

    let raws: Vec<RawExportRow> = self
      .conn
      .call(move |conn| {
        let mut rows: Vec<RawExportRow> = Vec::new();

        let mut stmt = conn.prepare(
          "SELECT l.item_id, i.external_id, i.logical_uri, i.metadata_json, \
           l.user_id, l.event_id, l.decision_id, l.note, l.ts_client, \
           l.ts_client_effective, l.ts_server
           FROM decision_latest l
           JOIN item i ON i.id = l.item_id
           WHERE l.project_id = ?1 AND i.deleted_at IS NULL
           ORDER BY l.ts_server ASC, l.item_id ASC, l.user_id ASC",
        )?;
        let labeled = stmt.query_map(rusqlite::params![pid_str], |row| {
          Ok(RawExportRow {
            item_id:             row.get(0)?,
            external_id:         row.get(1)?,
            logical_uri:         row.get(2)?,
            metadata_json:       row.get(3)?,
            user_id:             row.get(4)?,
            event_id:            row.get(5)?,
            decision_id:         row.get(6)?,
            note:                row.get(7)?,
            ts_client:           row.get(8)?,
            ts_client_effective: row.get(9)?,
            ts_server:           row.get(10)?,
          })
        })?;
        for row in labeled {
          rows.push(row?);
        }

        if include_unlabeled {
          let mut stmt = conn.prepare(
            "SELECT i.id, i.external_id, i.logical_uri, i.metadata_json
             FROM item i
             WHERE i.project_id = ?1 AND i.deleted_at IS NULL
               AND NOT EXISTS (
                 SELECT 1 FROM decision_latest l
                 WHERE l.project_id = i.project_id AND l.item_id = i.id
               )
             ORDER BY i.id ASC",
          )?;
          let unlabeled = stmt.query_map(rusqlite::params![pid_str], |row| {
            Ok(RawExportRow {
              item_id:             row.get(0)?,
              external_id:         row.get(1)?,
              logical_uri:         row.get(2)?,
              metadata_json:       row.get(3)?,
              user_id:             None,
              event_id:            None,
              decision_id:         None,
              note:                None,
              ts_client:           None,
              ts_client_effective: None,
              ts_server:           None,
            })
          })?;
          for row in unlabeled {
            rows.push(row?);
          }
        }

        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawExportRow::into_row).collect()
  }
}
