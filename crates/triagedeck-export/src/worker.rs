//! The export worker: claim, snapshot, serialize, hash, publish.
//!
//! A small pool of workers (default 2 per process) drains the job queue via
//! the store's atomic `queued → running` claim. Cancellation is cooperative:
//! the worker re-reads job status before each bounded chunk and at publish
//! time, and discards partial output when the controller has already failed
//! the job. No request handler ever blocks on a worker — all communication
//! goes through the store.

use std::{path::PathBuf, sync::Arc, time::Duration};

use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;
use uuid::Uuid;

use triagedeck_core::{
  clock::now_ms,
  export::{self, ExportJob, ExportStatus},
  store::DeckStore,
};

use crate::{
  Error, Result, manifest::ExportManifest, serialize::DatasetWriter, snapshot,
};

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct WorkerConfig {
  /// Directory that receives dataset + manifest artifacts.
  pub artifact_dir:    PathBuf,
  /// Queue poll interval when no job is claimable.
  pub poll_interval:   Duration,
  /// Rows serialized between cancellation checks.
  pub chunk_rows:      usize,
  /// Row-count ceiling; exceeding it fails the job.
  pub max_rows:        u64,
  /// Serialized-size ceiling in bytes; exceeding it fails the job.
  pub max_bytes:       u64,
  /// Artifact lifetime after completion.
  pub artifact_ttl_ms: i64,
}

impl Default for WorkerConfig {
  fn default() -> Self {
    Self {
      artifact_dir:    PathBuf::from("data/exports"),
      poll_interval:   Duration::from_secs(2),
      chunk_rows:      1000,
      max_rows:        1_000_000,
      max_bytes:       5 * 1024 * 1024 * 1024,
      artifact_ttl_ms: 7 * 24 * 60 * 60 * 1000,
    }
  }
}

// ─── Worker ──────────────────────────────────────────────────────────────────

pub struct ExportWorker<S> {
  store:  Arc<S>,
  config: Arc<WorkerConfig>,
}

impl<S> Clone for ExportWorker<S> {
  fn clone(&self) -> Self {
    Self {
      store:  Arc::clone(&self.store),
      config: Arc::clone(&self.config),
    }
  }
}

fn box_store<E>(e: E) -> Error
where
  E: std::error::Error + Send + Sync + 'static,
{
  Error::Store(Box::new(e))
}

impl<S> ExportWorker<S>
where
  S: DeckStore + 'static,
{
  pub fn new(store: Arc<S>, config: WorkerConfig) -> Self {
    Self {
      store,
      config: Arc::new(config),
    }
  }

  /// Spawn `workers` concurrent worker loops sharing one store and config.
  pub fn spawn_pool(
    store: Arc<S>,
    config: WorkerConfig,
    workers: usize,
  ) -> Vec<JoinHandle<()>> {
    let worker = Self::new(store, config);
    (0..workers.max(1))
      .map(|_| {
        let worker = worker.clone();
        tokio::spawn(worker.run())
      })
      .collect()
  }

  /// Run forever, polling the queue when idle.
  pub async fn run(self) {
    loop {
      match self.tick().await {
        Ok(true) => {}
        Ok(false) => tokio::time::sleep(self.config.poll_interval).await,
        Err(e) => {
          tracing::warn!(error = %e, "export worker tick failed");
          tokio::time::sleep(self.config.poll_interval).await;
        }
      }
    }
  }

  /// Claim and execute at most one job. Returns whether a job was claimed.
  pub async fn tick(&self) -> Result<bool> {
    let job = self
      .store
      .claim_next_export_job()
      .await
      .map_err(box_store)?;
    let Some(job) = job else {
      return Ok(false);
    };
    let snapshot_at = now_ms();
    self.execute(job, snapshot_at).await;
    Ok(true)
  }

  async fn execute(&self, job: ExportJob, snapshot_at: i64) {
    let export_id = job.export_id;
    let project_id = job.project_id;
    let requested_by = job.requested_by.clone();

    match self.build(&job, snapshot_at).await {
      Ok(true) => {
        tracing::info!(
          export_id = %export_id,
          project_id = %project_id,
          user_id = %requested_by,
          action = "export_ready",
          "export published"
        );
      }
      Ok(false) | Err(Error::Cancelled) => {
        tracing::info!(
          export_id = %export_id,
          project_id = %project_id,
          action = "export_discarded",
          "export cancelled; partial output discarded"
        );
      }
      Err(Error::LimitExceeded) => {
        self
          .mark_failed(export_id, export::ERROR_LIMIT_EXCEEDED)
          .await;
      }
      Err(e) => {
        tracing::warn!(export_id = %export_id, error = %e, "export failed");
        self.mark_failed(export_id, export::ERROR_FAILED).await;
      }
    }
  }

  async fn mark_failed(&self, export_id: Uuid, code: &str) {
    let result = self
      .store
      .fail_export_job(export_id, code, now_ms())
      .await;
    match result {
      Ok(true) => {
        tracing::info!(export_id = %export_id, error_code = code, "export marked failed");
      }
      // The controller already moved the job out of `running`.
      Ok(false) => {}
      Err(e) => {
        tracing::warn!(export_id = %export_id, error = %e, "could not mark export failed");
      }
    }
  }

  /// Produce and publish the artifact pair. Returns `true` if the job became
  /// `ready`, `false` if cancellation won the publish race.
  async fn build(&self, job: &ExportJob, snapshot_at: i64) -> Result<bool> {
    let project = self
      .store
      .get_project(job.project_id)
      .await
      .map_err(box_store)?
      .ok_or(Error::ProjectMissing)?;

    // SQLite gives no cross-connection snapshot isolation, so the selected
    // row set is buffered here at claim time.
    let rows = self
      .store
      .export_snapshot(job.project_id, job.mode)
      .await
      .map_err(box_store)?;
    let rows = snapshot::apply_filters(rows, &job.filters);
    if rows.len() as u64 > self.config.max_rows {
      return Err(Error::LimitExceeded);
    }

    let mut writer = DatasetWriter::new(job.format, job.include_fields.clone());
    for chunk in rows.chunks(self.config.chunk_rows.max(1)) {
      self.ensure_running(job.export_id).await?;
      writer.write_rows(chunk)?;
      if writer.buffered_len() as u64 > self.config.max_bytes {
        return Err(Error::LimitExceeded);
      }
    }
    self.ensure_running(job.export_id).await?;

    let row_count = writer.rows_written();
    let dataset = writer.finish()?;
    if dataset.len() as u64 > self.config.max_bytes {
      return Err(Error::LimitExceeded);
    }

    let mut hasher = Sha256::new();
    hasher.update(&dataset);
    let sha256 = hex::encode(hasher.finalize());

    let manifest = ExportManifest {
      decision_schema_version: project.decision_schema.version,
      filters: job.filters.clone(),
      format: job.format,
      include_fields: job.include_fields.clone(),
      label_policy: job.label_policy,
      project_id: job.project_id,
      row_count,
      sha256,
      snapshot_at,
    };
    let manifest_bytes = manifest.to_canonical_json()?;

    let dataset_name =
      export::dataset_name(job.project_id, snapshot_at, job.format);
    let manifest_name = export::manifest_name(&dataset_name);
    tokio::fs::create_dir_all(&self.config.artifact_dir).await?;
    let dataset_path = self.config.artifact_dir.join(&dataset_name);
    let manifest_path = self.config.artifact_dir.join(&manifest_name);
    tokio::fs::write(&dataset_path, &dataset).await?;
    tokio::fs::write(&manifest_path, &manifest_bytes).await?;

    let completed_at = now_ms();
    let expires_at = completed_at + self.config.artifact_ttl_ms;
    let file_uri = format!("exports/{dataset_name}");
    let manifest_value = serde_json::to_value(&manifest)?;

    let published = self
      .store
      .complete_export_job(
        job.export_id,
        manifest_value,
        file_uri,
        completed_at,
        expires_at,
      )
      .await
      .map_err(box_store)?;

    if !published {
      // Cancellation won the race after the last chunk check; the artifact
      // must not outlive the failed job.
      let _ = tokio::fs::remove_file(&dataset_path).await;
      let _ = tokio::fs::remove_file(&manifest_path).await;
    }
    Ok(published)
  }

  async fn ensure_running(&self, export_id: Uuid) -> Result<()> {
    match self
      .store
      .export_status(export_id)
      .await
      .map_err(box_store)?
    {
      Some(ExportStatus::Running) => Ok(()),
      _ => Err(Error::Cancelled),
    }
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use triagedeck_core::{
    access::Role,
    decision::DecisionEvent,
    export::{
      ExportFilters, ExportFormat, ExportJob, ExportMode, ExportStatus,
      LabelPolicy,
    },
    item::{Item, MediaType},
    project::{Choice, DecisionSchema, Project, ProjectConfig},
    store::DeckStore,
  };
  use triagedeck_store_sqlite::SqliteStore;
  use uuid::Uuid;

  use super::*;

  async fn seeded_store() -> (SqliteStore, Uuid, Vec<Uuid>) {
    let s = SqliteStore::open_in_memory().await.unwrap();
    let org = Uuid::new_v4();
    s.create_organization(org, "Org", 1000).await.unwrap();
    let project = Project {
      project_id:      Uuid::new_v4(),
      organization_id: org,
      name:            "Demo".into(),
      slug:            "demo".into(),
      decision_schema: DecisionSchema {
        version:     1,
        choices:     vec![Choice {
          id:     "pass".into(),
          label:  "PASS".into(),
          hotkey: None,
        }],
        allow_notes: true,
      },
      config:          ProjectConfig::default(),
      created_at:      1000,
      deleted_at:      None,
    };
    s.create_project(&project).await.unwrap();
    s.upsert_membership(project.project_id, "rev@example.com", Role::Reviewer)
      .await
      .unwrap();

    let mut items = Vec::new();
    for n in 1..=3u32 {
      let item = Item {
        item_id:     Uuid::new_v4(),
        project_id:  project.project_id,
        external_id: format!("img_{n:04}"),
        media_type:  MediaType::Image,
        logical_uri: format!("/media/img_{n:04}.jpg"),
        sort_key:    format!("{n:08}"),
        metadata:    serde_json::json!({"subject_id": format!("s-{n}")}),
        created_at:  1000,
        deleted_at:  None,
      };
      s.create_item(&item).await.unwrap();
      items.push(item.item_id);
    }

    for (i, item_id) in items.iter().enumerate() {
      let e = DecisionEvent {
        id:                  Uuid::new_v4(),
        project_id:          project.project_id,
        user_id:             "rev@example.com".into(),
        event_id:            Uuid::new_v4(),
        item_id:             *item_id,
        decision_id:         "pass".into(),
        note:                String::new(),
        ts_client:           100 + i as i64,
        ts_client_effective: 100 + i as i64,
        ts_server:           200,
      };
      s.apply_event(e).await.unwrap();
    }

    (s, project.project_id, items)
  }

  fn queued(project_id: Uuid, format: ExportFormat, created_at: i64) -> ExportJob {
    ExportJob {
      export_id: Uuid::new_v4(),
      project_id,
      requested_by: "rev@example.com".into(),
      status: ExportStatus::Queued,
      mode: ExportMode::LabelsOnly,
      label_policy: LabelPolicy::LatestPerUser,
      format,
      filters: ExportFilters::default(),
      include_fields: vec![
        "external_id".into(),
        "decision_id".into(),
        "ts_server".into(),
      ],
      manifest: None,
      file_uri: None,
      error_code: None,
      expires_at: None,
      created_at,
      completed_at: None,
    }
  }

  fn worker(store: &SqliteStore, dir: &std::path::Path) -> ExportWorker<SqliteStore> {
    ExportWorker::new(
      Arc::new(store.clone()),
      WorkerConfig {
        artifact_dir: dir.to_path_buf(),
        ..WorkerConfig::default()
      },
    )
  }

  #[tokio::test]
  async fn happy_path_publishes_hashed_artifact() {
    let (s, pid, _) = seeded_store().await;
    let dir = tempfile::tempdir().unwrap();
    let w = worker(&s, dir.path());

    let job = queued(pid, ExportFormat::Jsonl, 100);
    s.create_export_job(job.clone()).await.unwrap();

    assert!(w.tick().await.unwrap());

    let done = s.get_export_job(pid, job.export_id).await.unwrap().unwrap();
    assert_eq!(done.status, ExportStatus::Ready);
    let manifest = done.manifest.unwrap();
    assert_eq!(manifest["row_count"], serde_json::json!(3));

    // The published dataset hashes to the recorded sha256.
    let file_uri = done.file_uri.unwrap();
    let name = file_uri.rsplit('/').next().unwrap();
    let bytes = std::fs::read(dir.path().join(name)).unwrap();
    assert_eq!(
      manifest["sha256"].as_str().unwrap(),
      crate::manifest::sha256_hex(&bytes)
    );
    assert!(done.expires_at.unwrap() > done.completed_at.unwrap());

    // The manifest sidecar exists and parses.
    let sidecar = dir
      .path()
      .join(triagedeck_core::export::manifest_name(name));
    let sidecar_json: serde_json::Value =
      serde_json::from_slice(&std::fs::read(sidecar).unwrap()).unwrap();
    assert_eq!(sidecar_json["sha256"], manifest["sha256"]);
  }

  #[tokio::test]
  async fn two_runs_over_same_snapshot_are_byte_identical() {
    let (s, pid, _) = seeded_store().await;
    let dir = tempfile::tempdir().unwrap();
    let w = worker(&s, dir.path());

    let a = queued(pid, ExportFormat::Csv, 100);
    let b = queued(pid, ExportFormat::Csv, 200);
    s.create_export_job(a.clone()).await.unwrap();
    s.create_export_job(b.clone()).await.unwrap();
    assert!(w.tick().await.unwrap());
    assert!(w.tick().await.unwrap());

    async fn dataset_bytes(
      s: &SqliteStore,
      pid: Uuid,
      id: Uuid,
      dir: &std::path::Path,
    ) -> Vec<u8> {
      let job = s.get_export_job(pid, id).await.unwrap().unwrap();
      let uri = job.file_uri.unwrap();
      let name = uri.rsplit('/').next().unwrap().to_string();
      std::fs::read(dir.join(name)).unwrap()
    }
    let bytes_a = dataset_bytes(&s, pid, a.export_id, dir.path()).await;
    let bytes_b = dataset_bytes(&s, pid, b.export_id, dir.path()).await;
    assert_eq!(bytes_a, bytes_b);
  }

  #[tokio::test]
  async fn row_limit_fails_job_with_limit_code() {
    let (s, pid, _) = seeded_store().await;
    let dir = tempfile::tempdir().unwrap();
    let w = ExportWorker::new(
      Arc::new(s.clone()),
      WorkerConfig {
        artifact_dir: dir.path().to_path_buf(),
        max_rows: 1,
        ..WorkerConfig::default()
      },
    );

    let job = queued(pid, ExportFormat::Jsonl, 100);
    s.create_export_job(job.clone()).await.unwrap();
    assert!(w.tick().await.unwrap());

    let failed = s.get_export_job(pid, job.export_id).await.unwrap().unwrap();
    assert_eq!(failed.status, ExportStatus::Failed);
    assert_eq!(
      failed.error_code.as_deref(),
      Some(export::ERROR_LIMIT_EXCEEDED)
    );
  }

  #[tokio::test]
  async fn cancellation_mid_run_discards_output() {
    let (s, pid, _) = seeded_store().await;
    let dir = tempfile::tempdir().unwrap();
    let w = worker(&s, dir.path());

    let job = queued(pid, ExportFormat::Jsonl, 100);
    s.create_export_job(job.clone()).await.unwrap();

    // Claim as the worker would, then let the controller cancel before the
    // worker reaches its first chunk boundary.
    let claimed = s.claim_next_export_job().await.unwrap().unwrap();
    s.cancel_export_job(pid, job.export_id, 500).await.unwrap();

    w.execute(claimed, now_ms()).await;

    let row = s.get_export_job(pid, job.export_id).await.unwrap().unwrap();
    assert_eq!(row.status, ExportStatus::Failed);
    assert_eq!(row.error_code.as_deref(), Some(export::ERROR_CANCELLED));
    assert!(row.file_uri.is_none());
    // No artifact bytes were published.
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
  }

  #[tokio::test]
  async fn parquet_export_publishes_valid_file() {
    let (s, pid, _) = seeded_store().await;
    let dir = tempfile::tempdir().unwrap();
    let w = worker(&s, dir.path());

    let job = queued(pid, ExportFormat::Parquet, 100);
    s.create_export_job(job.clone()).await.unwrap();
    assert!(w.tick().await.unwrap());

    let done = s.get_export_job(pid, job.export_id).await.unwrap().unwrap();
    assert_eq!(done.status, ExportStatus::Ready);
    let uri = done.file_uri.unwrap();
    assert!(uri.ends_with(".parquet"));
    let name = uri.rsplit('/').next().unwrap();
    let bytes = std::fs::read(dir.path().join(name)).unwrap();
    assert_eq!(&bytes[..4], b"PAR1");
  }

  #[tokio::test]
  async fn tick_reports_empty_queue() {
    let (s, _, _) = seeded_store().await;
    let dir = tempfile::tempdir().unwrap();
    let w = worker(&s, dir.path());
    assert!(!w.tick().await.unwrap());
  }
}
