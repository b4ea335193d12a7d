//! Periodic expiry sweeper for ready exports past their TTL.
//!
//! A single task per process. It owns exactly one transition
//! (`ready → expired`) and the removal of the expired artifact pair from the
//! artifact directory.

use std::{path::PathBuf, sync::Arc, time::Duration};

use triagedeck_core::{clock::now_ms, export::manifest_name, store::DeckStore};

use crate::{Error, Result};

pub struct ExpirySweeper<S> {
  store:        Arc<S>,
  artifact_dir: PathBuf,
  interval:     Duration,
}

impl<S> ExpirySweeper<S>
where
  S: DeckStore + 'static,
{
  pub fn new(store: Arc<S>, artifact_dir: PathBuf, interval: Duration) -> Self {
    Self {
      store,
      artifact_dir,
      interval,
    }
  }

  /// Run forever on the configured interval.
  pub async fn run(self) {
    loop {
      if let Err(e) = self.sweep_once().await {
        tracing::warn!(error = %e, "expiry sweep failed");
      }
      tokio::time::sleep(self.interval).await;
    }
  }

  /// One sweep: transition over-TTL jobs and delete their artifacts.
  /// Returns the number of jobs expired.
  pub async fn sweep_once(&self) -> Result<usize> {
    let expired = self
      .store
      .expire_ready_jobs(now_ms())
      .await
      .map_err(|e| Error::Store(Box::new(e)))?;

    for job in &expired {
      if let Some(uri) = &job.file_uri {
        self.remove_artifacts(uri).await;
      }
      tracing::info!(
        export_id = %job.export_id,
        project_id = %job.project_id,
        action = "export_expired",
        "export expired and artifacts removed"
      );
    }
    Ok(expired.len())
  }

  async fn remove_artifacts(&self, file_uri: &str) {
    let Some(name) = file_uri.rsplit('/').next().filter(|n| !n.is_empty())
    else {
      return;
    };
    let dataset = self.artifact_dir.join(name);
    let manifest = self.artifact_dir.join(manifest_name(name));
    for path in [dataset, manifest] {
      if let Err(e) = tokio::fs::remove_file(&path).await
        && e.kind() != std::io::ErrorKind::NotFound
      {
        tracing::warn!(path = %path.display(), error = %e, "could not remove artifact");
      }
    }
  }
}
