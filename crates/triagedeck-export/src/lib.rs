//! Export pipeline for triagedeck: snapshot selection, deterministic dataset
//! serialization, manifest assembly, artifact publishing, and TTL expiry.
//!
//! The worker pool drains the job queue through the store's atomic claim
//! operation; all communication with request handlers goes through the store.
//! Output is deterministic: for a fixed snapshot, filter set, field list, and
//! format, two runs produce byte-identical datasets and manifests.

pub mod error;
pub mod manifest;
pub mod parquet;
pub mod serialize;
pub mod snapshot;
pub mod sweeper;
pub mod worker;

pub use error::{Error, Result};
pub use sweeper::ExpirySweeper;
pub use worker::{ExportWorker, WorkerConfig};
