//! Per-cycle orchestration. A cycle is one bounded-time comparison (or,
//! on the origin side, one bounded-time scan) followed by publication of
//! the resulting sync info. Every cycle gets its own cancellation token
//! so a timeout or shutdown signal only tears down the in-flight cycle,
//! never the process's trigger loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use vsync_domain::{Checks, CoordStore, Error, Kind, SecretStore, SyncInfo, Task, TransformerPack};

use crate::applier::apply_one;
use crate::comparator::compare;
use crate::insight_gen::generate_one;
use crate::persistence::{info_from_coord, info_to_coord};
use crate::telemetry;
use crate::walk::walk_all;

/// Configuration shared by both cycle controllers.
pub struct CycleConfig {
    pub num_buckets: i64,
    pub num_workers: usize,
    pub timeout: Duration,
}

impl CycleConfig {
    fn worker_count(&self) -> usize {
        self.num_workers.max(1)
    }
}

/// The destination side of a sync: compares origin and destination sync
/// info, applies the diff, and republishes the destination's sync info.
pub struct DestinationCycle {
    pub config: CycleConfig,
    pub origin_store: Arc<dyn SecretStore>,
    pub destination_store: Arc<dyn SecretStore>,
    pub origin_coord: Arc<dyn CoordStore>,
    pub destination_coord: Arc<dyn CoordStore>,
    pub origin_prefix: String,
    pub destination_prefix: String,
    pub origin_mounts: Vec<String>,
    pub destination_mounts: Vec<String>,
    pub transforms: Arc<TransformerPack>,
    pub sync_deletes: bool,
}

impl DestinationCycle {
    /// Run one cycle, bounded by `config.timeout`. A timeout mid-cycle
    /// cancels the in-flight workers and returns [`Kind::Timeout`]; the
    /// next trigger starts a fresh cycle regardless.
    pub async fn run_once(&self) -> Result<(), Error> {
        let cancel = CancellationToken::new();
        let result = match tokio::time::timeout(self.config.timeout, self.run_cycle(&cancel)).await {
            Ok(result) => result,
            Err(_) => {
                cancel.cancel();
                Err(Error::fatal(
                    "cycle::destination",
                    "cycle exceeded its configured timeout",
                    Kind::Timeout,
                ))
            }
        };
        let status = if result.is_ok() { "success" } else { "failure" };
        metrics::counter!(telemetry::DESTINATION_CYCLE, "status" => status).increment(1);
        result
    }

    async fn run_cycle(&self, cancel: &CancellationToken) -> Result<(), Error> {
        self.check_mount_permissions().await?;

        let origin_info = SyncInfo::new(self.config.num_buckets)?;
        let destination_info = Arc::new(SyncInfo::new(self.config.num_buckets)?);

        if let Err(err) = info_from_coord(self.origin_coord.as_ref(), &self.origin_prefix, &origin_info).await {
            warn!(error = %err, "failed to load origin sync info, skipping cycle");
            return Ok(());
        }
        if let Err(err) = info_from_coord(
            self.destination_coord.as_ref(),
            &self.destination_prefix,
            &destination_info,
        )
        .await
        {
            warn!(error = %err, "failed to load destination sync info, skipping cycle");
            return Ok(());
        }

        let tasks = compare(&origin_info, &destination_info).await?;
        if tasks.is_empty() {
            return Ok(());
        }
        info!(count = tasks.len(), "tasks to apply this cycle");
        metrics::gauge!(telemetry::DESTINATION_PATHS_TO_BE_PROCESSED).set(tasks.len() as f64);

        let (task_tx, task_rx) = mpsc::channel::<Task>(self.config.worker_count());
        let shared_rx = Arc::new(Mutex::new(task_rx));

        let mut workers = JoinSet::new();
        for _ in 0..self.config.worker_count() {
            let rx = shared_rx.clone();
            let origin_store = self.origin_store.clone();
            let destination_store = self.destination_store.clone();
            let transforms = self.transforms.clone();
            let info = destination_info.clone();
            let sync_deletes = self.sync_deletes;
            let worker_cancel = cancel.clone();
            workers.spawn(async move {
                while let Some(task) = recv_guarded(&rx, &worker_cancel).await {
                    apply_one(&origin_store, &destination_store, &transforms, &info, sync_deletes, task).await;
                }
                if worker_cancel.is_cancelled() {
                    metrics::counter!(telemetry::DESTINATION_PATHS_SKIPPED).increment(1);
                }
            });
        }

        for task in tasks {
            if task_tx.send(task).await.is_err() {
                break;
            }
        }
        drop(task_tx);

        while workers.join_next().await.is_some() {}

        destination_info.reindex().await?;
        info_to_coord(self.destination_coord.as_ref(), &self.destination_prefix, &destination_info).await?;
        Ok(())
    }

    /// Re-verify origin and destination mount permissions before starting
    /// a cycle, so a token whose policy was revoked mid-run fails fast on
    /// the next trigger instead of running against stale assumptions.
    async fn check_mount_permissions(&self) -> Result<(), Error> {
        for mount in &self.origin_mounts {
            self.origin_store.check_permissions(mount, Checks::STD).await?;
        }
        let destination_checks = if self.sync_deletes {
            Checks::STD
        } else {
            Checks::READ | Checks::WRITE | Checks::LIST
        };
        for mount in &self.destination_mounts {
            self.destination_store.check_permissions(mount, destination_checks).await?;
        }
        Ok(())
    }
}

async fn recv_guarded<T>(rx: &Arc<Mutex<mpsc::Receiver<T>>>, cancel: &CancellationToken) -> Option<T> {
    let mut guard = rx.lock().await;
    tokio::select! {
        biased;
        () = cancel.cancelled() => None,
        next = guard.recv() => next,
    }
}

/// The origin side of a sync: walks the namespace, generates insights,
/// and publishes the origin's sync info.
pub struct OriginCycle {
    pub config: CycleConfig,
    pub origin_store: Arc<dyn SecretStore>,
    pub origin_coord: Arc<dyn CoordStore>,
    pub origin_prefix: String,
    pub origin_mounts: Vec<String>,
    pub meta_roots: Vec<String>,
}

impl OriginCycle {
    /// Run one cycle, bounded by `config.timeout`.
    pub async fn run_once(&self) -> Result<(), Error> {
        let cancel = CancellationToken::new();
        let result = match tokio::time::timeout(self.config.timeout, self.run_cycle(&cancel)).await {
            Ok(result) => result,
            Err(_) => {
                cancel.cancel();
                Err(Error::fatal(
                    "cycle::origin",
                    "cycle exceeded its configured timeout",
                    Kind::Timeout,
                ))
            }
        };
        let status = if result.is_ok() { "success" } else { "failure" };
        metrics::counter!(telemetry::ORIGIN_CYCLE, "status" => status).increment(1);
        result
    }

    async fn run_cycle(&self, cancel: &CancellationToken) -> Result<(), Error> {
        for mount in &self.origin_mounts {
            self.origin_store.check_permissions(mount, Checks::STD).await?;
        }

        let info = Arc::new(SyncInfo::new(self.config.num_buckets)?);

        let (paths, errors) = walk_all(self.origin_store.as_ref(), &self.meta_roots).await;
        for err in &errors {
            warn!(error = %err, "error walking origin namespace");
        }
        if paths.is_empty() {
            return Ok(());
        }
        info!(count = paths.len(), "paths to inspect this cycle");
        metrics::gauge!(telemetry::ORIGIN_PATHS_TO_BE_PROCESSED).set(paths.len() as f64);

        let (path_tx, path_rx) = mpsc::channel::<String>(self.config.worker_count());
        let shared_rx = Arc::new(Mutex::new(path_rx));

        let mut workers = JoinSet::new();
        for _ in 0..self.config.worker_count() {
            let rx = shared_rx.clone();
            let store = self.origin_store.clone();
            let info = info.clone();
            let worker_cancel = cancel.clone();
            workers.spawn(async move {
                while let Some(path) = recv_guarded(&rx, &worker_cancel).await {
                    generate_one(&store, &info, &path).await;
                }
            });
        }

        for path in paths {
            if path_tx.send(path).await.is_err() {
                break;
            }
        }
        drop(path_tx);

        while workers.join_next().await.is_some() {}

        info.reindex().await?;
        info_to_coord(self.origin_coord.as_ref(), &self.origin_prefix, &info).await?;
        Ok(())
    }
}
