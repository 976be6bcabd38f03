//! Destination-side worker pool: applies add/update/delete tasks produced
//! by the comparator against the destination secret store.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use vsync_domain::{Op, SecretStore, SyncInfo, Task, TransformerPack};

/// Drain `tasks` against `origin`/`destination`, recording a successful
/// apply into `info`. Runs until the channel closes or `cancel` fires.
///
/// Delete tasks are skipped entirely when `sync_deletes` is `false`.
pub async fn apply_tasks(
    origin: Arc<dyn SecretStore>,
    destination: Arc<dyn SecretStore>,
    transforms: Arc<TransformerPack>,
    info: Arc<SyncInfo>,
    sync_deletes: bool,
    mut tasks: mpsc::Receiver<Task>,
    cancel: CancellationToken,
) {
    loop {
        let task = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            next = tasks.recv() => match next {
                Some(t) => t,
                None => return,
            },
        };

        apply_one(&origin, &destination, &transforms, &info, sync_deletes, task).await;
    }
}

/// Apply a single task, used both by [`apply_tasks`]'s loop and by cycle
/// controllers that pool workers over a shared receiver.
pub(crate) async fn apply_one(
    origin: &Arc<dyn SecretStore>,
    destination: &Arc<dyn SecretStore>,
    transforms: &TransformerPack,
    info: &SyncInfo,
    sync_deletes: bool,
    task: Task,
) {
    match task.op {
        Op::Add | Op::Update => apply_add_or_update(origin, destination, transforms, info, task).await,
        Op::Delete => apply_delete(destination, transforms, info, task, sync_deletes).await,
    }
}

async fn apply_add_or_update(
    origin: &Arc<dyn SecretStore>,
    destination: &Arc<dyn SecretStore>,
    transforms: &TransformerPack,
    info: &SyncInfo,
    task: Task,
) {
    let data = match origin.read(&task.path).await {
        Ok(data) => data,
        Err(err) => {
            warn!(path = %task.path, error = %err, "failed to read secret from origin");
            return;
        }
    };

    let (destination_path, matched) = transforms.transform(&task.path);
    if !matched {
        warn!(path = %task.path, "no transformer rule matched path, skipping");
        return;
    }

    if let Err(err) = destination.write(&destination_path, &data).await {
        warn!(path = %destination_path, error = %err, "failed to write secret to destination");
        return;
    }

    if let Err(err) = info.put(&task.path, task.insight).await {
        warn!(path = %task.path, error = %err, "failed to record applied insight");
    }
}

async fn apply_delete(
    destination: &Arc<dyn SecretStore>,
    transforms: &TransformerPack,
    info: &SyncInfo,
    task: Task,
    sync_deletes: bool,
) {
    if !sync_deletes {
        return;
    }

    let (destination_path, matched) = transforms.transform(&task.path);
    if !matched {
        warn!(path = %task.path, "no transformer rule matched path, skipping delete");
        return;
    }

    if let Err(err) = destination.delete(&destination_path).await {
        warn!(path = %destination_path, error = %err, "failed to delete secret from destination");
        return;
    }

    if let Err(err) = info.delete(&task.path).await {
        warn!(path = %task.path, error = %err, "failed to record applied delete");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;
    use vsync_domain::{Checks, Insight, Listing, SecretMeta};

    use super::*;

    struct RecordingStore {
        writes: std::sync::Mutex<Vec<String>>,
        deletes: std::sync::Mutex<Vec<String>>,
        reads: AtomicUsize,
    }

    impl RecordingStore {
        fn new() -> Self {
            Self {
                writes: std::sync::Mutex::new(Vec::new()),
                deletes: std::sync::Mutex::new(Vec::new()),
                reads: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SecretStore for RecordingStore {
        async fn read(&self, _data_path: &str) -> Result<serde_json::Value, vsync_domain::Error> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"k": "v"}))
        }
        async fn write(&self, data_path: &str, _data: &serde_json::Value) -> Result<(), vsync_domain::Error> {
            self.writes.lock().unwrap().push(data_path.to_owned());
            Ok(())
        }
        async fn delete(&self, data_path: &str) -> Result<(), vsync_domain::Error> {
            self.deletes.lock().unwrap().push(data_path.to_owned());
            Ok(())
        }
        async fn read_meta(&self, _meta_path: &str) -> Result<SecretMeta, vsync_domain::Error> {
            unimplemented!()
        }
        async fn list(&self, _meta_path: &str) -> Result<Listing, vsync_domain::Error> {
            unimplemented!()
        }
        async fn is_kv_v2(&self, _mount: &str) -> Result<bool, vsync_domain::Error> {
            unimplemented!()
        }
        async fn check_permissions(&self, _data_path: &str, _checks: Checks) -> Result<(), vsync_domain::Error> {
            unimplemented!()
        }
        async fn token_ttl(&self) -> Result<i64, vsync_domain::Error> {
            unimplemented!()
        }
        async fn renew_token(&self, _ttl: i64) -> Result<String, vsync_domain::Error> {
            unimplemented!()
        }
        fn set_token(&self, _token: String) {}
    }

    #[tokio::test]
    async fn add_writes_transformed_path_but_records_original() {
        let origin = Arc::new(RecordingStore::new());
        let destination = Arc::new(RecordingStore::new());
        let info = Arc::new(SyncInfo::new(1).unwrap());
        let transforms = Arc::new(TransformerPack::default_pack());
        let cancel = CancellationToken::new();

        let (tx, rx) = mpsc::channel(1);
        tx.send(Task::add("secret/data/a", Insight {
            version: 1,
            update_time: "2024-01-01T00:00:00Z".to_owned(),
            kind: "kvV2".to_owned(),
        }))
        .await
        .unwrap();
        drop(tx);

        apply_tasks(
            origin.clone(),
            destination.clone(),
            transforms,
            info.clone(),
            true,
            rx,
            cancel,
        )
        .await;

        assert_eq!(destination.writes.lock().unwrap().as_slice(), ["secret/data/a"]);
        let bucket = info.get_bucket(0).await.unwrap();
        assert!(bucket.contains_key("secret/data/a"));
    }

    #[tokio::test]
    async fn delete_is_skipped_when_sync_deletes_is_false() {
        let origin = Arc::new(RecordingStore::new());
        let destination = Arc::new(RecordingStore::new());
        let info = Arc::new(SyncInfo::new(1).unwrap());
        let transforms = Arc::new(TransformerPack::default_pack());
        let cancel = CancellationToken::new();

        let (tx, rx) = mpsc::channel(1);
        tx.send(Task::delete("secret/data/a")).await.unwrap();
        drop(tx);

        apply_tasks(origin, destination.clone(), transforms, info, false, rx, cancel).await;

        assert!(destination.deletes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_removes_from_destination_and_info_when_enabled() {
        let origin = Arc::new(RecordingStore::new());
        let destination = Arc::new(RecordingStore::new());
        let info = Arc::new(SyncInfo::new(1).unwrap());
        info.put("secret/data/a", Insight::zero()).await.unwrap();
        let transforms = Arc::new(TransformerPack::default_pack());
        let cancel = CancellationToken::new();

        let (tx, rx) = mpsc::channel(1);
        tx.send(Task::delete("secret/data/a")).await.unwrap();
        drop(tx);

        apply_tasks(origin, destination.clone(), transforms, info.clone(), true, rx, cancel).await;

        assert_eq!(destination.deletes.lock().unwrap().as_slice(), ["secret/data/a"]);
        let bucket = info.get_bucket(0).await.unwrap();
        assert!(!bucket.contains_key("secret/data/a"));
    }
}
