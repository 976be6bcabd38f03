//! Origin-side worker pool: reads KV-v2 metadata for each path handed to
//! it and records the resulting insight into the origin sync info.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use vsync_domain::{Insight, SecretStore, SyncInfo};

/// Replace the first occurrence of `/metadata` with `/data` in `path`,
/// mirroring the KV-v2 metadata-to-data path convention. Paths without a
/// `/metadata` segment are returned unchanged.
pub fn metadata_to_data_path(path: &str) -> String {
    path.replacen("/metadata", "/data", 1)
}

/// Drain `paths` against `store`, writing one insight per non-deleted,
/// non-destroyed path into `info`. Runs until the channel closes or
/// `cancel` fires.
pub async fn generate_insights(
    store: Arc<dyn SecretStore>,
    info: Arc<SyncInfo>,
    mut paths: mpsc::Receiver<String>,
    cancel: CancellationToken,
) {
    loop {
        let meta_path = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            next = paths.recv() => match next {
                Some(p) => p,
                None => return,
            },
        };

        generate_one(&store, &info, &meta_path).await;
    }
}

/// Generate and record a single path's insight, used both by
/// [`generate_insights`]'s loop and by cycle controllers that pool
/// workers over a shared receiver.
pub(crate) async fn generate_one(store: &Arc<dyn SecretStore>, info: &SyncInfo, meta_path: &str) {
    match store.read_meta(meta_path).await {
        Ok(meta) => {
            if !meta.deletion_time.is_empty() || meta.destroyed {
                debug!(path = %meta_path, "skipping deleted or destroyed secret");
                return;
            }
            let data_path = metadata_to_data_path(meta_path);
            let insight = Insight {
                version: meta.current_version,
                update_time: meta.updated_time,
                kind: vsync_domain::insight::KV_V2.to_owned(),
            };
            if let Err(err) = info.put(&data_path, insight).await {
                warn!(path = %data_path, error = %err, "failed to record insight");
            }
        }
        Err(err) => {
            warn!(path = %meta_path, error = %err, "failed to read secret metadata");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_to_data_replaces_first_occurrence_only() {
        assert_eq!(
            metadata_to_data_path("secret/metadata/app/metadata-key"),
            "secret/data/app/metadata-key"
        );
    }

    #[test]
    fn metadata_to_data_is_identity_without_metadata_segment() {
        assert_eq!(metadata_to_data_path("secret/app/key"), "secret/app/key");
    }
}
