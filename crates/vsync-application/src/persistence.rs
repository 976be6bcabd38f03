//! Bridges a [`SyncInfo`] to the coordination store. Buckets are always
//! written before the index key: destinations watch only the index key,
//! so publishing the index last guarantees a triggered cycle always sees
//! buckets that are at least as fresh as the index it woke up on.

use std::sync::Arc;

use vsync_domain::{Bucket, CoordStore, Error, Kind, SyncInfo};

fn index_key(prefix: &str) -> String {
    format!("{prefix}index")
}

fn bucket_key(prefix: &str, id: usize) -> String {
    format!("{prefix}{id}")
}

/// Publish `info` to `coord` under `prefix`.
pub async fn info_to_coord(coord: &dyn CoordStore, prefix: &str, info: &SyncInfo) -> Result<(), Error> {
    for id in 0..info.num_buckets() {
        let bucket = info.get_bucket(id).await?;
        let encoded = serde_json::to_vec(&bucket).map_err(|e| {
            Error::fatal(
                "persistence::info_to_coord",
                format!("encoding bucket {id}"),
                Kind::InvalidInfo,
            )
            .with_source(e)
        })?;
        coord.put(&bucket_key(prefix, id), &encoded).await?;
    }

    let index = info.get_index().await?;
    let encoded = serde_json::to_vec(&index).map_err(|e| {
        Error::fatal(
            "persistence::info_to_coord",
            "encoding index",
            Kind::InvalidInfo,
        )
        .with_source(e)
    })?;
    coord.put(&index_key(prefix), &encoded).await?;
    Ok(())
}

/// Populate `info` from what is published at `prefix` in `coord`.
///
/// # Errors
/// Returns [`Kind::InvalidInfo`] if the index is missing or its length
/// does not match `info.num_buckets()`.
pub async fn info_from_coord(coord: &dyn CoordStore, prefix: &str, info: &SyncInfo) -> Result<(), Error> {
    let Some((raw_index, _)) = coord.get(&index_key(prefix)).await? else {
        return Err(Error::fatal(
            "persistence::info_from_coord",
            format!("no index published at {prefix}"),
            Kind::InvalidInfo,
        ));
    };
    let index: Vec<String> = serde_json::from_slice(&raw_index).map_err(|e| {
        Error::fatal(
            "persistence::info_from_coord",
            "decoding index",
            Kind::InvalidInfo,
        )
        .with_source(e)
    })?;

    if index.len() != info.num_buckets() {
        return Err(Error::fatal(
            "persistence::info_from_coord",
            format!(
                "published index has {} entries, expected {}",
                index.len(),
                info.num_buckets()
            ),
            Kind::Corrupted,
        ));
    }

    for id in 0..info.num_buckets() {
        let Some((raw_bucket, _)) = coord.get(&bucket_key(prefix, id)).await? else {
            return Err(Error::fatal(
                "persistence::info_from_coord",
                format!("no bucket {id} published at {prefix}"),
                Kind::InvalidInfo,
            ));
        };
        let bucket: Bucket = serde_json::from_slice(&raw_bucket).map_err(|e| {
            Error::fatal(
                "persistence::info_from_coord",
                format!("decoding bucket {id}"),
                Kind::InvalidInfo,
            )
            .with_source(e)
        })?;
        info.set_bucket(id, bucket).await?;
    }
    info.set_index(index).await;
    Ok(())
}

/// Convenience wrapper pairing a coord store with the prefix its keys
/// live under, so cycle controllers can pass one value around.
pub struct PersistenceBridge {
    coord: Arc<dyn CoordStore>,
    prefix: String,
}

impl PersistenceBridge {
    pub fn new(coord: Arc<dyn CoordStore>, prefix: impl Into<String>) -> Self {
        Self {
            coord,
            prefix: prefix.into(),
        }
    }

    pub async fn publish(&self, info: &SyncInfo) -> Result<(), Error> {
        info_to_coord(self.coord.as_ref(), &self.prefix, info).await
    }

    pub async fn consume(&self, info: &SyncInfo) -> Result<(), Error> {
        info_from_coord(self.coord.as_ref(), &self.prefix, info).await
    }
}

#[cfg(test)]
mod tests {
    use vsync_domain::ports::test_support::MemoryCoordStore;
    use vsync_domain::Insight;

    use super::*;

    #[tokio::test]
    async fn round_trips_through_coord_store() {
        let coord = MemoryCoordStore::new();
        let info = SyncInfo::new(4).unwrap();
        info.put(
            "secret/data/a",
            Insight {
                version: 1,
                update_time: "2024-01-01T00:00:00Z".to_owned(),
                kind: "kvV2".to_owned(),
            },
        )
        .await
        .unwrap();
        info.reindex().await.unwrap();

        info_to_coord(coord.as_ref(), "vsync/origin/", &info).await.unwrap();

        let restored = SyncInfo::new(4).unwrap();
        info_from_coord(coord.as_ref(), "vsync/origin/", &restored).await.unwrap();

        assert_eq!(
            info.get_index().await.unwrap(),
            restored.get_index().await.unwrap()
        );
        let bucket = restored
            .get_bucket(vsync_domain::slot("secret/data/a", 4))
            .await
            .unwrap();
        assert!(bucket.contains_key("secret/data/a"));
    }

    #[tokio::test]
    async fn missing_index_is_invalid_info() {
        let coord = MemoryCoordStore::new();
        let info = SyncInfo::new(4).unwrap();
        let err = info_from_coord(coord.as_ref(), "vsync/origin/", &info)
            .await
            .unwrap_err();
        assert_eq!(err.kind, Kind::InvalidInfo);
    }

    #[tokio::test]
    async fn bucket_count_mismatch_is_corrupted() {
        let coord = MemoryCoordStore::new();
        let published = SyncInfo::new(8).unwrap();
        info_to_coord(coord.as_ref(), "vsync/origin/", &published).await.unwrap();

        let info = SyncInfo::new(4).unwrap();
        let err = info_from_coord(coord.as_ref(), "vsync/origin/", &info)
            .await
            .unwrap_err();
        assert_eq!(err.kind, Kind::Corrupted);
    }
}
