//! Bucketed, content-addressed summary of a secret namespace at a point in
//! time: the "sync info" at the heart of the sync engine.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use crate::error::{Error, Kind};
use crate::insight::Insight;

/// A mapping from absolute secret path to [`Insight`]. Backed by a
/// `BTreeMap` so iteration is already path-ascending, which is exactly the
/// order the canonical fingerprint rendering requires.
pub type Bucket = BTreeMap<String, Insight>;

const EMPTY_BUCKET_SENTINEL: &str = "<empty>";

/// Render a bucket into the canonical form used for fingerprinting:
/// entries sorted by path ascending (guaranteed by `BTreeMap`'s iteration
/// order), rendered as `path=version|updateTime|type` joined by `\n`, so
/// origin and destination agree on fingerprints for identical content
/// regardless of insertion order.
fn canonical_render(bucket: &Bucket) -> String {
    if bucket.is_empty() {
        return EMPTY_BUCKET_SENTINEL.to_owned();
    }
    bucket
        .iter()
        .map(|(path, insight)| {
            format!(
                "{path}={}|{}|{}",
                insight.version, insight.update_time, insight.kind
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn fingerprint(bucket: &Bucket) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_render(bucket).as_bytes());
    hex::encode(hasher.finalize())
}

/// `slot(p) = BE_u16(hash(p)[0:2]) mod numBuckets`. Deterministically maps
/// a path to exactly one bucket. Distribution is approximately uniform
/// (see the bucket-distribution test).
pub fn slot(path: &str, num_buckets: usize) -> usize {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    let digest = hasher.finalize();
    let prefix = u16::from_be_bytes([digest[0], digest[1]]);
    (prefix as usize) % num_buckets
}

#[derive(Debug)]
struct Inner {
    buckets: Vec<Bucket>,
    index: Vec<String>,
}

/// A fixed-size array of `numBuckets` buckets plus a parallel array of
/// content fingerprints ("index"). At most one writer holds the info's
/// write permission at a time; multiple concurrent readers are allowed.
#[derive(Debug)]
pub struct SyncInfo {
    num_buckets: usize,
    inner: RwLock<Inner>,
}

impl SyncInfo {
    /// Construct a freshly empty info with every bucket empty and every
    /// index slot set to the fingerprint of the empty bucket.
    ///
    /// # Errors
    /// Returns [`Kind::Initialization`] if `num_buckets` is negative.
    pub fn new(num_buckets: i64) -> Result<Self, Error> {
        if num_buckets < 0 {
            return Err(Error::fatal(
                "syncer::new_info",
                format!("cannot initialize info with negative number of buckets {num_buckets}"),
                Kind::Initialization,
            ));
        }
        let num_buckets = num_buckets as usize;
        let empty_fp = fingerprint(&Bucket::new());
        Ok(Self {
            num_buckets,
            inner: RwLock::new(Inner {
                buckets: vec![Bucket::new(); num_buckets],
                index: vec![empty_fp; num_buckets],
            }),
        })
    }

    /// Number of buckets this info was constructed with.
    pub fn num_buckets(&self) -> usize {
        self.num_buckets
    }

    /// Insert or overwrite `buckets[slot(path)][path] = insight`.
    ///
    /// # Errors
    /// Returns [`Kind::InvalidBucket`] if the computed slot is out of range
    /// (cannot happen under the invariants above; treated as corruption).
    pub async fn put(&self, path: &str, insight: Insight) -> Result<usize, Error> {
        let id = slot(path, self.num_buckets);
        let mut guard = self.inner.write().await;
        let num_buckets = guard.buckets.len();
        let bucket = guard.buckets.get_mut(id).ok_or_else(|| {
            Error::warn(
                "syncer::put",
                format!("cannot find bucket {id} from {num_buckets} buckets"),
                Kind::InvalidBucket,
            )
        })?;
        bucket.insert(path.to_owned(), insight);
        Ok(id)
    }

    /// Remove `path` from its bucket. Removing a missing key is a no-op
    /// that still returns the slot id.
    pub async fn delete(&self, path: &str) -> Result<usize, Error> {
        let id = slot(path, self.num_buckets);
        let mut guard = self.inner.write().await;
        let num_buckets = guard.buckets.len();
        let bucket = guard.buckets.get_mut(id).ok_or_else(|| {
            Error::warn(
                "syncer::delete",
                format!("cannot find bucket {id} from {num_buckets} buckets"),
                Kind::InvalidBucket,
            )
        })?;
        bucket.remove(path);
        Ok(id)
    }

    /// Recompute every bucket's fingerprint and write it into the index.
    /// Must be called after all mutations of a cycle and before
    /// publication or comparison.
    pub async fn reindex(&self) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        let fingerprints: Vec<String> = guard.buckets.iter().map(fingerprint).collect();
        guard.index = fingerprints;
        Ok(())
    }

    /// Snapshot the index array.
    ///
    /// # Errors
    /// Returns [`Kind::Corrupted`] if `len(index) != len(buckets)`.
    pub async fn get_index(&self) -> Result<Vec<String>, Error> {
        let guard = self.inner.read().await;
        if guard.index.len() != guard.buckets.len() {
            return Err(Error::fatal(
                "syncer::get_index",
                format!(
                    "corrupted sync info {} index with {} buckets",
                    guard.index.len(),
                    guard.buckets.len()
                ),
                Kind::Corrupted,
            ));
        }
        Ok(guard.index.clone())
    }

    /// Snapshot bucket `id`.
    ///
    /// # Errors
    /// Returns [`Kind::Corrupted`] on a length mismatch, or
    /// [`Kind::InvalidBucket`] if `id` is out of range.
    pub async fn get_bucket(&self, id: usize) -> Result<Bucket, Error> {
        let guard = self.inner.read().await;
        if guard.index.len() != guard.buckets.len() {
            return Err(Error::fatal(
                "syncer::get_bucket",
                format!(
                    "corrupted sync info {} index with {} buckets",
                    guard.index.len(),
                    guard.buckets.len()
                ),
                Kind::Corrupted,
            ));
        }
        guard.buckets.get(id).cloned().ok_or_else(|| {
            Error::warn(
                "syncer::get_bucket",
                format!("cannot find bucket {id} in {} buckets", guard.buckets.len()),
                Kind::InvalidBucket,
            )
        })
    }

    /// Overwrite the entire index array, used by the persistence bridge
    /// when consuming from the coordination store. `len(index)` must
    /// already equal `num_buckets`; callers bound-check before calling.
    pub async fn set_index(&self, index: Vec<String>) {
        let mut guard = self.inner.write().await;
        guard.index = index;
    }

    /// Overwrite bucket `id`, used by the persistence bridge when
    /// consuming from the coordination store.
    ///
    /// # Errors
    /// Returns [`Kind::Corrupted`] if `id` is outside the pre-allocated
    /// buckets array.
    pub async fn set_bucket(&self, id: usize, bucket: Bucket) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        let num_buckets = guard.buckets.len();
        let slot = guard.buckets.get_mut(id).ok_or_else(|| {
            Error::fatal(
                "syncer::set_bucket",
                format!("bucket id {id} outside pre-allocated {num_buckets} buckets"),
                Kind::Corrupted,
            )
        })?;
        *slot = bucket;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_is_pure_and_in_range() {
        for n in [1usize, 3, 19, 100] {
            let a = slot("secret/data/foo", n);
            let b = slot("secret/data/foo", n);
            assert_eq!(a, b);
            assert!(a < n);
        }
    }

    #[test]
    fn bucket_distribution_is_approximately_uniform() {
        let n = 19usize;
        let mut counts = vec![0u64; n];
        for i in 0..100_000 {
            let path = i.to_string();
            counts[slot(&path, n)] += 1;
        }
        let total: u64 = counts.iter().sum();
        let mean = total as f64 / n as f64;
        let variance = counts
            .iter()
            .map(|&c| {
                let d = c as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / n as f64;
        let stddev = variance.sqrt();
        let ratio = stddev / total as f64;
        assert!(
            (0.5..=0.9).contains(&ratio),
            "stddev/total ratio {ratio} out of expected 0.7±0.2 band"
        );
    }

    #[tokio::test]
    async fn new_with_negative_buckets_fails() {
        let err = SyncInfo::new(-1).unwrap_err();
        assert_eq!(err.kind, Kind::Initialization);
    }

    #[tokio::test]
    async fn new_with_zero_buckets_succeeds() {
        let info = SyncInfo::new(0).unwrap();
        assert_eq!(info.get_index().await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn fresh_info_prefills_index_with_empty_fingerprint() {
        let info = SyncInfo::new(4).unwrap();
        let empty_fp = fingerprint(&Bucket::new());
        let index = info.get_index().await.unwrap();
        assert!(index.iter().all(|fp| fp == &empty_fp));
    }

    #[tokio::test]
    async fn reindex_matches_bucket_fingerprints() {
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

        let index = info.get_index().await.unwrap();
        for (id, fp) in index.iter().enumerate() {
            let bucket = info.get_bucket(id).await.unwrap();
            assert_eq!(fp, &fingerprint(&bucket));
        }
    }

    #[tokio::test]
    async fn put_then_delete_leaves_empty_fingerprint_after_reindex() {
        let info = SyncInfo::new(4).unwrap();
        let insight = Insight {
            version: 1,
            update_time: "2024-01-01T00:00:00Z".to_owned(),
            kind: "kvV2".to_owned(),
        };
        let id = info.put("secret/data/a", insight).await.unwrap();
        info.delete("secret/data/a").await.unwrap();
        info.reindex().await.unwrap();

        let index = info.get_index().await.unwrap();
        let empty_fp = fingerprint(&Bucket::new());
        assert_eq!(index[id], empty_fp);
    }

    #[tokio::test]
    async fn get_bucket_out_of_range_errors() {
        let info = SyncInfo::new(2).unwrap();
        let err = info.get_bucket(5).await.unwrap_err();
        assert_eq!(err.kind, Kind::InvalidBucket);
    }
}
