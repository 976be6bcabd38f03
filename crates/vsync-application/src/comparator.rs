//! Diffs an origin sync info against a destination sync info and produces
//! the task list the applier must execute to reconcile them.

use std::collections::HashSet;

use vsync_domain::{Bucket, Error, Insight, Kind, SyncInfo, Task};

/// Compare `origin` and `destination`, returning the tasks required to
/// bring destination up to date with origin.
///
/// # Errors
/// Returns [`Kind::Initialization`] if the two infos were built with a
/// different number of buckets — they are not comparable.
pub async fn compare(origin: &SyncInfo, destination: &SyncInfo) -> Result<Vec<Task>, Error> {
    let origin_index = origin.get_index().await?;
    let destination_index = destination.get_index().await?;

    if origin_index.len() != destination_index.len() {
        return Err(Error::fatal(
            "comparator::compare",
            format!(
                "origin has {} buckets, destination has {}",
                origin_index.len(),
                destination_index.len()
            ),
            Kind::Initialization,
        ));
    }

    let mut tasks = Vec::new();
    for (id, (origin_fp, destination_fp)) in origin_index
        .iter()
        .zip(destination_index.iter())
        .enumerate()
    {
        if origin_fp == destination_fp {
            continue;
        }
        let origin_bucket = origin.get_bucket(id).await?;
        let destination_bucket = destination.get_bucket(id).await?;
        tasks.extend(compare_buckets(&origin_bucket, &destination_bucket));
    }
    Ok(tasks)
}

/// Diff two buckets whose fingerprints are known to differ.
///
/// Tie-break order: a type change always wins; otherwise a higher origin
/// version wins; otherwise, if content is identical, no task is emitted;
/// otherwise the more recent update time wins. Destination paths with no
/// origin counterpart are deleted.
pub fn compare_buckets(origin: &Bucket, destination: &Bucket) -> Vec<Task> {
    let mut tasks = Vec::new();
    let mut processed: HashSet<&str> = HashSet::new();

    for (path, origin_insight) in origin {
        processed.insert(path.as_str());
        let Some(destination_insight) = destination.get(path) else {
            tasks.push(Task::add(path.clone(), origin_insight.clone()));
            continue;
        };

        if origin_insight.kind != destination_insight.kind {
            tasks.push(Task::update(path.clone(), origin_insight.clone()));
            continue;
        }

        if origin_insight.version > destination_insight.version {
            tasks.push(Task::update(path.clone(), origin_insight.clone()));
            continue;
        }

        if origin_insight == destination_insight {
            continue;
        }

        if is_newer(origin_insight, destination_insight) {
            tasks.push(Task::update(path.clone(), origin_insight.clone()));
        }
    }

    for path in destination.keys() {
        if !processed.contains(path.as_str()) {
            tasks.push(Task::delete(path.clone()));
        }
    }

    tasks
}

fn is_newer(origin: &Insight, destination: &Insight) -> bool {
    match (origin.parse_update_time(), destination.parse_update_time()) {
        (Ok(o), Ok(d)) => o > d,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vsync_domain::Op;

    fn insight(version: i64, update_time: &str, kind: &str) -> Insight {
        Insight {
            version,
            update_time: update_time.to_owned(),
            kind: kind.to_owned(),
        }
    }

    #[test]
    fn path_only_in_origin_is_added() {
        let mut origin = Bucket::new();
        origin.insert("a".to_owned(), insight(1, "2024-01-01T00:00:00Z", "kvV2"));
        let destination = Bucket::new();

        let tasks = compare_buckets(&origin, &destination);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].op, Op::Add);
        assert_eq!(tasks[0].path, "a");
    }

    #[test]
    fn path_only_in_destination_is_deleted() {
        let origin = Bucket::new();
        let mut destination = Bucket::new();
        destination.insert("a".to_owned(), insight(1, "2024-01-01T00:00:00Z", "kvV2"));

        let tasks = compare_buckets(&origin, &destination);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].op, Op::Delete);
        assert_eq!(tasks[0].insight, Insight::zero());
    }

    #[test]
    fn identical_insight_produces_no_task() {
        let mut origin = Bucket::new();
        let mut destination = Bucket::new();
        let i = insight(1, "2024-01-01T00:00:00Z", "kvV2");
        origin.insert("a".to_owned(), i.clone());
        destination.insert("a".to_owned(), i);

        assert!(compare_buckets(&origin, &destination).is_empty());
    }

    #[test]
    fn type_change_wins_over_lower_version() {
        let mut origin = Bucket::new();
        let mut destination = Bucket::new();
        origin.insert("a".to_owned(), insight(1, "2024-01-01T00:00:00Z", "kvV3"));
        destination.insert("a".to_owned(), insight(5, "2024-06-01T00:00:00Z", "kvV2"));

        let tasks = compare_buckets(&origin, &destination);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].op, Op::Update);
    }

    #[test]
    fn higher_origin_version_wins_even_if_older_timestamp() {
        let mut origin = Bucket::new();
        let mut destination = Bucket::new();
        origin.insert("a".to_owned(), insight(2, "2024-01-01T00:00:00Z", "kvV2"));
        destination.insert("a".to_owned(), insight(1, "2024-06-01T00:00:00Z", "kvV2"));

        let tasks = compare_buckets(&origin, &destination);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].op, Op::Update);
    }

    #[test]
    fn lower_origin_version_preserved_as_is_no_special_case() {
        // origin.version < destination.version, but origin has a newer
        // timestamp: the comparator does not special-case a version
        // regression, it falls through to the timestamp comparison.
        let mut origin = Bucket::new();
        let mut destination = Bucket::new();
        origin.insert("a".to_owned(), insight(1, "2024-06-01T00:00:00Z", "kvV2"));
        destination.insert("a".to_owned(), insight(2, "2024-01-01T00:00:00Z", "kvV2"));

        let tasks = compare_buckets(&origin, &destination);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].op, Op::Update);
    }

    #[test]
    fn same_version_and_type_with_newer_timestamp_updates() {
        let mut origin = Bucket::new();
        let mut destination = Bucket::new();
        origin.insert("a".to_owned(), insight(1, "2024-06-01T00:00:00Z", "kvV2"));
        destination.insert("a".to_owned(), insight(1, "2024-01-01T00:00:00Z", "kvV2"));

        let tasks = compare_buckets(&origin, &destination);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].op, Op::Update);
    }

    #[test]
    fn same_version_and_type_with_older_timestamp_is_no_op() {
        let mut origin = Bucket::new();
        let mut destination = Bucket::new();
        origin.insert("a".to_owned(), insight(1, "2024-01-01T00:00:00Z", "kvV2"));
        destination.insert("a".to_owned(), insight(1, "2024-06-01T00:00:00Z", "kvV2"));

        assert!(compare_buckets(&origin, &destination).is_empty());
    }

    #[tokio::test]
    async fn mismatched_bucket_counts_are_fatal() {
        let origin = SyncInfo::new(4).unwrap();
        let destination = SyncInfo::new(8).unwrap();
        let err = compare(&origin, &destination).await.unwrap_err();
        assert_eq!(err.kind, Kind::Initialization);
    }

    #[tokio::test]
    async fn matching_fingerprints_skip_bucket_fetch() {
        let origin = SyncInfo::new(4).unwrap();
        let destination = SyncInfo::new(4).unwrap();
        origin.reindex().await.unwrap();
        destination.reindex().await.unwrap();
        assert!(compare(&origin, &destination).await.unwrap().is_empty());
    }
}
