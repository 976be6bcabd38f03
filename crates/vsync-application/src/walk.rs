//! Recursive, sequential namespace walk. Deliberately not parallelized:
//! there is no cheap way to cancel a fanned-out walk mid-flight, so a
//! single in-flight listing per call keeps cancellation simple.

use std::future::Future;
use std::pin::Pin;

use vsync_domain::{Error, SecretStore};

/// Walk every `meta_paths` root to completion, collecting every leaf
/// secret path found along the way. Failures within one subtree are
/// recorded and do not stop the walk of sibling subtrees.
pub async fn walk_all(store: &dyn SecretStore, meta_paths: &[String]) -> (Vec<String>, Vec<Error>) {
    let mut paths = Vec::new();
    let mut errors = Vec::new();
    for root in meta_paths {
        walk_into(store, root, &mut paths, &mut errors).await;
    }
    (paths, errors)
}

fn walk_into<'a>(
    store: &'a dyn SecretStore,
    path: &'a str,
    paths: &'a mut Vec<String>,
    errors: &'a mut Vec<Error>,
) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
    Box::pin(async move {
        let listing = match store.list(path).await {
            Ok(listing) => listing,
            Err(err) => {
                errors.push(err);
                return;
            }
        };

        for leaf in listing.paths {
            paths.push(format!("{path}{leaf}"));
        }

        for folder in listing.folders {
            let child = format!("{path}{folder}");
            walk_into(store, &child, paths, errors).await;
        }
    })
}
