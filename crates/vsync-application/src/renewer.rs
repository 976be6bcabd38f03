//! Keeps a secret-store credential alive for the lifetime of a cycle
//! controller: renews immediately, then on a steady tick set to 85% of
//! the credential's TTL.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use vsync_domain::SecretStore;

const RENEW_FRACTION: f64 = 0.85;

/// Renew `store`'s credential immediately, then every `0.85 * ttl`
/// seconds, until `cancel` fires or the credential cannot be renewed.
///
/// A zero TTL means the credential does not expire: this logs a warning
/// and returns without entering the renewal loop. A negative TTL cannot
/// be turned into a tick interval and is treated as fatal.
pub async fn run_renewer(store: Arc<dyn SecretStore>, cancel: CancellationToken) {
    let ttl = match store.token_ttl().await {
        Ok(ttl) => ttl,
        Err(err) => {
            error!(error = %err, "failed to look up token ttl, renewer exiting");
            return;
        }
    };

    if ttl == 0 {
        warn!("token has no creation ttl, nothing to renew");
        return;
    }
    if ttl < 0 {
        error!(ttl, "token reported a negative ttl, renewer exiting");
        return;
    }

    if let Err(err) = renew_once(&store, ttl).await {
        error!(error = %err, "initial token renewal failed, renewer exiting");
        return;
    }

    let tick = Duration::from_secs_f64(ttl as f64 * RENEW_FRACTION);
    let mut interval = tokio::time::interval(tick);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            _ = interval.tick() => {
                if let Err(err) = renew_once(&store, ttl).await {
                    warn!(error = %err, "periodic token renewal failed");
                }
            }
        }
    }
}

async fn renew_once(store: &Arc<dyn SecretStore>, ttl: i64) -> Result<(), vsync_domain::Error> {
    let new_token = store.renew_token(ttl).await?;
    store.set_token(new_token);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use vsync_domain::{Checks, Listing, SecretMeta};

    use super::*;

    struct FakeStore {
        ttl: AtomicI64,
        renewals: AtomicUsize,
    }

    #[async_trait]
    impl SecretStore for FakeStore {
        async fn read(&self, _data_path: &str) -> Result<serde_json::Value, vsync_domain::Error> {
            unimplemented!()
        }
        async fn write(&self, _data_path: &str, _data: &serde_json::Value) -> Result<(), vsync_domain::Error> {
            unimplemented!()
        }
        async fn delete(&self, _data_path: &str) -> Result<(), vsync_domain::Error> {
            unimplemented!()
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
            Ok(self.ttl.load(Ordering::SeqCst))
        }
        async fn renew_token(&self, _ttl: i64) -> Result<String, vsync_domain::Error> {
            self.renewals.fetch_add(1, Ordering::SeqCst);
            Ok("new-token".to_owned())
        }
        fn set_token(&self, _token: String) {}
    }

    #[tokio::test]
    async fn zero_ttl_exits_without_renewing() {
        let store = Arc::new(FakeStore {
            ttl: AtomicI64::new(0),
            renewals: AtomicUsize::new(0),
        });
        let cancel = CancellationToken::new();
        run_renewer(store.clone(), cancel).await;
        assert_eq!(store.renewals.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn negative_ttl_exits_without_renewing() {
        let store = Arc::new(FakeStore {
            ttl: AtomicI64::new(-1),
            renewals: AtomicUsize::new(0),
        });
        let cancel = CancellationToken::new();
        run_renewer(store.clone(), cancel).await;
        assert_eq!(store.renewals.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn positive_ttl_renews_immediately() {
        let store = Arc::new(FakeStore {
            ttl: AtomicI64::new(3600),
            renewals: AtomicUsize::new(0),
        });
        let cancel = CancellationToken::new();
        cancel.cancel();
        run_renewer(store.clone(), cancel).await;
        assert_eq!(store.renewals.load(Ordering::SeqCst), 1);
    }
}
