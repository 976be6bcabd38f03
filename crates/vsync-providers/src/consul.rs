//! HTTP adapter implementing [`CoordStore`] against a Consul-like
//! key/value store with blocking reads.

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use uuid::Uuid;

use vsync_domain::ports::Checks;
use vsync_domain::{CoordStore, Error, Kind};

#[derive(Debug, Deserialize)]
struct KvEntry {
    #[serde(rename = "Value")]
    value: Option<String>,
    #[serde(rename = "ModifyIndex")]
    modify_index: u64,
}

/// How long a blocking watch request is allowed to hang before the
/// server returns with no change, per Consul's blocking-query
/// convention.
const WATCH_WAIT: &str = "5m";

/// A Consul-like coordination store reachable over HTTP.
pub struct ConsulClient {
    http: reqwest::Client,
    address: String,
}

impl ConsulClient {
    /// Construct a new client and verify connectivity by pinging the
    /// agent's own identity endpoint.
    ///
    /// # Errors
    /// Returns [`Kind::Initialization`] if the agent cannot be reached.
    pub async fn connect(address: impl Into<String>) -> Result<Self, Error> {
        let client = Self {
            http: reqwest::Client::new(),
            address: address.into(),
        };
        client
            .http
            .get(client.url("v1/agent/self"))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| {
                Error::fatal(
                    "consul::connect",
                    format!("connecting to {}", client.address),
                    Kind::Initialization,
                )
                .with_source(e)
            })?;
        Ok(client)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.address.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}

#[async_trait]
impl CoordStore for ConsulClient {
    async fn get(&self, key: &str) -> Result<Option<(Vec<u8>, u64)>, Error> {
        let response = self
            .http
            .get(self.url(&format!("v1/kv/{key}")))
            .send()
            .await
            .map_err(|e| Error::warn("consul::get", format!("fetching {key}"), Kind::InvalidPath).with_source(e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let entries: Vec<KvEntry> = response.json().await.map_err(|e| {
            Error::warn("consul::get", format!("decoding response for {key}"), Kind::InvalidPath).with_source(e)
        })?;
        let Some(entry) = entries.into_iter().next() else {
            return Ok(None);
        };
        let Some(encoded) = entry.value else {
            return Ok(Some((Vec::new(), entry.modify_index)));
        };
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| {
                Error::warn("consul::get", format!("decoding base64 value for {key}"), Kind::Corrupted).with_source(e)
            })?;
        Ok(Some((decoded, entry.modify_index)))
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), Error> {
        self.http
            .put(self.url(&format!("v1/kv/{key}")))
            .body(value.to_vec())
            .send()
            .await
            .map_err(|e| Error::warn("consul::put", format!("storing {key}"), Kind::InvalidPath).with_source(e))?
            .error_for_status()
            .map_err(|e| Error::warn("consul::put", format!("storing {key}"), Kind::InvalidPath).with_source(e))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        self.http
            .delete(self.url(&format!("v1/kv/{key}")))
            .send()
            .await
            .map_err(|e| Error::warn("consul::delete", format!("deleting {key}"), Kind::InvalidPath).with_source(e))?
            .error_for_status()
            .map_err(|e| Error::warn("consul::delete", format!("deleting {key}"), Kind::InvalidPath).with_source(e))?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, Error> {
        let response = self
            .http
            .get(self.url(&format!("v1/kv/{prefix}?keys=true")))
            .send()
            .await
            .map_err(|e| Error::warn("consul::list", format!("listing {prefix}"), Kind::InvalidPath).with_source(e))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        response.json().await.map_err(|e| {
            Error::warn("consul::list", format!("decoding listing for {prefix}"), Kind::InvalidPath).with_source(e)
        })
    }

    async fn watch(&self, key: &str, since_index: u64) -> Result<u64, Error> {
        let response = self
            .http
            .get(self.url(&format!("v1/kv/{key}?index={since_index}&wait={WATCH_WAIT}")))
            .send()
            .await
            .map_err(|e| Error::warn("consul::watch", format!("watching {key}"), Kind::InvalidPath).with_source(e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(since_index);
        }

        let entries: Vec<KvEntry> = response.json().await.map_err(|e| {
            Error::warn("consul::watch", format!("decoding watch response for {key}"), Kind::InvalidPath)
                .with_source(e)
        })?;
        Ok(entries.first().map_or(since_index, |e| e.modify_index))
    }

    async fn check_permissions(&self, path: &str, checks: Checks) -> Result<(), Error> {
        let key = format!("{}vsyncChecks/{}", path.trim_end_matches('/'), Uuid::new_v4());

        if checks.contains(Checks::WRITE) {
            self.put(&key, b"probe").await.map_err(|e| {
                Error::fatal("consul::check_permissions", format!("no write capability at {path}"), Kind::PermissionDenied)
                    .with_source(e)
            })?;
        }
        if checks.contains(Checks::LIST) {
            self.list(path).await.map_err(|e| {
                Error::fatal("consul::check_permissions", format!("no list capability at {path}"), Kind::PermissionDenied)
                    .with_source(e)
            })?;
        }
        if checks.contains(Checks::READ) {
            self.get(&key).await.map_err(|e| {
                Error::fatal("consul::check_permissions", format!("no read capability at {path}"), Kind::PermissionDenied)
                    .with_source(e)
            })?;
        }
        if checks.contains(Checks::DELETE) {
            self.delete(&key).await.map_err(|e| {
                Error::fatal("consul::check_permissions", format!("no delete capability at {path}"), Kind::PermissionDenied)
                    .with_source(e)
            })?;
        }
        Ok(())
    }

    async fn is_initialized(&self, path: &str) -> Result<bool, Error> {
        Ok(!self.list(path).await?.is_empty())
    }
}
