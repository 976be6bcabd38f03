//! HTTP adapter implementing [`SecretStore`] against a Vault-like KV-v2
//! secrets engine.

use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use vsync_domain::ports::{Checks, Listing, SecretMeta};
use vsync_domain::{Error, Kind, SecretStore};

/// Strip the leading mount segment up to and including the first `/`.
pub fn mount_of(path: &str) -> String {
    match path.find('/') {
        Some(idx) => path[..=idx].to_owned(),
        None => format!("{path}/"),
    }
}

/// The path of `path`'s parent directory, i.e. everything before the
/// last `/`.
pub fn parent_path(path: &str) -> String {
    match path.trim_end_matches('/').rfind('/') {
        Some(idx) => path[..=idx].to_owned(),
        None => String::new(),
    }
}

/// Rewrite `path`'s first `/metadata` segment into a KV-v2 data path,
/// inserting the `metadata/` segment for a bare mount if none is
/// present.
pub fn data_path_of(path: &str) -> String {
    let meta = meta_path_of(path);
    meta.replacen("/metadata", "/data", 1)
}

/// Ensure `path` carries a `metadata/` (or deeper) segment right after
/// its mount, collapsing any doubled slashes.
pub fn meta_path_of(path: &str) -> String {
    let trimmed = path.trim_start_matches('/');
    let Some(idx) = trimmed.find('/') else {
        return format!("{trimmed}/metadata");
    };
    let mount = &trimmed[..=idx];
    let rest = &trimmed[idx + 1..];
    let joined = if rest.starts_with("metadata") || rest.starts_with("data") {
        format!("{mount}{rest}")
    } else {
        format!("{mount}metadata/{rest}")
    };
    collapse_slashes(&joined)
}

fn collapse_slashes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_slash = false;
    for c in s.chars() {
        if c == '/' {
            if prev_slash {
                continue;
            }
            prev_slash = true;
        } else {
            prev_slash = false;
        }
        out.push(c);
    }
    out
}

#[derive(Debug, Deserialize)]
struct KvV2VersionMeta {
    #[serde(default)]
    deletion_time: String,
    #[serde(default)]
    destroyed: bool,
    #[serde(default)]
    #[allow(dead_code)]
    created_time: String,
}

#[derive(Debug, Deserialize)]
struct KvV2Metadata {
    current_version: i64,
    #[serde(default)]
    updated_time: String,
    versions: std::collections::HashMap<String, KvV2VersionMeta>,
}

/// A Vault-like secret store reachable over HTTP, authenticated with a
/// bearer token that can be swapped out from under in-flight requests by
/// the credential renewer.
pub struct VaultClient {
    http: reqwest::Client,
    address: String,
    token: ArcSwap<String>,
}

impl VaultClient {
    pub fn new(address: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            address: address.into(),
            token: ArcSwap::from_pointee(token.into()),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.address.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.url(path))
            .header("X-Vault-Token", self.token.load().as_str())
    }

    async fn probe_write(&self, data_path: &str, key: &str) -> Result<(), Error> {
        let probe_path = format!("{}vsyncChecks/{key}", data_path.trim_end_matches('/'));
        self.write(&probe_path, &json!({"probe": true})).await?;
        Ok(())
    }
}

#[async_trait]
impl SecretStore for VaultClient {
    async fn read(&self, data_path: &str) -> Result<Value, Error> {
        let response = self
            .request(reqwest::Method::GET, data_path)
            .send()
            .await
            .map_err(|e| {
                Error::warn("vault::read", format!("reading {data_path}"), Kind::InvalidPath).with_source(e)
            })?;
        let body: Value = response.json().await.map_err(|e| {
            Error::warn("vault::read", format!("decoding response for {data_path}"), Kind::InvalidPath)
                .with_source(e)
        })?;
        body.pointer("/data/data")
            .cloned()
            .ok_or_else(|| Error::warn("vault::read", format!("no data field in response for {data_path}"), Kind::InvalidPath))
    }

    async fn write(&self, data_path: &str, data: &Value) -> Result<(), Error> {
        self.request(reqwest::Method::POST, data_path)
            .json(&json!({"data": data}))
            .send()
            .await
            .map_err(|e| {
                Error::warn("vault::write", format!("writing {data_path}"), Kind::InvalidPath).with_source(e)
            })?
            .error_for_status()
            .map_err(|e| {
                Error::warn("vault::write", format!("writing {data_path}"), Kind::InvalidPath).with_source(e)
            })?;
        Ok(())
    }

    async fn delete(&self, data_path: &str) -> Result<(), Error> {
        let meta_path = meta_path_of(data_path).replacen("/data", "/metadata", 1);
        self.request(reqwest::Method::DELETE, &meta_path)
            .send()
            .await
            .map_err(|e| {
                Error::warn("vault::delete", format!("deleting {meta_path}"), Kind::InvalidPath).with_source(e)
            })?
            .error_for_status()
            .map_err(|e| {
                Error::warn("vault::delete", format!("deleting {meta_path}"), Kind::InvalidPath).with_source(e)
            })?;
        Ok(())
    }

    async fn read_meta(&self, meta_path: &str) -> Result<SecretMeta, Error> {
        let response = self
            .request(reqwest::Method::GET, meta_path)
            .send()
            .await
            .map_err(|e| {
                Error::warn("vault::read_meta", format!("reading metadata for {meta_path}"), Kind::InvalidMeta)
                    .with_source(e)
            })?;
        let body: Value = response.json().await.map_err(|e| {
            Error::warn("vault::read_meta", format!("decoding metadata for {meta_path}"), Kind::InvalidMeta)
                .with_source(e)
        })?;
        let data = body.get("data").cloned().ok_or_else(|| {
            Error::warn("vault::read_meta", format!("no data field for {meta_path}"), Kind::InvalidMeta)
        })?;
        let meta: KvV2Metadata = serde_json::from_value(data).map_err(|e| {
            Error::warn("vault::read_meta", format!("malformed metadata for {meta_path}"), Kind::InvalidMeta)
                .with_source(e)
        })?;
        let version_key = meta.current_version.to_string();
        let version = meta.versions.get(&version_key).ok_or_else(|| {
            Error::warn(
                "vault::read_meta",
                format!("current version {version_key} missing from versions map for {meta_path}"),
                Kind::InvalidMeta,
            )
        })?;
        Ok(SecretMeta {
            current_version: meta.current_version,
            updated_time: meta.updated_time.clone(),
            deletion_time: version.deletion_time.clone(),
            destroyed: version.destroyed,
        })
    }

    async fn list(&self, meta_path: &str) -> Result<Listing, Error> {
        let response = self
            .http
            .request(reqwest::Method::from_bytes(b"LIST").unwrap(), self.url(meta_path))
            .header("X-Vault-Token", self.token.load().as_str())
            .send()
            .await
            .map_err(|e| {
                Error::warn("vault::list", format!("listing {meta_path}"), Kind::InvalidPath).with_source(e)
            })?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Listing::default());
        }
        let body: Value = response.json().await.map_err(|e| {
            Error::warn("vault::list", format!("decoding listing for {meta_path}"), Kind::InvalidPath)
                .with_source(e)
        })?;
        let keys: Vec<String> = body
            .pointer("/data/keys")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_owned)).collect())
            .unwrap_or_default();

        let mut listing = Listing::default();
        for key in keys {
            if key.ends_with('/') {
                listing.folders.push(key);
            } else {
                listing.paths.push(key);
            }
        }
        Ok(listing)
    }

    async fn is_kv_v2(&self, mount: &str) -> Result<bool, Error> {
        let response = self
            .request(reqwest::Method::GET, "sys/mounts")
            .send()
            .await
            .map_err(|e| Error::warn("vault::is_kv_v2", "listing mounts", Kind::Initialization).with_source(e))?;
        let body: Value = response.json().await.map_err(|e| {
            Error::warn("vault::is_kv_v2", "decoding mounts response", Kind::Initialization).with_source(e)
        })?;
        let mount_key = if mount.ends_with('/') { mount.to_owned() } else { format!("{mount}/") };
        let entry = body.pointer(&format!("/data/{mount_key}")).or_else(|| body.get(&mount_key));
        let Some(entry) = entry else {
            return Ok(false);
        };
        let is_kv = entry.get("type").and_then(Value::as_str).is_some_and(|t| t == "kv" || t == "generic");
        let is_v2 = entry
            .pointer("/options/version")
            .and_then(Value::as_str)
            .is_some_and(|v| v == "2");
        Ok(is_kv && is_v2)
    }

    async fn check_permissions(&self, data_path: &str, checks: Checks) -> Result<(), Error> {
        let key = Uuid::new_v4().to_string();
        if checks.contains(Checks::WRITE) {
            self.probe_write(data_path, &key).await.map_err(|e| {
                Error::fatal("vault::check_permissions", format!("no write capability at {data_path}"), Kind::PermissionDenied)
                    .with_source(e)
            })?;
        }
        let probe_path = format!("{}vsyncChecks/{key}", data_path.trim_end_matches('/'));
        if checks.contains(Checks::LIST) {
            self.list(&meta_path_of(data_path)).await.map_err(|e| {
                Error::fatal("vault::check_permissions", format!("no list capability at {data_path}"), Kind::PermissionDenied)
                    .with_source(e)
            })?;
        }
        if checks.contains(Checks::READ) {
            self.read(&probe_path).await.map_err(|e| {
                Error::fatal("vault::check_permissions", format!("no read capability at {data_path}"), Kind::PermissionDenied)
                    .with_source(e)
            })?;
        }
        if checks.contains(Checks::DELETE) {
            self.delete(&probe_path).await.map_err(|e| {
                Error::fatal("vault::check_permissions", format!("no delete capability at {data_path}"), Kind::PermissionDenied)
                    .with_source(e)
            })?;
        }
        Ok(())
    }

    async fn token_ttl(&self) -> Result<i64, Error> {
        let response = self
            .request(reqwest::Method::GET, "auth/token/lookup-self")
            .send()
            .await
            .map_err(|e| Error::fatal("vault::token_ttl", "looking up self token", Kind::InvalidToken).with_source(e))?;
        let body: Value = response.json().await.map_err(|e| {
            Error::fatal("vault::token_ttl", "decoding token lookup response", Kind::InvalidToken).with_source(e)
        })?;
        body.pointer("/data/creation_ttl")
            .and_then(Value::as_i64)
            .ok_or_else(|| Error::fatal("vault::token_ttl", "no creation_ttl in token lookup response", Kind::InvalidToken))
    }

    async fn renew_token(&self, ttl: i64) -> Result<String, Error> {
        let response = self
            .request(reqwest::Method::POST, "auth/token/renew-self")
            .json(&json!({"increment": ttl}))
            .send()
            .await
            .map_err(|e| Error::fatal("vault::renew_token", "renewing self token", Kind::InvalidToken).with_source(e))?;
        let body: Value = response.json().await.map_err(|e| {
            Error::fatal("vault::renew_token", "decoding token renewal response", Kind::InvalidToken).with_source(e)
        })?;
        body.pointer("/auth/client_token")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| Error::fatal("vault::renew_token", "no client_token in renewal response", Kind::InvalidToken))
    }

    fn set_token(&self, token: String) {
        self.token.store(Arc::new(token));
    }
}
