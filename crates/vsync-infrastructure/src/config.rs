//! Configuration loading: a TOML file overlaid with `VSYNC_`-prefixed
//! environment variables, plus rejection of keys that moved in a past
//! release.

use std::path::Path;
use std::time::Duration;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;

use vsync_domain::{Error, Kind};

fn humantime_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_duration(&raw).map_err(serde::de::Error::custom)
}

fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    let (number, unit) = raw
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .map(|idx| raw.split_at(idx))
        .ok_or_else(|| format!("duration {raw:?} is missing a unit"))?;
    let value: f64 = number
        .parse()
        .map_err(|_| format!("duration {raw:?} has an invalid numeric part"))?;
    let seconds = match unit {
        "s" => value,
        "m" => value * 60.0,
        "h" => value * 3600.0,
        "ms" => value / 1000.0,
        other => return Err(format!("duration {raw:?} has unknown unit {other:?}")),
    };
    Ok(Duration::from_secs_f64(seconds))
}

/// A named-regex path rewrite rule as it appears in configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TransformRuleConfig {
    pub name: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConsulConfig {
    pub address: String,
    #[serde(default)]
    pub dc: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VaultConfig {
    pub address: String,
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoleConfig {
    #[serde(deserialize_with = "humantime_duration", default = "default_tick")]
    pub tick: Duration,
    #[serde(deserialize_with = "humantime_duration", default = "default_timeout")]
    pub timeout: Duration,
    #[serde(default = "default_sync_path")]
    pub sync_path: String,
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
    #[serde(default)]
    pub mounts: Vec<String>,
    #[serde(default = "default_renew_token")]
    pub renew_token: bool,
    /// Deprecated, replaced by `consul.dc`.
    #[serde(default)]
    pub dc: Option<String>,
    pub consul: ConsulConfig,
    pub vault: VaultConfig,
    #[serde(default)]
    pub transforms: Vec<TransformRuleConfig>,
}

fn default_tick() -> Duration {
    Duration::from_secs(10)
}

fn default_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_sync_path() -> String {
    "vsync/".to_owned()
}

fn default_num_workers() -> usize {
    1
}

fn default_renew_token() -> bool {
    true
}

fn default_num_buckets() -> i64 {
    1
}

/// The fully parsed, environment-overlaid configuration for one run.
#[derive(Debug, Clone, Deserialize)]
pub struct VsyncConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_num_buckets")]
    pub num_buckets: i64,
    #[serde(default)]
    pub ignore_deletes: bool,
    #[serde(default)]
    pub pprof: Option<String>,
    pub origin: RoleConfig,
    pub destination: Option<RoleConfig>,

    /// Deprecated top-level key, replaced by `origin.sync_path` /
    /// `destination.sync_path`.
    #[serde(default, rename = "syncPath")]
    deprecated_sync_path: Option<String>,
}

fn default_name() -> String {
    "vsync".to_owned()
}

impl VsyncConfig {
    /// Load configuration from `path`, overlaid with `VSYNC_`-prefixed
    /// environment variables (double underscore as the nesting
    /// separator, e.g. `VSYNC_ORIGIN__VAULT__TOKEN`).
    ///
    /// # Errors
    /// Returns [`Kind::Initialization`] if the file cannot be parsed, or
    /// if a deprecated key is present.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let figment = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("VSYNC_").split("__"));

        let config: VsyncConfig = figment.extract().map_err(|e| {
            Error::fatal(
                "config::load",
                "parsing configuration",
                Kind::Initialization,
            )
            .with_source(e)
        })?;

        config.reject_deprecated_keys()?;
        Ok(config)
    }

    fn reject_deprecated_keys(&self) -> Result<(), Error> {
        if self.deprecated_sync_path.is_some() {
            return Err(Error::fatal(
                "config::reject_deprecated_keys",
                "syncPath has moved to origin.sync_path and destination.sync_path",
                Kind::Initialization,
            ));
        }
        if self.origin.dc.is_some() {
            return Err(Error::fatal(
                "config::reject_deprecated_keys",
                "origin.dc variable is deprecated, please use origin.consul.dc",
                Kind::Initialization,
            ));
        }
        if let Some(destination) = &self.destination {
            if destination.dc.is_some() {
                return Err(Error::fatal(
                    "config::reject_deprecated_keys",
                    "destination.dc variable is deprecated, please use destination.consul.dc",
                    Kind::Initialization,
                ));
            }
        }
        Ok(())
    }

    /// Validate that every configured mount ends in `/`, as the walk and
    /// transformer logic assume.
    ///
    /// # Errors
    /// Returns [`Kind::Initialization`] naming the first offending mount.
    pub fn validate_mounts(&self) -> Result<(), Error> {
        for mount in &self.origin.mounts {
            validate_mount_suffix(mount)?;
        }
        if let Some(destination) = &self.destination {
            for mount in &destination.mounts {
                validate_mount_suffix(mount)?;
            }
        }
        Ok(())
    }
}

fn validate_mount_suffix(mount: &str) -> Result<(), Error> {
    if !mount.ends_with('/') {
        return Err(Error::fatal(
            "config::validate_mounts",
            format!("mount {mount:?} must end in '/'"),
            Kind::Initialization,
        ));
    }
    Ok(())
}
