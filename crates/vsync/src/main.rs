//! Entry point: parses the CLI, loads configuration, builds the clients
//! for the selected role, and runs its trigger loop until shutdown.

mod cli;

use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use vsync_application::info_to_coord;
use vsync_application::{trigger, CycleConfig, DestinationCycle, OriginCycle};
use vsync_domain::ports::Checks;
use vsync_domain::{CoordStore, Error, SecretStore, SyncInfo, TransformRule, TransformerPack};
use vsync_infrastructure::config::RoleConfig;
use vsync_infrastructure::{logging, signal, telemetry, VsyncConfig};
use vsync_providers::{ConsulClient, VaultClient};

use cli::{Cli, Role};

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let format: logging::LogFormat = cli.log_format.parse().unwrap_or_default();
    logging::init(&cli.log_level, format);

    let config = match VsyncConfig::load(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "failed to load configuration");
            return std::process::ExitCode::FAILURE;
        }
    };
    if let Err(err) = config.validate_mounts() {
        error!(error = %err, "invalid mount configuration");
        return std::process::ExitCode::FAILURE;
    }

    if let Some(addr) = config.pprof.as_deref() {
        match addr.parse() {
            Ok(addr) => {
                if let Err(err) = telemetry::init(addr) {
                    warn!(error = %err, "failed to start metrics exporter");
                }
            }
            Err(err) => warn!(address = addr, error = %err, "invalid metrics listen address"),
        }
    }

    let result = match cli.role {
        Role::Origin => run_origin(&config).await,
        Role::Destination => run_destination(&config).await,
    };

    match result {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, ops = ?err.ops(), "vsync exited with an error");
            std::process::ExitCode::FAILURE
        }
    }
}

fn role_prefix(sync_path: &str, role: &str) -> String {
    let normalized = if sync_path.ends_with('/') {
        sync_path.to_owned()
    } else {
        format!("{sync_path}/")
    };
    format!("{normalized}{role}/")
}

fn build_transforms(role: &RoleConfig) -> Result<TransformerPack, Error> {
    let mut pack = TransformerPack::new();
    for rule in &role.transforms {
        pack.push(Box::new(TransformRule::new(
            rule.name.clone(),
            &rule.from,
            rule.to.clone(),
        )?));
    }
    pack.push(Box::new(vsync_domain::IdentityTransform));
    Ok(pack)
}

async fn build_vault(role: &RoleConfig) -> Result<Arc<VaultClient>, Error> {
    Ok(Arc::new(VaultClient::new(&role.vault.address, &role.vault.token)))
}

async fn build_consul(role: &RoleConfig) -> Result<Arc<ConsulClient>, Error> {
    Ok(Arc::new(ConsulClient::connect(&role.consul.address).await?))
}

async fn prepare_role(
    role: &RoleConfig,
    role_name: &str,
    vault: &Arc<VaultClient>,
    consul: &Arc<ConsulClient>,
) -> Result<String, Error> {
    let prefix = role_prefix(&role.sync_path, role_name);

    vault
        .as_ref()
        .check_permissions(&role.mounts.first().cloned().unwrap_or_default(), Checks::STD)
        .await?;
    consul.as_ref().check_permissions(&prefix, Checks::STD).await?;

    for mount in &role.mounts {
        if !vault.as_ref().is_kv_v2(mount).await? {
            return Err(Error::fatal(
                "main::prepare_role",
                format!("mount {mount} is not a kv-v2 secrets engine"),
                vsync_domain::Kind::Initialization,
            ));
        }
    }

    if !consul.as_ref().is_initialized(&prefix).await? {
        info!(prefix = %prefix, "sync path not initialized, publishing an empty sync info");
        let empty = SyncInfo::new(1)?;
        empty.reindex().await?;
        info_to_coord(consul.as_ref(), &prefix, &empty).await?;
    }

    Ok(prefix)
}

async fn run_origin(config: &VsyncConfig) -> Result<(), Error> {
    let role = &config.origin;
    let vault = build_vault(role).await?;
    let consul = build_consul(role).await?;
    let prefix = prepare_role(role, "origin", &vault, &consul).await?;

    let meta_roots: Vec<String> = role.mounts.iter().map(|mount| format!("{mount}metadata/")).collect();

    let cancel = CancellationToken::new();
    let renew_cancel = cancel.clone();
    let renew_handle = if role.renew_token {
        let store: Arc<dyn SecretStore> = vault.clone();
        Some(tokio::spawn(vsync_application::renewer::run_renewer(store, renew_cancel)))
    } else {
        None
    };

    let (trigger_tx, mut trigger_rx) = tokio::sync::mpsc::channel(1);
    let ticker_handle = tokio::spawn(trigger::run_ticker(
        role.tick,
        trigger_tx,
        cancel.clone(),
        vsync_application::telemetry::ORIGIN_TIMER_TRIGGERED,
    ));

    let cycle = OriginCycle {
        config: CycleConfig {
            num_buckets: config.num_buckets,
            num_workers: role.num_workers,
            timeout: role.timeout,
        },
        origin_store: vault.clone() as Arc<dyn SecretStore>,
        origin_coord: consul.clone() as Arc<dyn CoordStore>,
        origin_prefix: prefix,
        origin_mounts: role.mounts.clone(),
        meta_roots,
    };

    let shutdown = tokio::spawn(signal::wait_for_shutdown(cancel.clone()));

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            fired = trigger_rx.recv() => {
                if fired.is_none() {
                    break;
                }
                if let Err(err) = cycle.run_once().await {
                    warn!(error = %err, "origin cycle failed");
                    if err.should_stop() {
                        cancel.cancel();
                    }
                }
            }
        }
    }

    ticker_handle.abort();
    if let Some(handle) = renew_handle {
        handle.abort();
    }
    let _ = shutdown.await;
    Ok(())
}

async fn run_destination(config: &VsyncConfig) -> Result<(), Error> {
    let role = config.destination.as_ref().ok_or_else(|| {
        Error::fatal(
            "main::run_destination",
            "no destination configuration present",
            vsync_domain::Kind::Initialization,
        )
    })?;
    let origin_role = &config.origin;

    let origin_vault = build_vault(origin_role).await?;
    let origin_consul = build_consul(origin_role).await?;
    let origin_prefix = role_prefix(&origin_role.sync_path, "origin");

    let destination_vault = build_vault(role).await?;
    let destination_consul = build_consul(role).await?;
    let destination_prefix = prepare_role(role, "destination", &destination_vault, &destination_consul).await?;

    let transforms = Arc::new(build_transforms(role)?);

    let cancel = CancellationToken::new();
    let renew_cancel = cancel.clone();
    let renew_handle = if role.renew_token {
        let store: Arc<dyn SecretStore> = destination_vault.clone();
        Some(tokio::spawn(vsync_application::renewer::run_renewer(store, renew_cancel)))
    } else {
        None
    };

    let (trigger_tx, mut trigger_rx) = tokio::sync::mpsc::channel(1);
    let ticker_handle = tokio::spawn(trigger::run_ticker(
        role.tick,
        trigger_tx.clone(),
        cancel.clone(),
        vsync_application::telemetry::DESTINATION_TIMER_TRIGGERED,
    ));
    let watch_handle = tokio::spawn(trigger::run_watch(
        origin_consul.clone() as Arc<dyn CoordStore>,
        format!("{origin_prefix}index"),
        trigger_tx,
        cancel.clone(),
    ));

    let cycle = DestinationCycle {
        config: CycleConfig {
            num_buckets: config.num_buckets,
            num_workers: role.num_workers,
            timeout: role.timeout,
        },
        origin_store: origin_vault.clone() as Arc<dyn SecretStore>,
        destination_store: destination_vault.clone() as Arc<dyn SecretStore>,
        origin_coord: origin_consul.clone() as Arc<dyn CoordStore>,
        destination_coord: destination_consul.clone() as Arc<dyn CoordStore>,
        origin_prefix,
        destination_prefix,
        origin_mounts: origin_role.mounts.clone(),
        destination_mounts: role.mounts.clone(),
        transforms,
        sync_deletes: !config.ignore_deletes,
    };

    let shutdown = tokio::spawn(signal::wait_for_shutdown(cancel.clone()));

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            fired = trigger_rx.recv() => {
                if fired.is_none() {
                    break;
                }
                if let Err(err) = cycle.run_once().await {
                    warn!(error = %err, "destination cycle failed");
                    if err.should_stop() {
                        cancel.cancel();
                    }
                }
            }
        }
    }

    ticker_handle.abort();
    watch_handle.abort();
    if let Some(handle) = renew_handle {
        handle.abort();
    }
    let _ = shutdown.await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_prefix_appends_role_segment() {
        assert_eq!(role_prefix("vsync/", "origin"), "vsync/origin/");
        assert_eq!(role_prefix("vsync", "destination"), "vsync/destination/");
    }
}
