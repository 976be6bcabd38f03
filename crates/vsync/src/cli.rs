//! Command-line surface: global flags shared by both roles plus an
//! `origin`/`destination` subcommand selecting which cycle controller to
//! run.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// vsync: a one-way secret replicator.
#[derive(Debug, Parser)]
#[command(name = "vsync", version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, env = "VSYNC_CONFIG", default_value = "vsync.toml")]
    pub config: PathBuf,

    /// Log verbosity, as a `tracing_subscriber::EnvFilter` directive.
    #[arg(long = "log.level", env = "VSYNC_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output encoding: `console` or `json`.
    #[arg(long = "log.type", env = "VSYNC_LOG_TYPE", default_value = "console")]
    pub log_format: String,

    #[command(subcommand)]
    pub role: Role,
}

/// Which side of the sync this process runs.
#[derive(Debug, Subcommand)]
pub enum Role {
    /// Scan the origin namespace and publish its sync info.
    Origin,
    /// Compare against the published origin sync info and apply the
    /// difference.
    Destination,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_destination_role() {
        let cli = Cli::parse_from(["vsync", "destination"]);
        assert!(matches!(cli.role, Role::Destination));
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn parses_origin_role_with_overrides() {
        let cli = Cli::parse_from([
            "vsync",
            "--config",
            "custom.toml",
            "--log.level",
            "debug",
            "--log.type",
            "json",
            "origin",
        ]);
        assert!(matches!(cli.role, Role::Origin));
        assert_eq!(cli.config, PathBuf::from("custom.toml"));
        assert_eq!(cli.log_level, "debug");
        assert_eq!(cli.log_format, "json");
    }
}
