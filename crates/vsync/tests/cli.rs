//! Exercises the CLI binary's argument parsing and failure modes without
//! requiring a reachable Vault or Consul.

use std::io::Write;
use std::process::Command;

fn vsync_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_vsync"))
}

#[test]
fn missing_config_file_exits_nonzero() {
    let output = vsync_bin()
        .args(["--config", "/nonexistent/vsync.toml", "origin"])
        .output()
        .expect("failed to run vsync binary");
    assert!(!output.status.success());
}

#[test]
fn invalid_role_is_rejected_by_clap() {
    let output = vsync_bin().arg("sideways").output().expect("failed to run vsync binary");
    assert!(!output.status.success());
}

#[test]
fn help_flag_describes_both_roles() {
    let output = vsync_bin().arg("--help").output().expect("failed to run vsync binary");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("origin"));
    assert!(stdout.contains("destination"));
}

#[test]
fn rejects_mount_without_trailing_slash() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
        name = "destination"

        [origin]
        mounts = ["secret"]
        [origin.consul]
        address = "http://127.0.0.1:8500"
        [origin.vault]
        address = "http://127.0.0.1:8200"
        token = "root"

        [destination]
        mounts = ["secret/"]
        [destination.consul]
        address = "http://127.0.0.1:8500"
        [destination.vault]
        address = "http://127.0.0.1:8201"
        token = "root"
        "#
    )
    .unwrap();

    let output = vsync_bin()
        .args(["--config", file.path().to_str().unwrap(), "origin"])
        .output()
        .expect("failed to run vsync binary");
    assert!(!output.status.success());
}
