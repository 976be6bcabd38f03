//! Shutdown signal handling: waits for SIGINT or SIGTERM, cancels the
//! supplied token, and gives in-flight work a short grace period before
//! the caller proceeds to exit.

use std::time::Duration;

use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// How long to wait after cancelling before returning, giving spawned
/// tasks a chance to observe cancellation and unwind cleanly.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Wait for SIGINT or SIGTERM, then cancel `cancel` and sleep for
/// [`SHUTDOWN_GRACE`] before returning.
///
/// # Panics
/// Panics if the process's signal handlers cannot be installed, which
/// only happens when the underlying `signal` syscall itself fails.
pub async fn wait_for_shutdown(cancel: CancellationToken) {
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

    tokio::select! {
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
    }

    cancel.cancel();
    tokio::time::sleep(SHUTDOWN_GRACE).await;
}
