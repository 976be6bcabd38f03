//! Configuration, logging, telemetry and shutdown-signal handling for
//! vsync. Everything here is ambient: none of it is specific to a
//! particular secret store or coordination store.

pub mod config;
pub mod logging;
pub mod signal;
pub mod telemetry;

pub use config::VsyncConfig;
pub use logging::LogFormat;
pub use signal::wait_for_shutdown;
