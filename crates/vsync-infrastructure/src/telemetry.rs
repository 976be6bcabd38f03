//! Telemetry sink: installs the Prometheus recorder the use-case layer's
//! counters and gauges report into. The metric names themselves live
//! alongside the code that increments them, in
//! `vsync_application::telemetry`.

use std::net::SocketAddr;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use vsync_domain::{Error, Kind};

/// Start a Prometheus exporter bound to `addr`, returning a handle that
/// can render the current metrics snapshot as text.
///
/// # Errors
/// Returns [`Kind::Initialization`] if the exporter cannot bind `addr`.
pub fn init(addr: SocketAddr) -> Result<PrometheusHandle, Error> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install_recorder()
        .map_err(|e| {
            Error::fatal(
                "telemetry::init",
                format!("starting prometheus exporter on {addr}"),
                Kind::Initialization,
            )
            .with_source(e)
        })
}
