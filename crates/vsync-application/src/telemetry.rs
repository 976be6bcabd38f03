//! Names of the counters and gauges the cycle controllers and trigger
//! funnel report against. The Prometheus recorder itself is installed by
//! the infrastructure layer; these names are the contract between that
//! layer and the use cases that actually hit the counters.

/// Counter incremented each time the destination's coordination-store
/// watch fires.
pub const DESTINATION_WATCH_TRIGGERED: &str = "vsync.destination.watch.triggered";
/// Counter incremented each time the destination's steady tick fires.
pub const DESTINATION_TIMER_TRIGGERED: &str = "vsync.destination.timer.triggered";
/// Counter incremented each time the origin's steady tick fires.
pub const ORIGIN_TIMER_TRIGGERED: &str = "vsync.origin.timer.triggered";
/// Gauge reporting pending task count before a destination cycle's
/// worker pool starts draining it.
pub const DESTINATION_PATHS_TO_BE_PROCESSED: &str = "vsync.destination.paths.to_be_processed";
/// Gauge reporting pending path count before the origin's worker pool
/// starts draining it.
pub const ORIGIN_PATHS_TO_BE_PROCESSED: &str = "vsync.origin.paths.to_be_processed";
/// Counter incremented once per task skipped due to cancellation
/// mid-cycle.
pub const DESTINATION_PATHS_SKIPPED: &str = "vsync.destination.paths.skipped";
/// Counter incremented once per cycle, tagged by `status`
/// (`"success"` or `"failure"`).
pub const DESTINATION_CYCLE: &str = "vsync.destination.cycle";
/// Counter incremented once per cycle, tagged by `status`.
pub const ORIGIN_CYCLE: &str = "vsync.origin.cycle";
