//! Use cases for vsync: comparing sync info, generating insights,
//! applying tasks, bridging sync info through a coordination store, and
//! the cycle controllers that tie those pieces together on a schedule.

pub mod applier;
pub mod comparator;
pub mod cycle;
pub mod insight_gen;
pub mod persistence;
pub mod renewer;
pub mod telemetry;
pub mod trigger;
pub mod walk;

pub use comparator::{compare, compare_buckets};
pub use cycle::{CycleConfig, DestinationCycle, OriginCycle};
pub use persistence::{info_from_coord, info_to_coord, PersistenceBridge};
