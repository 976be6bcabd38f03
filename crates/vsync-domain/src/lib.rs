//! Core types, error taxonomy and port traits for the vsync secret
//! replicator. This crate has no dependency on any concrete transport or
//! runtime beyond async primitives; `vsync-application` implements use
//! cases against the traits in [`ports`], and `vsync-providers` supplies
//! the HTTP-backed implementations.

pub mod error;
pub mod info;
pub mod insight;
pub mod ports;
pub mod task;
pub mod transformer;

pub use error::{Error, Kind, Result, Severity};
pub use info::{slot, Bucket, SyncInfo};
pub use insight::Insight;
pub use ports::{Checks, CoordStore, Listing, SecretMeta, SecretStore};
pub use task::{Op, Task};
pub use transformer::{IdentityTransform, Transform, TransformRule, TransformerPack};
