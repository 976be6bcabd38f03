//! HTTP adapters implementing vsync's [`SecretStore`](vsync_domain::SecretStore)
//! and [`CoordStore`](vsync_domain::CoordStore) ports against Vault- and
//! Consul-like APIs.

pub mod consul;
pub mod vault;

pub use consul::ConsulClient;
pub use vault::VaultClient;
