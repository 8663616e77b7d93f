//! ember-core — shared types for the Embergrid cluster launcher.
//!
//! Holds the cluster request (`ClusterConfig`), its validation rules, and
//! the node role vocabulary used by every other crate. No I/O beyond
//! reading an optional `ember.toml`.

pub mod config;
pub mod types;

pub use config::{
    ClusterConfig, ConfigError, NetworkConfig, CONTROL_PLANE_HOST_SUFFIX, WORKER_HOST_SUFFIX_BASE,
};
pub use types::NodeRole;
