//! embergrid-cluster — the cluster provisioning orchestrator.
//!
//! Turns a declarative [`ember_core::ClusterConfig`] into a running,
//! joined Kubernetes cluster of Firecracker microVMs:
//!
//! - Plans node topology and network identity (control-plane first)
//! - Provisions all node VMs concurrently, waits for every unit, and
//!   tears the whole cluster down if any unit failed
//! - Gates every remote command behind a bounded readiness poll
//! - Runs the strictly ordered bootstrap protocol (kubeadm init →
//!   overlay → join token → worker joins)
//! - Cleans up deterministically on any failure and on shutdown
//!
//! # Architecture
//!
//! ```text
//! Cluster (aggregate: nodes, cancellation scope, join command)
//!   ├── topology::plan        ordered NodeSpecs + eager work dirs
//!   ├── Provisioner           fan-out, one task per node
//!   │     ├── MachineDriver   create-and-start microVMs
//!   │     └── HostNetwork     ensure tap devices
//!   ├── Bootstrapper          strictly sequential kubeadm protocol
//!   │     └── RemoteExec      ssh command channel (readiness-gated)
//!   └── cleanup               idempotent best-effort teardown
//! ```

pub mod allocator;
pub mod bootstrap;
pub mod cleanup;
pub mod cluster;
pub mod error;
pub mod node;
pub mod provision;
pub mod readiness;
pub mod topology;

pub use bootstrap::{Bootstrapper, JoinCommand};
pub use cluster::Cluster;
pub use error::{ClusterError, ClusterResult};
pub use node::{NodeSpec, NodeState, ProvisionedNode};
pub use provision::Provisioner;
