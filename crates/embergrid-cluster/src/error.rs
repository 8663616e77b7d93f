//! Orchestrator error types.
//!
//! Every failure names the node and the step that failed, so an operator
//! can tell "VM failed to boot" from "node unreachable" from "kubeadm
//! join failed". Cleanup failures are logged, never surfaced here.

use thiserror::Error;

/// Errors that abort a cluster operation.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Invalid request; fails before any resource is created.
    #[error("invalid cluster request: {0}")]
    Configuration(#[from] ember_core::ConfigError),

    /// A node's VM or network device could not be provisioned.
    #[error("failed to provision node {node} at step `{step}`: {source}")]
    Provisioning {
        node: String,
        step: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// A node never became remotely reachable within the deadline.
    #[error("timeout waiting for node {node} to become reachable")]
    ReadinessTimeout { node: String },

    /// Control-plane init, overlay install, token retrieval, or a worker
    /// join failed.
    #[error("bootstrap step `{step}` failed on node {node}: {source}")]
    Bootstrap {
        node: String,
        step: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// The cluster's cancellation scope fired mid-operation.
    #[error("cluster operation cancelled")]
    Cancelled,
}

pub type ClusterResult<T> = Result<T, ClusterError>;
