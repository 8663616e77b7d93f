//! The Cluster aggregate.
//!
//! Exclusively owns the node set, the cancellation scope, and the
//! write-once join credential. `provision()` and `cleanup()` are the
//! only externally meaningful operations; any provisioning or bootstrap
//! failure triggers cleanup before the error is returned.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use ember_core::ClusterConfig;
use embergrid_machine::{HostNetwork, MachineDriver};
use embergrid_remote::RemoteExec;

use crate::bootstrap::{Bootstrapper, JoinCommand};
use crate::cleanup::cleanup_nodes;
use crate::error::ClusterResult;
use crate::node::ProvisionedNode;
use crate::provision::Provisioner;
use crate::readiness::{DEFAULT_POLL_INTERVAL, DEFAULT_TIMEOUT};
use crate::topology;

/// A cluster: created empty from a validated request, populated by
/// `provision()`, fully torn down by `cleanup()`.
pub struct Cluster {
    config: ClusterConfig,
    nodes: Vec<ProvisionedNode>,
    cancel: CancellationToken,
    join_command: Option<JoinCommand>,
    driver: Arc<dyn MachineDriver>,
    host_net: Arc<dyn HostNetwork>,
    exec: Arc<dyn RemoteExec>,
    poll_interval: Duration,
    readiness_timeout: Duration,
}

impl Cluster {
    /// Accept a cluster request. Validation failures abort here, before
    /// any resource is created.
    pub fn new(
        config: ClusterConfig,
        driver: Arc<dyn MachineDriver>,
        host_net: Arc<dyn HostNetwork>,
        exec: Arc<dyn RemoteExec>,
    ) -> ClusterResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            nodes: Vec::new(),
            cancel: CancellationToken::new(),
            join_command: None,
            driver,
            host_net,
            exec,
            poll_interval: DEFAULT_POLL_INTERVAL,
            readiness_timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Override the readiness polling policy (tests use tight timings).
    pub fn with_readiness(mut self, poll_interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.readiness_timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// The node set; element 0 is always the control-plane node.
    pub fn nodes(&self) -> &[ProvisionedNode] {
        &self.nodes
    }

    /// The captured join credential, present once bootstrap succeeded.
    pub fn join_command(&self) -> Option<&JoinCommand> {
        self.join_command.as_ref()
    }

    /// The cluster's cancellation scope. Cancelling it stops in-flight
    /// provisioning and blocks any further remote command dispatch.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Provision all node VMs concurrently, then run the ordered
    /// bootstrap protocol. Either the cluster comes back fully joined,
    /// or an error is returned after everything created has been
    /// (best-effort) released.
    pub async fn provision(&mut self) -> ClusterResult<()> {
        info!(
            cluster = %self.config.name,
            nodes = self.config.node_count,
            "provisioning cluster"
        );

        let specs = match topology::plan(&self.config) {
            Ok(specs) => specs,
            Err(e) => {
                error!(cluster = %self.config.name, error = %e, "topology planning failed");
                self.remove_cluster_dir().await;
                return Err(e);
            }
        };
        self.nodes = specs.into_iter().map(ProvisionedNode::planned).collect();

        let provisioner = Provisioner::new(
            self.config.clone(),
            self.driver.clone(),
            self.host_net.clone(),
        );
        if let Err(e) = provisioner.provision_all(&mut self.nodes, &self.cancel).await {
            error!(cluster = %self.config.name, error = %e, "provisioning failed, tearing down");
            self.cleanup().await;
            return Err(e);
        }

        let bootstrapper = Bootstrapper::new(self.exec.clone())
            .with_readiness(self.poll_interval, self.readiness_timeout);
        match bootstrapper
            .run(&self.config.network.subnet_cidr, &self.nodes, &self.cancel)
            .await
        {
            Ok(join) => {
                self.join_command = Some(join);
                info!(cluster = %self.config.name, "cluster ready");
                Ok(())
            }
            Err(e) => {
                error!(cluster = %self.config.name, error = %e, "bootstrap failed, tearing down");
                self.cleanup().await;
                Err(e)
            }
        }
    }

    /// Tear the cluster down: cancel all in-flight work, shut down every
    /// running VM, and remove per-node state unless persistence was
    /// requested. Idempotent and safe after partial failure.
    pub async fn cleanup(&mut self) {
        self.cancel.cancel();
        cleanup_nodes(
            &mut self.nodes,
            self.config.persistent,
            self.driver.as_ref(),
        )
        .await;
    }

    /// Remove the cluster directory after a planning failure, where no
    /// node records exist yet to clean through.
    async fn remove_cluster_dir(&self) {
        if self.config.persistent {
            return;
        }
        if let Err(e) = tokio::fs::remove_dir_all(self.config.cluster_dir()).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                error!(
                    dir = %self.config.cluster_dir().display(),
                    error = %e,
                    "could not remove cluster dir after failed planning"
                );
            }
        }
    }
}
