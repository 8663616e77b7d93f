//! Node provisioner — one NodeSpec in, one running microVM out.
//!
//! All nodes are provisioned in parallel, one task per node, each touching
//! only its own node's working directory. The fan-in waits for **every**
//! task before deciding the cluster-wide outcome; siblings are not aborted
//! mid-flight on first failure.

use std::path::PathBuf;
use std::sync::Arc;

use ipnet::Ipv4Net;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use ember_core::ClusterConfig;
use embergrid_machine::{tap_device_name, HostNetwork, MachineDriver, MachineHandle, MachineSpec};

use crate::error::{ClusterError, ClusterResult};
use crate::node::{NodeSpec, NodeState, ProvisionedNode};

/// Turns planned nodes into running microVMs through the virtualization
/// and host-network collaborators.
#[derive(Clone)]
pub struct Provisioner {
    config: ClusterConfig,
    driver: Arc<dyn MachineDriver>,
    host_net: Arc<dyn HostNetwork>,
}

impl Provisioner {
    pub fn new(
        config: ClusterConfig,
        driver: Arc<dyn MachineDriver>,
        host_net: Arc<dyn HostNetwork>,
    ) -> Self {
        Self {
            config,
            driver,
            host_net,
        }
    }

    /// Provision every node concurrently. Waits for all units to finish,
    /// attaches handles to the nodes that reached `Running`, and returns
    /// the first failure in planning order, if any.
    ///
    /// The node slice is pre-sized by the planner; tasks report back by
    /// planning index, so no shared structure is mutated concurrently.
    pub async fn provision_all(
        &self,
        nodes: &mut [ProvisionedNode],
        cancel: &CancellationToken,
    ) -> ClusterResult<()> {
        let mut tasks = JoinSet::new();
        for (index, node) in nodes.iter_mut().enumerate() {
            node.state = NodeState::Provisioning;
            let provisioner = self.clone();
            let spec = node.spec.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move { (index, provisioner.provision_node(&spec, &cancel).await) });
        }

        let mut results: Vec<Option<ClusterResult<(Arc<MachineHandle>, PathBuf)>>> =
            (0..nodes.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(e) => error!(error = %e, "provisioning task panicked"),
            }
        }

        let mut first_err = None;
        for (node, slot) in nodes.iter_mut().zip(results) {
            match slot {
                Some(Ok((handle, root_drive))) => {
                    node.handle = Some(handle);
                    node.root_drive = Some(root_drive);
                    node.state = NodeState::Running;
                }
                Some(Err(e)) => {
                    node.state = NodeState::Failed;
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
                None => {
                    node.state = NodeState::Failed;
                    if first_err.is_none() {
                        first_err = Some(ClusterError::Provisioning {
                            node: node.spec.id.clone(),
                            step: "provision task",
                            source: anyhow::anyhow!("provisioning task aborted"),
                        });
                    }
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Provision a single node: work dir, private rootfs copy, tap
    /// device, then create-and-start. Stops at the first failing step.
    async fn provision_node(
        &self,
        spec: &NodeSpec,
        cancel: &CancellationToken,
    ) -> ClusterResult<(Arc<MachineHandle>, PathBuf)> {
        if cancel.is_cancelled() {
            return Err(ClusterError::Cancelled);
        }
        info!(node_id = %spec.id, ip = %spec.ip, "provisioning node");

        tokio::fs::create_dir_all(&spec.work_dir)
            .await
            .map_err(|source| provisioning_err(spec, "create work dir", source))?;

        // Each node boots a private copy; a shared image would let one
        // VM's writes corrupt another's disk.
        let root_drive = spec.root_drive_path();
        tokio::fs::copy(&self.config.rootfs, &root_drive)
            .await
            .map_err(|source| provisioning_err(spec, "copy rootfs", source))?;

        if cancel.is_cancelled() {
            return Err(ClusterError::Cancelled);
        }

        let tap = tap_device_name(&spec.id);
        self.host_net
            .ensure_device(&tap)
            .await
            .map_err(|source| provisioning_err(spec, "ensure tap device", source))?;

        if cancel.is_cancelled() {
            return Err(ClusterError::Cancelled);
        }

        let machine_spec = self.machine_spec(spec, tap, root_drive.clone());
        let handle = self
            .driver
            .create_and_start(&machine_spec)
            .await
            .map_err(|source| provisioning_err(spec, "start machine", source))?;

        info!(node_id = %spec.id, "node running");
        Ok((Arc::new(handle), root_drive))
    }

    fn machine_spec(&self, spec: &NodeSpec, tap_device: String, root_drive: PathBuf) -> MachineSpec {
        MachineSpec {
            vm_id: spec.id.clone(),
            vcpus: self.config.vcpus,
            memory_mb: self.config.memory_mb,
            kernel_image: self.config.kernel.clone(),
            root_drive,
            root_device: true,
            read_only: false,
            tap_device,
            ip: spec.ip.clone(),
            prefix_len: subnet_prefix_len(&self.config.network.subnet_cidr),
            gateway: self.config.network.gateway.clone(),
            log_path: spec.log_path(),
            socket_path: spec.socket_path(),
        }
    }
}

fn provisioning_err(
    spec: &NodeSpec,
    step: &'static str,
    source: impl Into<anyhow::Error>,
) -> ClusterError {
    ClusterError::Provisioning {
        node: spec.id.clone(),
        step,
        source: source.into(),
    }
}

/// Prefix length of the node subnet; /24 for the unparsable-CIDR
/// fallback, matching the allocator's degraded scheme.
fn subnet_prefix_len(subnet_cidr: &str) -> u8 {
    subnet_cidr
        .parse::<Ipv4Net>()
        .map(|net| net.prefix_len())
        .unwrap_or(24)
}
