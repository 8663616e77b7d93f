//! Bootstrap coordinator — the strictly ordered cluster-formation
//! protocol.
//!
//! Control-plane readiness → `kubeadm init` → network overlay → join
//! token → per-worker readiness + join, in planning order. The join
//! command only exists as a [`JoinCommand`] returned by the token step,
//! so joining a worker before the token is retrieved cannot be written.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use embergrid_remote::RemoteExec;

use crate::error::{ClusterError, ClusterResult};
use crate::node::ProvisionedNode;
use crate::readiness::{wait_ready, DEFAULT_POLL_INTERVAL, DEFAULT_TIMEOUT};

/// Manifest applied on the control-plane node to install the pod network
/// overlay.
const OVERLAY_INSTALL: &str =
    "kubectl apply -f https://docs.projectcalico.org/manifests/calico.yaml";

/// The one-time credential that admits a worker into the cluster.
///
/// Captured verbatim (trimmed) from the control plane, exactly once per
/// cluster; every worker join executes this same string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinCommand(String);

impl JoinCommand {
    pub(crate) fn new(raw: &str) -> Self {
        Self(raw.trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Runs the ordered bootstrap protocol over the remote channel.
pub struct Bootstrapper {
    exec: Arc<dyn RemoteExec>,
    poll_interval: Duration,
    readiness_timeout: Duration,
}

impl Bootstrapper {
    pub fn new(exec: Arc<dyn RemoteExec>) -> Self {
        Self {
            exec,
            poll_interval: DEFAULT_POLL_INTERVAL,
            readiness_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the readiness polling policy (tests use tight timings).
    pub fn with_readiness(mut self, poll_interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.readiness_timeout = timeout;
        self
    }

    /// Form the cluster. `nodes[0]` must be the running control-plane
    /// node; workers follow in planning order.
    pub async fn run(
        &self,
        pod_network_cidr: &str,
        nodes: &[ProvisionedNode],
        cancel: &CancellationToken,
    ) -> ClusterResult<JoinCommand> {
        let Some((control_plane, workers)) = nodes.split_first() else {
            return Err(ClusterError::Bootstrap {
                node: String::new(),
                step: "kubeadm init",
                source: anyhow::anyhow!("no nodes to bootstrap"),
            });
        };

        self.await_ready(control_plane, cancel).await?;
        self.initialize_control_plane(control_plane, pod_network_cidr, cancel)
            .await?;
        self.install_overlay(control_plane, cancel).await?;
        let join = self.fetch_join_command(control_plane, cancel).await?;

        for worker in workers {
            self.await_ready(worker, cancel).await?;
            self.join_worker(worker, &join, cancel).await?;
        }

        info!(
            control_plane = %control_plane.spec.id,
            workers = workers.len(),
            "cluster bootstrap complete"
        );
        Ok(join)
    }

    async fn await_ready(
        &self,
        node: &ProvisionedNode,
        cancel: &CancellationToken,
    ) -> ClusterResult<()> {
        wait_ready(
            self.exec.as_ref(),
            &node.spec.id,
            &node.spec.ip,
            self.poll_interval,
            self.readiness_timeout,
            cancel,
        )
        .await
    }

    async fn initialize_control_plane(
        &self,
        node: &ProvisionedNode,
        pod_network_cidr: &str,
        cancel: &CancellationToken,
    ) -> ClusterResult<()> {
        info!(node_id = %node.spec.id, "initializing control plane");
        let command = format!(
            "kubeadm init --apiserver-advertise-address={} --pod-network-cidr={} --node-name={}",
            node.spec.ip, pod_network_cidr, node.spec.id
        );
        self.run_step(node, "kubeadm init", &command, cancel)
            .await
            .map(|_| ())
    }

    async fn install_overlay(
        &self,
        node: &ProvisionedNode,
        cancel: &CancellationToken,
    ) -> ClusterResult<()> {
        info!(node_id = %node.spec.id, "installing network overlay");
        self.run_step(node, "install overlay", OVERLAY_INSTALL, cancel)
            .await
            .map(|_| ())
    }

    async fn fetch_join_command(
        &self,
        node: &ProvisionedNode,
        cancel: &CancellationToken,
    ) -> ClusterResult<JoinCommand> {
        let output = self
            .run_step(
                node,
                "create join token",
                "kubeadm token create --print-join-command",
                cancel,
            )
            .await?;
        info!(node_id = %node.spec.id, "join credential captured");
        Ok(JoinCommand::new(&output))
    }

    async fn join_worker(
        &self,
        worker: &ProvisionedNode,
        join: &JoinCommand,
        cancel: &CancellationToken,
    ) -> ClusterResult<()> {
        info!(node_id = %worker.spec.id, "joining worker to cluster");
        self.run_step(worker, "kubeadm join", join.as_str(), cancel)
            .await
            .map(|_| ())
    }

    /// Dispatch one bootstrap command, honoring cancellation before the
    /// command leaves the host.
    async fn run_step(
        &self,
        node: &ProvisionedNode,
        step: &'static str,
        command: &str,
        cancel: &CancellationToken,
    ) -> ClusterResult<String> {
        if cancel.is_cancelled() {
            return Err(ClusterError::Cancelled);
        }
        self.exec
            .run(&node.spec.ip, command)
            .await
            .map_err(|source| ClusterError::Bootstrap {
                node: node.spec.id.clone(),
                step,
                source: source.into(),
            })
    }
}
