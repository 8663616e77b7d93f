//! End-to-end orchestration scenarios against in-memory collaborators:
//! full provision + bootstrap, fail-fast rollback, readiness timeout,
//! cleanup idempotency, and the persistence contract.

use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use ember_core::{ClusterConfig, NetworkConfig};
use embergrid_cluster::{Cluster, ClusterError, NodeState};
use embergrid_machine::{
    HostNetwork, MachineDriver, MachineHandle, MachineResult, MachineSpec,
};
use embergrid_remote::{RemoteError, RemoteExec, RemoteResult};

const JOIN_OUTPUT: &str =
    "kubeadm join 10.0.0.10:6443 --token abc.def --discovery-token-ca-cert-hash sha256:1234\n";

// ── Fake collaborators ──────────────────────────────────────────────

#[derive(Default)]
struct FakeDriver {
    started: Mutex<Vec<String>>,
    shutdowns: Mutex<Vec<String>>,
    fail_on: Option<String>,
}

impl FakeDriver {
    fn failing_on(node_id: &str) -> Self {
        Self {
            fail_on: Some(node_id.to_string()),
            ..Self::default()
        }
    }

    fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    fn shutdowns(&self) -> Vec<String> {
        self.shutdowns.lock().unwrap().clone()
    }
}

#[async_trait]
impl MachineDriver for FakeDriver {
    async fn create_and_start(&self, spec: &MachineSpec) -> MachineResult<MachineHandle> {
        if self.fail_on.as_deref() == Some(spec.vm_id.as_str()) {
            return Err(embergrid_machine::MachineError::Spawn {
                vm_id: spec.vm_id.clone(),
                source: std::io::Error::other("vm refused to boot"),
            });
        }
        self.started.lock().unwrap().push(spec.vm_id.clone());
        Ok(MachineHandle::detached(
            &spec.vm_id,
            spec.socket_path.clone(),
        ))
    }

    async fn shutdown(&self, handle: &MachineHandle) -> MachineResult<()> {
        self.shutdowns
            .lock()
            .unwrap()
            .push(handle.vm_id().to_string());
        Ok(())
    }
}

#[derive(Default)]
struct FakeNet {
    devices: Mutex<Vec<String>>,
}

#[async_trait]
impl HostNetwork for FakeNet {
    async fn ensure_device(&self, name: &str) -> MachineResult<()> {
        self.devices.lock().unwrap().push(name.to_string());
        Ok(())
    }
}

/// Reachable executor scripting the kubeadm protocol.
#[derive(Default)]
struct FakeExec {
    commands: Mutex<Vec<(String, String)>>,
    unreachable: bool,
    fail_join_on: Option<String>,
}

impl FakeExec {
    fn never_ready() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    fn failing_join_on(ip: &str) -> Self {
        Self {
            fail_join_on: Some(ip.to_string()),
            ..Self::default()
        }
    }

    fn recorded(&self) -> Vec<(String, String)> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteExec for FakeExec {
    async fn run(&self, ip: &str, command: &str) -> RemoteResult<String> {
        self.commands
            .lock()
            .unwrap()
            .push((ip.to_string(), command.to_string()));
        if command.starts_with("kubeadm join") && self.fail_join_on.as_deref() == Some(ip) {
            return Err(RemoteError::CommandFailed {
                ip: ip.to_string(),
                status: "exit status: 1".to_string(),
                output: "join failed".to_string(),
            });
        }
        if command.starts_with("kubeadm token create") {
            return Ok(JOIN_OUTPUT.to_string());
        }
        Ok(String::new())
    }

    async fn ping(&self, ip: &str) -> RemoteResult<()> {
        if self.unreachable {
            Err(RemoteError::Unreachable {
                ip: ip.to_string(),
                reason: "connection refused".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

// ── Harness ─────────────────────────────────────────────────────────

struct Harness {
    _tmp: tempfile::TempDir,
    config: ClusterConfig,
}

impl Harness {
    fn new(name: &str, node_count: u32, persistent: bool) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let rootfs = tmp.path().join("rootfs.ext4");
        let mut f = std::fs::File::create(&rootfs).unwrap();
        f.write_all(b"rootfs-image").unwrap();

        let config = ClusterConfig {
            name: name.to_string(),
            node_count,
            vcpus: 1,
            memory_mb: 1024,
            rootfs,
            kernel: PathBuf::from("/setup/vmlinux"),
            network: NetworkConfig {
                subnet_cidr: "10.0.0.0/24".to_string(),
                gateway: "10.0.0.1".to_string(),
            },
            persistent,
            base_dir: tmp.path().join("clusters"),
        };
        Self { _tmp: tmp, config }
    }

    fn cluster(
        &self,
        driver: Arc<FakeDriver>,
        exec: Arc<FakeExec>,
    ) -> Cluster {
        Cluster::new(
            self.config.clone(),
            driver,
            Arc::new(FakeNet::default()),
            exec,
        )
        .unwrap()
        .with_readiness(Duration::from_millis(1), Duration::from_millis(50))
    }
}

// ── Scenarios ───────────────────────────────────────────────────────

#[tokio::test]
async fn full_provision_produces_a_joined_cluster() {
    let harness = Harness::new("t1", 3, false);
    let driver = Arc::new(FakeDriver::default());
    let exec = Arc::new(FakeExec::default());
    let mut cluster = harness.cluster(driver.clone(), exec.clone());

    cluster.provision().await.unwrap();

    // Scenario A layout: one control-plane at .10, workers at .20/.21.
    let nodes = cluster.nodes();
    assert_eq!(nodes.len(), 3);
    assert_eq!(nodes[0].spec.id, "t1-control-plane");
    assert_eq!(nodes[0].spec.ip, "10.0.0.10");
    assert_eq!(nodes[1].spec.id, "t1-worker-0");
    assert_eq!(nodes[1].spec.ip, "10.0.0.20");
    assert_eq!(nodes[2].spec.id, "t1-worker-1");
    assert_eq!(nodes[2].spec.ip, "10.0.0.21");
    assert!(nodes.iter().all(|n| n.state == NodeState::Running));

    // Each node booted a private rootfs copy in its own directory.
    for node in nodes {
        assert!(node.spec.root_drive_path().is_file());
    }

    // The captured credential is the trimmed token line, and each worker
    // join executed that identical string.
    let join = cluster.join_command().unwrap();
    assert_eq!(join.as_str(), JOIN_OUTPUT.trim());
    let joins: Vec<_> = exec
        .recorded()
        .into_iter()
        .filter(|(_, c)| c.starts_with("kubeadm join"))
        .collect();
    assert_eq!(joins.len(), 2);
    assert!(joins.iter().all(|(_, c)| c == JOIN_OUTPUT.trim()));

    assert_eq!(driver.started().len(), 3);
    assert!(driver.shutdowns().is_empty());
}

#[tokio::test]
async fn provisioning_failure_rolls_back_started_nodes() {
    // Scenario B: worker-1 fails to boot; the whole cluster is torn down.
    let harness = Harness::new("t1", 3, false);
    let driver = Arc::new(FakeDriver::failing_on("t1-worker-1"));
    let exec = Arc::new(FakeExec::default());
    let mut cluster = harness.cluster(driver.clone(), exec.clone());

    let err = cluster.provision().await.unwrap_err();
    match err {
        ClusterError::Provisioning { node, .. } => assert_eq!(node, "t1-worker-1"),
        other => panic!("expected provisioning error, got {other:?}"),
    }

    // Every node that reached running was shut down, failed one skipped.
    let mut shutdowns = driver.shutdowns();
    shutdowns.sort();
    assert_eq!(shutdowns, vec!["t1-control-plane", "t1-worker-0"]);

    // No bootstrap command was ever dispatched.
    assert!(exec.recorded().is_empty());

    // No per-node state remains on disk.
    for node in cluster.nodes() {
        assert!(!node.spec.work_dir.exists());
    }
}

#[tokio::test]
async fn readiness_timeout_names_the_stuck_node_and_cleans_up() {
    // Scenario C: VMs start but never answer; the control plane is the
    // first gate to trip.
    let harness = Harness::new("t1", 3, false);
    let driver = Arc::new(FakeDriver::default());
    let exec = Arc::new(FakeExec::never_ready());
    let mut cluster = harness.cluster(driver.clone(), exec.clone());

    let err = cluster.provision().await.unwrap_err();
    match err {
        ClusterError::ReadinessTimeout { node } => assert_eq!(node, "t1-control-plane"),
        other => panic!("expected readiness timeout, got {other:?}"),
    }

    assert_eq!(driver.shutdowns().len(), 3);
    assert!(exec.recorded().is_empty());
}

#[tokio::test]
async fn worker_join_failure_is_fatal_to_the_cluster() {
    let harness = Harness::new("t1", 3, false);
    let driver = Arc::new(FakeDriver::default());
    let exec = Arc::new(FakeExec::failing_join_on("10.0.0.21"));
    let mut cluster = harness.cluster(driver.clone(), exec.clone());

    let err = cluster.provision().await.unwrap_err();
    match err {
        ClusterError::Bootstrap { node, .. } => assert_eq!(node, "t1-worker-1"),
        other => panic!("expected bootstrap error, got {other:?}"),
    }

    // No partial-cluster success: everything was torn down.
    assert_eq!(driver.shutdowns().len(), 3);
    assert!(cluster.join_command().is_none());
}

#[tokio::test]
async fn cleanup_is_idempotent() {
    let harness = Harness::new("t1", 2, false);
    let driver = Arc::new(FakeDriver::default());
    let exec = Arc::new(FakeExec::default());
    let mut cluster = harness.cluster(driver.clone(), exec.clone());

    cluster.provision().await.unwrap();
    cluster.cleanup().await;
    cluster.cleanup().await;

    // The second pass performed no redundant shutdown.
    assert_eq!(driver.shutdowns().len(), 2);
}

#[tokio::test]
async fn persistent_clusters_keep_node_state() {
    let harness = Harness::new("t1", 2, true);
    let driver = Arc::new(FakeDriver::default());
    let exec = Arc::new(FakeExec::default());
    let mut cluster = harness.cluster(driver.clone(), exec.clone());

    cluster.provision().await.unwrap();
    cluster.cleanup().await;

    for node in cluster.nodes() {
        assert!(node.spec.work_dir.is_dir());
        assert!(node.spec.root_drive_path().is_file());
    }
}

#[tokio::test]
async fn cancelled_cluster_provisions_nothing_further() {
    let harness = Harness::new("t1", 3, false);
    let driver = Arc::new(FakeDriver::default());
    let exec = Arc::new(FakeExec::default());
    let mut cluster = harness.cluster(driver.clone(), exec.clone());

    cluster.cancellation_token().cancel();
    let err = cluster.provision().await.unwrap_err();
    assert!(matches!(err, ClusterError::Cancelled));
    assert!(exec.recorded().is_empty());
}

#[tokio::test]
async fn invalid_request_touches_no_resources() {
    let harness = Harness::new("t1", 0, false);
    let driver = Arc::new(FakeDriver::default());
    let err = Cluster::new(
        harness.config.clone(),
        driver.clone(),
        Arc::new(FakeNet::default()),
        Arc::new(FakeExec::default()),
    )
    .err()
    .expect("zero nodes must be rejected");
    assert!(matches!(err, ClusterError::Configuration(_)));
    assert!(driver.started().is_empty());
    assert!(!harness.config.cluster_dir().exists());
}
