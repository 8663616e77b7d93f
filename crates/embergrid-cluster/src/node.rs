//! Node identity and lifecycle state.

use std::path::PathBuf;
use std::sync::Arc;

use ember_core::NodeRole;
use embergrid_machine::MachineHandle;

/// A planned node: identity, role, assigned IP, and working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSpec {
    /// `<cluster-name>-<role-suffix>`, unique within the cluster.
    pub id: String,
    pub role: NodeRole,
    /// Assigned static IP, unique within the cluster.
    pub ip: String,
    /// Dedicated working directory holding the node's private rootfs
    /// copy, its hypervisor log, and its API socket.
    pub work_dir: PathBuf,
}

impl NodeSpec {
    pub fn root_drive_path(&self) -> PathBuf {
        self.work_dir.join("root.img")
    }

    pub fn log_path(&self) -> PathBuf {
        self.work_dir.join("firecracker.log")
    }

    pub fn socket_path(&self) -> PathBuf {
        self.work_dir.join("firecracker.sock")
    }
}

/// Lifecycle of a node. A node that fails provisioning never reaches
/// `Running`; it triggers cluster-wide rollback instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Planned,
    Provisioning,
    Running,
    Failed,
    Shutdown,
}

/// A node plus (once provisioned) the live handle to its VM.
#[derive(Debug)]
pub struct ProvisionedNode {
    pub spec: NodeSpec,
    pub state: NodeState,
    /// Root drive actually booted, set when the VM starts.
    pub root_drive: Option<PathBuf>,
    /// Live VM handle. `None` until running, taken back at shutdown.
    pub handle: Option<Arc<MachineHandle>>,
}

impl ProvisionedNode {
    pub fn planned(spec: NodeSpec) -> Self {
        Self {
            spec,
            state: NodeState::Planned,
            root_drive: None,
            handle: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == NodeState::Running
    }
}
