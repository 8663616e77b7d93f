//! The machine driver contract and the live VM handle.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Child;
use tokio::sync::Mutex;

use crate::error::MachineResult;
use crate::spec::MachineSpec;

/// Creates and tears down microVMs. Object-safe so the orchestrator can be
/// tested against an in-memory fake.
#[async_trait]
pub trait MachineDriver: Send + Sync {
    /// Create the VM described by `spec` and start it.
    async fn create_and_start(&self, spec: &MachineSpec) -> MachineResult<MachineHandle>;

    /// Request a graceful shutdown. Must be safe to call on an
    /// already-stopped handle (a no-op, never an error).
    async fn shutdown(&self, handle: &MachineHandle) -> MachineResult<()>;
}

/// A live (or already-stopped) microVM.
///
/// The backing process is held behind a mutex-guarded `Option` so that
/// shutdown can `take()` it exactly once; a second shutdown observes `None`
/// and does nothing.
pub struct MachineHandle {
    vm_id: String,
    socket_path: PathBuf,
    child: Mutex<Option<Child>>,
}

impl MachineHandle {
    /// Handle backed by a spawned hypervisor process.
    pub fn with_child(vm_id: impl Into<String>, socket_path: PathBuf, child: Child) -> Self {
        Self {
            vm_id: vm_id.into(),
            socket_path,
            child: Mutex::new(Some(child)),
        }
    }

    /// Handle with no backing process. Used by fakes and by handles whose
    /// process has already been reaped.
    pub fn detached(vm_id: impl Into<String>, socket_path: PathBuf) -> Self {
        Self {
            vm_id: vm_id.into(),
            socket_path,
            child: Mutex::new(None),
        }
    }

    pub fn vm_id(&self) -> &str {
        &self.vm_id
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Take ownership of the backing process, leaving the handle stopped.
    pub async fn take_child(&self) -> Option<Child> {
        self.child.lock().await.take()
    }

    /// Whether a backing process is still attached.
    pub async fn is_attached(&self) -> bool {
        self.child.lock().await.is_some()
    }
}

impl std::fmt::Debug for MachineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MachineHandle")
            .field("vm_id", &self.vm_id)
            .field("socket_path", &self.socket_path)
            .finish_non_exhaustive()
    }
}
