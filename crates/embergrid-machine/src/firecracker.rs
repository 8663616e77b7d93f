//! Firecracker process driver.
//!
//! Renders a [`MachineSpec`] as Firecracker's JSON config file and runs
//! one `firecracker` process per VM, with its API socket and log file
//! rooted in the node's working directory. Shutdown asks the guest to
//! power off (Ctrl-Alt-Del via the API socket) and falls back to killing
//! the process after a grace period.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::driver::{MachineDriver, MachineHandle};
use crate::error::{MachineError, MachineResult};
use crate::spec::MachineSpec;

/// How long a guest gets to power off before the process is killed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Drives the `firecracker` binary, one process per microVM.
#[derive(Debug, Clone)]
pub struct FirecrackerDriver {
    binary: PathBuf,
}

impl FirecrackerDriver {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for FirecrackerDriver {
    fn default() -> Self {
        Self::new("firecracker")
    }
}

#[async_trait]
impl MachineDriver for FirecrackerDriver {
    async fn create_and_start(&self, spec: &MachineSpec) -> MachineResult<MachineHandle> {
        let config_path = spec.socket_path.with_file_name("vm-config.json");
        let body = serde_json::to_vec_pretty(&render_config(spec))
            .map_err(|e| MachineError::Config {
                path: config_path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            })?;
        tokio::fs::write(&config_path, body)
            .await
            .map_err(|source| MachineError::Config {
                path: config_path.clone(),
                source,
            })?;

        // Firecracker refuses to start if a stale socket is present.
        if let Err(e) = tokio::fs::remove_file(&spec.socket_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!(vm_id = %spec.vm_id, error = %e, "could not remove stale api socket");
            }
        }

        let log = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&spec.log_path)
            .map_err(|source| MachineError::Config {
                path: spec.log_path.clone(),
                source,
            })?;

        let child = Command::new(&self.binary)
            .arg("--api-sock")
            .arg(&spec.socket_path)
            .arg("--config-file")
            .arg(&config_path)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log.try_clone()?))
            .stderr(Stdio::from(log))
            .spawn()
            .map_err(|source| MachineError::Spawn {
                vm_id: spec.vm_id.clone(),
                source,
            })?;

        info!(
            vm_id = %spec.vm_id,
            socket = %spec.socket_path.display(),
            "firecracker started"
        );
        Ok(MachineHandle::with_child(
            &spec.vm_id,
            spec.socket_path.clone(),
            child,
        ))
    }

    async fn shutdown(&self, handle: &MachineHandle) -> MachineResult<()> {
        let Some(mut child) = handle.take_child().await else {
            debug!(vm_id = %handle.vm_id(), "machine already stopped");
            return Ok(());
        };

        if let Err(e) = send_ctrl_alt_del(handle.socket_path()).await {
            debug!(
                vm_id = %handle.vm_id(),
                error = %e,
                "graceful power-off request failed"
            );
        }

        match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
            Ok(Ok(status)) => {
                info!(vm_id = %handle.vm_id(), %status, "machine exited");
                Ok(())
            }
            Ok(Err(source)) => Err(MachineError::Shutdown {
                vm_id: handle.vm_id().to_string(),
                source,
            }),
            Err(_) => {
                warn!(
                    vm_id = %handle.vm_id(),
                    "machine did not exit within grace period, killing"
                );
                child.start_kill().map_err(|source| MachineError::Shutdown {
                    vm_id: handle.vm_id().to_string(),
                    source,
                })?;
                let _ = child.wait().await;
                Ok(())
            }
        }
    }
}

/// Ask the guest to power off by injecting Ctrl-Alt-Del through the
/// Firecracker API socket.
async fn send_ctrl_alt_del(socket_path: &Path) -> MachineResult<()> {
    let output = Command::new("curl")
        .args(["-s", "-S", "--unix-socket"])
        .arg(socket_path)
        .args([
            "-X",
            "PUT",
            "http://localhost/actions",
            "-H",
            "Content-Type: application/json",
            "-d",
            r#"{"action_type": "SendCtrlAltDel"}"#,
        ])
        .output()
        .await?;
    if output.status.success() {
        Ok(())
    } else {
        Err(MachineError::HostCommand {
            command: format!("curl --unix-socket {}", socket_path.display()),
            output: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

// ── Firecracker config-file schema ──────────────────────────────────

#[derive(Serialize)]
struct FcConfig<'a> {
    #[serde(rename = "boot-source")]
    boot_source: FcBootSource<'a>,
    drives: Vec<FcDrive<'a>>,
    #[serde(rename = "machine-config")]
    machine_config: FcMachineConfig,
    #[serde(rename = "network-interfaces")]
    network_interfaces: Vec<FcNetworkInterface<'a>>,
}

#[derive(Serialize)]
struct FcBootSource<'a> {
    kernel_image_path: &'a Path,
    boot_args: String,
}

#[derive(Serialize)]
struct FcDrive<'a> {
    drive_id: &'static str,
    path_on_host: &'a Path,
    is_root_device: bool,
    is_read_only: bool,
}

#[derive(Serialize)]
struct FcMachineConfig {
    vcpu_count: u32,
    mem_size_mib: u64,
    smt: bool,
}

#[derive(Serialize)]
struct FcNetworkInterface<'a> {
    iface_id: &'static str,
    host_dev_name: &'a str,
}

fn render_config(spec: &MachineSpec) -> FcConfig<'_> {
    FcConfig {
        boot_source: FcBootSource {
            kernel_image_path: &spec.kernel_image,
            boot_args: spec.boot_args(),
        },
        drives: vec![FcDrive {
            drive_id: "rootfs",
            path_on_host: &spec.root_drive,
            is_root_device: spec.root_device,
            is_read_only: spec.read_only,
        }],
        machine_config: FcMachineConfig {
            vcpu_count: spec.vcpus,
            mem_size_mib: spec.memory_mb,
            smt: true,
        },
        network_interfaces: vec![FcNetworkInterface {
            iface_id: "eth0",
            host_dev_name: &spec.tap_device,
        }],
    }
}
