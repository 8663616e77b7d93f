//! Host tap-device management.
//!
//! One tap device per node, named after the node ID. Creation is
//! idempotent: an existing device with the expected name is reused.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{MachineError, MachineResult};

/// Tap device name for a node: `tap-<node-id>`.
pub fn tap_device_name(vm_id: &str) -> String {
    format!("tap-{vm_id}")
}

/// Host networking collaborator: "ensure this device exists and is up".
#[async_trait]
pub trait HostNetwork: Send + Sync {
    async fn ensure_device(&self, name: &str) -> MachineResult<()>;
}

/// Manages tap devices through `ip(8)`.
#[derive(Debug, Clone, Default)]
pub struct IpTap;

#[async_trait]
impl HostNetwork for IpTap {
    async fn ensure_device(&self, name: &str) -> MachineResult<()> {
        // Reuse a pre-existing device rather than failing on EEXIST.
        let exists = Command::new("ip")
            .args(["link", "show", name])
            .output()
            .await?
            .status
            .success();
        if exists {
            debug!(device = name, "tap device already exists, reusing");
            return Ok(());
        }

        run_ip(&["tuntap", "add", "dev", name, "mode", "tap"]).await?;
        run_ip(&["link", "set", "dev", name, "up"]).await?;
        info!(device = name, "tap device created and up");
        Ok(())
    }
}

async fn run_ip(args: &[&str]) -> MachineResult<()> {
    let output = Command::new("ip").args(args).output().await?;
    if output.status.success() {
        Ok(())
    } else {
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Err(MachineError::HostCommand {
            command: format!("ip {}", args.join(" ")),
            output: combined.trim().to_string(),
        })
    }
}
