//! SSH command channel.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, trace};

use crate::error::{RemoteError, RemoteResult};

/// Remote execution contract: reachability checks and one-shot commands.
#[async_trait]
pub trait RemoteExec: Send + Sync {
    /// Run `command` on the node at `ip`, returning its combined output.
    async fn run(&self, ip: &str, command: &str) -> RemoteResult<String>;

    /// Lightweight reachability probe used by the readiness waiter.
    async fn ping(&self, ip: &str) -> RemoteResult<()>;
}

/// Runs commands over the host's `ssh` client as root.
///
/// Host-key checking is disabled: node addresses are recycled across
/// cluster runs and the guests generate fresh keys on every boot.
#[derive(Debug, Clone)]
pub struct SshExec {
    user: String,
    connect_timeout_secs: u32,
}

impl SshExec {
    pub fn new() -> Self {
        Self {
            user: "root".to_string(),
            connect_timeout_secs: 5,
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    fn base_command(&self, ip: &str) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.args(["-o", "StrictHostKeyChecking=no"])
            .args(["-o", "UserKnownHostsFile=/dev/null"])
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.connect_timeout_secs))
            .arg(format!("{}@{}", self.user, ip));
        cmd
    }
}

impl Default for SshExec {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteExec for SshExec {
    async fn run(&self, ip: &str, command: &str) -> RemoteResult<String> {
        debug!(%ip, %command, "running remote command");
        let output = self.base_command(ip).arg(command).output().await?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            Ok(combined)
        } else {
            Err(RemoteError::CommandFailed {
                ip: ip.to_string(),
                status: output.status.to_string(),
                output: combined.trim().to_string(),
            })
        }
    }

    async fn ping(&self, ip: &str) -> RemoteResult<()> {
        trace!(%ip, "probing ssh reachability");
        let status = self.base_command(ip).arg("true").status().await?;
        if status.success() {
            Ok(())
        } else {
            Err(RemoteError::Unreachable {
                ip: ip.to_string(),
                reason: status.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_errors_render_node_address() {
        let err = RemoteError::CommandFailed {
            ip: "10.0.0.20".to_string(),
            status: "exit status: 1".to_string(),
            output: "kubeadm: not found".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("10.0.0.20"));
        assert!(msg.contains("kubeadm: not found"));
    }

    #[tokio::test]
    async fn ping_unroutable_address_fails() {
        // TEST-NET-1 is guaranteed unroutable; the 5s connect timeout
        // bounds the probe.
        let exec = SshExec::new();
        assert!(exec.ping("192.0.2.1").await.is_err());
    }
}
