//! Readiness waiter — the mandatory gate before any bootstrap command.
//!
//! Polls a node's remote channel until a trivial probe succeeds or a
//! single deadline (measured from the first poll) expires. Cancellation
//! is observed at every tick.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use embergrid_remote::RemoteExec;

use crate::error::{ClusterError, ClusterResult};

/// Default interval between reachability probes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default overall deadline for a node to become reachable.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Wait until `ip` answers the remote channel's probe.
///
/// The deadline is fixed when polling starts; slow individual probes do
/// not extend it.
pub async fn wait_ready(
    exec: &dyn RemoteExec,
    node_id: &str,
    ip: &str,
    poll_interval: Duration,
    timeout: Duration,
    cancel: &CancellationToken,
) -> ClusterResult<()> {
    let deadline = Instant::now() + timeout;
    debug!(%node_id, %ip, timeout_secs = timeout.as_secs(), "waiting for node readiness");

    loop {
        if cancel.is_cancelled() {
            return Err(ClusterError::Cancelled);
        }
        if Instant::now() >= deadline {
            return Err(ClusterError::ReadinessTimeout {
                node: node_id.to_string(),
            });
        }

        match exec.ping(ip).await {
            Ok(()) => {
                info!(%node_id, %ip, "node reachable");
                return Ok(());
            }
            Err(e) => trace!(%node_id, error = %e, "node not yet reachable"),
        }

        tokio::select! {
            _ = tokio::time::sleep(poll_interval) => {}
            _ = cancel.cancelled() => return Err(ClusterError::Cancelled),
        }
    }
}
