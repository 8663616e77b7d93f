//! Cleanup manager — idempotent, best-effort teardown.
//!
//! Shuts down every node that holds a live VM handle, then removes each
//! node's working directory unless persistence was requested. Individual
//! failures are logged and skipped; cleanup never fails its caller.

use tracing::{debug, info, warn};

use embergrid_machine::MachineDriver;

use crate::node::{NodeState, ProvisionedNode};

/// Tear down all nodes. Nodes that never reached `Running` are skipped
/// for shutdown; handles are taken out of the node records so a second
/// invocation performs no redundant destructive action.
pub async fn cleanup_nodes(
    nodes: &mut [ProvisionedNode],
    persistent: bool,
    driver: &dyn MachineDriver,
) {
    for node in nodes.iter_mut() {
        if let Some(handle) = node.handle.take() {
            info!(node_id = %node.spec.id, "shutting down node");
            if let Err(e) = driver.shutdown(&handle).await {
                warn!(node_id = %node.spec.id, error = %e, "error shutting down node");
            }
            node.state = NodeState::Shutdown;
        }

        if !persistent {
            match tokio::fs::remove_dir_all(&node.spec.work_dir).await {
                Ok(()) => debug!(node_id = %node.spec.id, "node work dir removed"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(
                        node_id = %node.spec.id,
                        dir = %node.spec.work_dir.display(),
                        error = %e,
                        "error removing node work dir"
                    );
                }
            }
        }
    }
}
