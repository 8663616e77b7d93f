//! Node topology planner.
//!
//! Produces the ordered node list for a cluster request: element 0 is
//! always the control-plane node, the rest are workers in index order.
//! Working directories are created eagerly; any failure fails the whole
//! planning step.

use ember_core::{ClusterConfig, ConfigError, NodeRole};
use tracing::debug;

use crate::allocator::{allocate_ip, control_plane_suffix, worker_suffix};
use crate::error::{ClusterError, ClusterResult};
use crate::node::NodeSpec;

/// Plan the node topology and create each node's working directory.
pub fn plan(config: &ClusterConfig) -> ClusterResult<Vec<NodeSpec>> {
    if config.node_count < 1 {
        return Err(ClusterError::Configuration(ConfigError::InvalidNodeCount(
            config.node_count,
        )));
    }

    let base = config.cluster_dir();
    let subnet = &config.network.subnet_cidr;
    let mut nodes = Vec::with_capacity(config.node_count as usize);

    nodes.push(NodeSpec {
        id: format!("{}-control-plane", config.name),
        role: NodeRole::ControlPlane,
        ip: allocate_ip(subnet, control_plane_suffix()),
        work_dir: base.join("control-plane"),
    });
    for i in 0..config.worker_count() {
        nodes.push(NodeSpec {
            id: format!("{}-worker-{i}", config.name),
            role: NodeRole::Worker,
            ip: allocate_ip(subnet, worker_suffix(i)),
            work_dir: base.join(format!("worker-{i}")),
        });
    }

    for node in &nodes {
        std::fs::create_dir_all(&node.work_dir).map_err(|source| ClusterError::Provisioning {
            node: node.id.clone(),
            step: "create work dir",
            source: source.into(),
        })?;
        debug!(node_id = %node.id, dir = %node.work_dir.display(), "node work dir ready");
    }

    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn test_config(base_dir: PathBuf, node_count: u32) -> ClusterConfig {
        ClusterConfig {
            name: "t1".to_string(),
            node_count,
            vcpus: 1,
            memory_mb: 1024,
            rootfs: PathBuf::from("/images/rootfs.ext4"),
            kernel: PathBuf::from("/images/vmlinux"),
            network: ember_core::NetworkConfig {
                subnet_cidr: "10.0.0.0/24".to_string(),
                gateway: "10.0.0.1".to_string(),
            },
            persistent: false,
            base_dir,
        }
    }

    #[test]
    fn three_node_layout() {
        let dir = tempfile::tempdir().unwrap();
        let nodes = plan(&test_config(dir.path().to_path_buf(), 3)).unwrap();

        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0].id, "t1-control-plane");
        assert_eq!(nodes[0].role, NodeRole::ControlPlane);
        assert_eq!(nodes[0].ip, "10.0.0.10");
        assert_eq!(nodes[1].id, "t1-worker-0");
        assert_eq!(nodes[1].ip, "10.0.0.20");
        assert_eq!(nodes[2].id, "t1-worker-1");
        assert_eq!(nodes[2].ip, "10.0.0.21");
    }

    #[test]
    fn exactly_one_control_plane() {
        let dir = tempfile::tempdir().unwrap();
        let nodes = plan(&test_config(dir.path().to_path_buf(), 5)).unwrap();
        let control_planes = nodes
            .iter()
            .filter(|n| n.role.is_control_plane())
            .count();
        assert_eq!(control_planes, 1);
        assert!(nodes[0].role.is_control_plane());
    }

    #[test]
    fn ids_and_ips_are_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let nodes = plan(&test_config(dir.path().to_path_buf(), 6)).unwrap();

        let mut ids: Vec<_> = nodes.iter().map(|n| n.id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), nodes.len());

        let mut ips: Vec<_> = nodes.iter().map(|n| n.ip.clone()).collect();
        ips.sort();
        ips.dedup();
        assert_eq!(ips.len(), nodes.len());
    }

    #[test]
    fn single_node_cluster_has_no_workers() {
        let dir = tempfile::tempdir().unwrap();
        let nodes = plan(&test_config(dir.path().to_path_buf(), 1)).unwrap();
        assert_eq!(nodes.len(), 1);
        assert!(nodes[0].role.is_control_plane());
    }

    #[test]
    fn zero_nodes_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = plan(&test_config(dir.path().to_path_buf(), 0)).unwrap_err();
        assert!(matches!(err, ClusterError::Configuration(_)));
    }

    #[test]
    fn work_dirs_created_eagerly() {
        let dir = tempfile::tempdir().unwrap();
        let nodes = plan(&test_config(dir.path().to_path_buf(), 3)).unwrap();
        for node in &nodes {
            assert!(node.work_dir.is_dir());
        }
    }

    #[test]
    fn unwritable_base_fails_planning() {
        // A regular file where the base dir should be makes mkdir fail.
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("base");
        std::fs::write(&blocker, b"x").unwrap();
        let err = plan(&test_config(blocker, 2)).unwrap_err();
        assert!(matches!(
            err,
            ClusterError::Provisioning {
                step: "create work dir",
                ..
            }
        ));
    }
}
