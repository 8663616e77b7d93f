//! Cluster request configuration and validation.
//!
//! A `ClusterConfig` is the immutable request that the orchestrator turns
//! into a running cluster. It can be built from CLI flags or parsed from an
//! `ember.toml` file; either way `validate()` must pass before any resource
//! is created.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Host suffix assigned to the control-plane node (last IP octet).
pub const CONTROL_PLANE_HOST_SUFFIX: u8 = 10;

/// First host suffix assigned to workers; worker `i` gets `20 + i`.
pub const WORKER_HOST_SUFFIX_BASE: u8 = 20;

/// Errors produced before any resource is touched.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cluster name must not be empty")]
    EmptyName,

    #[error("node count must be at least 1, got {0}")]
    InvalidNodeCount(u32),

    #[error("vcpu count must be greater than 0")]
    InvalidVcpus,

    #[error("memory size must be greater than 0 MB")]
    InvalidMemory,

    #[error("root filesystem image {path} is not readable: {source}")]
    RootfsUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("gateway {gateway} is not a valid IPv4 address")]
    InvalidGateway { gateway: String },

    #[error("gateway {gateway} lies outside subnet {subnet}")]
    GatewayOutsideSubnet { gateway: String, subnet: String },

    #[error(
        "subnet {subnet} cannot hold {workers} workers (host suffixes {base}..={last} out of range)"
    )]
    SubnetCapacity {
        subnet: String,
        workers: u32,
        base: u8,
        last: u32,
    },

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Subnet descriptor for a cluster's node network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Subnet CIDR, e.g. `172.16.0.0/24`.
    pub subnet_cidr: String,
    /// Gateway IP, must lie within the subnet.
    pub gateway: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            subnet_cidr: "172.16.0.0/24".to_string(),
            gateway: "172.16.0.1".to_string(),
        }
    }
}

/// The cluster request: immutable once accepted by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Cluster name; prefixes every node ID and the on-disk layout.
    pub name: String,
    /// Total node count including the control-plane node.
    #[serde(default = "default_node_count")]
    pub node_count: u32,
    /// vCPUs per node.
    #[serde(default = "default_vcpus")]
    pub vcpus: u32,
    /// Memory per node in MB.
    #[serde(default = "default_memory_mb")]
    pub memory_mb: u64,
    /// Root filesystem image; each node boots a private copy.
    pub rootfs: PathBuf,
    /// Kernel image booted by every node.
    #[serde(default = "default_kernel")]
    pub kernel: PathBuf,
    /// Node network layout.
    #[serde(default)]
    pub network: NetworkConfig,
    /// Keep per-node state on disk after teardown.
    #[serde(default)]
    pub persistent: bool,
    /// Base directory; the cluster lives under `<base_dir>/<name>`.
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
}

fn default_node_count() -> u32 {
    3
}

fn default_vcpus() -> u32 {
    1
}

fn default_memory_mb() -> u64 {
    1024
}

fn default_kernel() -> PathBuf {
    PathBuf::from("./setup/vmlinux-5.10.225")
}

fn default_base_dir() -> PathBuf {
    PathBuf::from("/var/lib/embergrid")
}

impl ClusterConfig {
    /// Parse a cluster request from an `ember.toml` file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Directory holding all of this cluster's node state.
    pub fn cluster_dir(&self) -> PathBuf {
        self.base_dir.join(&self.name)
    }

    /// Number of worker nodes in the request.
    pub fn worker_count(&self) -> u32 {
        self.node_count.saturating_sub(1)
    }

    /// Validate the request. Fails before any resource is created.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if self.node_count < 1 {
            return Err(ConfigError::InvalidNodeCount(self.node_count));
        }
        if self.vcpus == 0 {
            return Err(ConfigError::InvalidVcpus);
        }
        if self.memory_mb == 0 {
            return Err(ConfigError::InvalidMemory);
        }
        std::fs::File::open(&self.rootfs).map_err(|source| ConfigError::RootfsUnreadable {
            path: self.rootfs.clone(),
            source,
        })?;
        self.network.validate(self.worker_count())
    }
}

impl NetworkConfig {
    /// Validate gateway placement and host capacity for the requested
    /// worker count.
    ///
    /// An unparsable CIDR is accepted here: the allocator degrades to a
    /// fixed-prefix fallback for it rather than failing the request.
    pub fn validate(&self, workers: u32) -> Result<(), ConfigError> {
        let Ok(net) = self.subnet_cidr.parse::<Ipv4Net>() else {
            return Ok(());
        };

        let gateway: Ipv4Addr =
            self.gateway
                .parse()
                .map_err(|_| ConfigError::InvalidGateway {
                    gateway: self.gateway.clone(),
                })?;
        if !net.contains(&gateway) {
            return Err(ConfigError::GatewayOutsideSubnet {
                gateway: self.gateway.clone(),
                subnet: self.subnet_cidr.clone(),
            });
        }

        // Worker suffixes are 20 + i in the last octet; the whole range must
        // stay inside the subnet. The control-plane suffix (10) is checked
        // the same way for small subnets.
        let last_worker_suffix = if workers == 0 {
            u32::from(WORKER_HOST_SUFFIX_BASE)
        } else {
            u32::from(WORKER_HOST_SUFFIX_BASE) + workers - 1
        };
        if last_worker_suffix > 254 {
            return Err(ConfigError::SubnetCapacity {
                subnet: self.subnet_cidr.clone(),
                workers,
                base: WORKER_HOST_SUFFIX_BASE,
                last: last_worker_suffix,
            });
        }

        let octets = net.network().octets();
        let mut suffixes = vec![u32::from(CONTROL_PLANE_HOST_SUFFIX)];
        if workers > 0 {
            suffixes.push(last_worker_suffix);
        }
        for suffix in suffixes {
            let candidate = Ipv4Addr::new(octets[0], octets[1], octets[2], suffix as u8);
            if !net.contains(&candidate) {
                return Err(ConfigError::SubnetCapacity {
                    subnet: self.subnet_cidr.clone(),
                    workers,
                    base: WORKER_HOST_SUFFIX_BASE,
                    last: last_worker_suffix,
                });
            }
        }

        Ok(())
    }
}
