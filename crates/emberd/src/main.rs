//! emberd — the Embergrid cluster launcher.
//!
//! Single binary that provisions a Kubernetes cluster of Firecracker
//! microVMs, prints how to reach it, and tears it down again on
//! Ctrl-C / SIGTERM (unless `--persistent` was given).
//!
//! # Usage
//!
//! ```text
//! emberd up --name demo --nodes 3 --rootfs ./setup/rootfs.ext4
//! emberd up --config ./ember.toml
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::bail;
use clap::{Parser, Subcommand};
use tracing::info;

use ember_core::{ClusterConfig, NetworkConfig};
use embergrid_cluster::{Cluster, ClusterError};
use embergrid_machine::{FirecrackerDriver, IpTap};
use embergrid_remote::SshExec;

#[derive(Parser)]
#[command(name = "emberd", about = "Embergrid microVM cluster launcher")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Provision a cluster and keep it running until interrupted.
    Up {
        /// Cluster configuration file (TOML). Individual flags are
        /// ignored when this is set.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Cluster name; prefixes node IDs and the on-disk layout.
        #[arg(long)]
        name: Option<String>,

        /// Total node count including the control-plane node.
        #[arg(long, default_value = "3")]
        nodes: u32,

        /// vCPUs per node.
        #[arg(long, default_value = "1")]
        vcpus: u32,

        /// Memory per node in MB.
        #[arg(long, default_value = "1024")]
        memory: u64,

        /// Root filesystem image; each node boots a private copy.
        #[arg(long)]
        rootfs: Option<PathBuf>,

        /// Kernel image booted by every node.
        #[arg(long, default_value = "./setup/vmlinux-5.10.225")]
        kernel: PathBuf,

        /// Node subnet in CIDR notation.
        #[arg(long, default_value = "172.16.0.0/24")]
        subnet: String,

        /// Gateway address for node network config.
        #[arg(long, default_value = "172.16.0.1")]
        gateway: String,

        /// Base directory for per-cluster state.
        #[arg(long, default_value = "/var/lib/embergrid")]
        data_dir: PathBuf,

        /// Keep VM state on disk after teardown.
        #[arg(long)]
        persistent: bool,

        /// Path to the firecracker binary.
        #[arg(long, default_value = "firecracker")]
        firecracker_bin: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,emberd=debug,embergrid=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Up {
            config,
            name,
            nodes,
            vcpus,
            memory,
            rootfs,
            kernel,
            subnet,
            gateway,
            data_dir,
            persistent,
            firecracker_bin,
        } => {
            let config = match config {
                Some(path) => ClusterConfig::from_file(&path)?,
                None => {
                    let Some(name) = name else {
                        bail!("--name is required (or pass --config)");
                    };
                    let Some(rootfs) = rootfs else {
                        bail!("--rootfs is required (or pass --config)");
                    };
                    ClusterConfig {
                        name,
                        node_count: nodes,
                        vcpus,
                        memory_mb: memory,
                        rootfs,
                        kernel,
                        network: NetworkConfig {
                            subnet_cidr: subnet,
                            gateway,
                        },
                        persistent,
                        base_dir: data_dir,
                    }
                }
            };
            run_up(config, firecracker_bin).await
        }
    }
}

async fn run_up(config: ClusterConfig, firecracker_bin: PathBuf) -> anyhow::Result<()> {
    let driver = Arc::new(FirecrackerDriver::new(firecracker_bin));
    let host_net = Arc::new(IpTap);
    let exec = Arc::new(SshExec::new());

    let mut cluster = Cluster::new(config, driver, host_net, exec)?;

    // Ctrl-C / SIGTERM cancels the cluster's scope; in-flight
    // provisioning stops and the wait below wakes up.
    let cancel = cluster.cancellation_token();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        cancel.cancel();
    });

    match cluster.provision().await {
        Ok(()) => {
            print_cluster_info(&cluster);
            cluster.cancellation_token().cancelled().await;
            cluster.cleanup().await;
            info!(cluster = %cluster.name(), "cluster stopped");
            Ok(())
        }
        Err(ClusterError::Cancelled) => {
            info!("provisioning cancelled, nothing left running");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Resolves on Ctrl-C or SIGTERM, whichever arrives first.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn print_cluster_info(cluster: &Cluster) {
    println!();
    println!("Cluster '{}' is up ({} nodes)", cluster.name(), cluster.nodes().len());
    println!();
    for node in cluster.nodes() {
        println!(
            "  {:<28} {:<14} {:<15} {}",
            node.spec.id,
            node.spec.role,
            node.spec.ip,
            node.spec.socket_path().display(),
        );
    }
    println!();
    if let Some(node) = cluster.nodes().first() {
        println!("  kubectl:  ssh root@{} kubectl get nodes", node.spec.ip);
    }
    if let Some(join) = cluster.join_command() {
        println!("  join:     {}", join.as_str());
    }
    println!();
    println!("Press Ctrl-C to shut the cluster down.");
}
