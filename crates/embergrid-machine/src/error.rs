//! Machine driver error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from VM lifecycle and host networking operations.
#[derive(Debug, Error)]
pub enum MachineError {
    #[error("failed to write machine config {path}: {source}")]
    Config {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to spawn firecracker for {vm_id}: {source}")]
    Spawn {
        vm_id: String,
        source: std::io::Error,
    },

    #[error("failed to shut down {vm_id}: {source}")]
    Shutdown {
        vm_id: String,
        source: std::io::Error,
    },

    #[error("host command `{command}` failed: {output}")]
    HostCommand { command: String, output: String },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type MachineResult<T> = Result<T, MachineError>;
