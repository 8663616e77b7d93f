//! Remote execution error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("node {ip} is unreachable: {reason}")]
    Unreachable { ip: String, reason: String },

    #[error("command failed on {ip} with {status}: {output}")]
    CommandFailed {
        ip: String,
        status: String,
        output: String,
    },

    #[error("failed to run ssh: {0}")]
    Transport(#[from] std::io::Error),
}

pub type RemoteResult<T> = Result<T, RemoteError>;
