//! embergrid-remote — the remote command execution collaborator.
//!
//! The orchestrator only needs two things from a node: "are you reachable"
//! and "run this command, give me its combined output". [`RemoteExec`] is
//! that contract; [`SshExec`] is the production SSH implementation. Tests
//! in the orchestration core use scripted fakes instead.

pub mod error;
pub mod exec;

pub use error::{RemoteError, RemoteResult};
pub use exec::{RemoteExec, SshExec};
