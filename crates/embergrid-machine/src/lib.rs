//! embergrid-machine — the virtualization collaborator.
//!
//! Defines the narrow contracts the orchestrator provisions through:
//!
//! - [`MachineDriver`] — create-and-start / shutdown of one microVM
//! - [`HostNetwork`] — "ensure this tap device exists and is up"
//!
//! and the production implementations that drive the `firecracker` binary
//! and `ip(8)`. The orchestration core only ever sees the traits, so tests
//! swap in in-memory fakes.

pub mod driver;
pub mod error;
pub mod firecracker;
pub mod network;
pub mod spec;

pub use driver::{MachineDriver, MachineHandle};
pub use error::{MachineError, MachineResult};
pub use firecracker::FirecrackerDriver;
pub use network::{tap_device_name, HostNetwork, IpTap};
pub use spec::MachineSpec;
