//! Machine resource specification.

use std::net::Ipv4Addr;
use std::path::PathBuf;

/// Everything needed to create and start one microVM.
///
/// All file paths are rooted under the owning node's working directory;
/// the driver never writes outside it.
#[derive(Debug, Clone)]
pub struct MachineSpec {
    /// Unique VM identifier (the node ID).
    pub vm_id: String,
    /// vCPU count.
    pub vcpus: u32,
    /// Memory size in MB.
    pub memory_mb: u64,
    /// Kernel image path on the host.
    pub kernel_image: PathBuf,
    /// Root drive path on the host (the node's private rootfs copy).
    pub root_drive: PathBuf,
    /// Whether the drive is the root device.
    pub root_device: bool,
    /// Whether the drive is mounted read-only.
    pub read_only: bool,
    /// Host tap device the guest NIC attaches to.
    pub tap_device: String,
    /// Static guest IP.
    pub ip: String,
    /// Subnet prefix length for the guest IP.
    pub prefix_len: u8,
    /// Gateway IP for the guest.
    pub gateway: String,
    /// Firecracker log file path.
    pub log_path: PathBuf,
    /// Firecracker API socket path.
    pub socket_path: PathBuf,
}

impl MachineSpec {
    /// Kernel boot arguments carrying the static network configuration.
    ///
    /// Uses the kernel's `ip=` stanza so the guest comes up with its
    /// address without DHCP: `ip=<client>::<gw>:<netmask>::<iface>:off`.
    pub fn boot_args(&self) -> String {
        format!(
            "console=ttyS0 reboot=k panic=1 pci=off ip={}::{}:{}::eth0:off",
            self.ip,
            self.gateway,
            prefix_to_netmask(self.prefix_len)
        )
    }
}

/// Convert a prefix length to a dotted-quad netmask.
pub fn prefix_to_netmask(prefix_len: u8) -> Ipv4Addr {
    let bits = if prefix_len >= 32 {
        u32::MAX
    } else if prefix_len == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix_len))
    };
    Ipv4Addr::from(bits)
}
