//! Network allocator — pure mapping from subnet + host suffix to a node IP.
//!
//! Uniqueness across a cluster is the caller's obligation: the
//! control-plane node gets the fixed low suffix, workers get sequential
//! suffixes from a disjoint base (see `ember_core::config`).

use ember_core::{CONTROL_PLANE_HOST_SUFFIX, WORKER_HOST_SUFFIX_BASE};
use ipnet::Ipv4Net;
use tracing::warn;

/// Host suffix for the single control-plane node.
pub fn control_plane_suffix() -> u32 {
    u32::from(CONTROL_PLANE_HOST_SUFFIX)
}

/// Host suffix for worker `index`.
pub fn worker_suffix(index: u32) -> u32 {
    u32::from(WORKER_HOST_SUFFIX_BASE) + index
}

/// Map a subnet CIDR and a host suffix to a concrete node IP.
///
/// Deterministic for identical inputs. An unparsable CIDR degrades to a
/// fixed-prefix fallback address rather than failing — callers must not
/// treat the fallback as an error.
pub fn allocate_ip(subnet_cidr: &str, host_suffix: u32) -> String {
    match subnet_cidr.parse::<Ipv4Net>() {
        Ok(net) => {
            let octets = net.network().octets();
            format!("{}.{}.{}.{}", octets[0], octets[1], octets[2], host_suffix)
        }
        Err(e) => {
            warn!(subnet = subnet_cidr, error = %e, "unparsable subnet, using fallback prefix");
            format!("192.168.{host_suffix}.100")
        }
    }
}
