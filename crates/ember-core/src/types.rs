//! Node role vocabulary shared across Embergrid crates.

use serde::{Deserialize, Serialize};

/// Role of a node within a cluster. Exactly one control-plane per cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeRole {
    ControlPlane,
    Worker,
}

impl NodeRole {
    /// Wire/file-system spelling of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::ControlPlane => "control-plane",
            NodeRole::Worker => "worker",
        }
    }

    pub fn is_control_plane(&self) -> bool {
        matches!(self, NodeRole::ControlPlane)
    }
}

impl std::fmt::Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
