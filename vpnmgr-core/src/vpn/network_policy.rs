//! Network-type policy for mobile-only deployments
//!
//! Some deployments may only carry the tunnel over a cellular link. This
//! module decides whether the active network is acceptable.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Kind of link currently carrying traffic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    Mobile,
    Wifi,
    Ethernet,
    Wimax,
    Other,
}

impl FromStr for NetworkType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mobile" | "cellular" | "wwan" => Ok(NetworkType::Mobile),
            "wifi" | "wi-fi" | "wlan" => Ok(NetworkType::Wifi),
            "ethernet" | "eth" => Ok(NetworkType::Ethernet),
            "wimax" => Ok(NetworkType::Wimax),
            "other" => Ok(NetworkType::Other),
            other => Err(format!("unknown network type: {}", other)),
        }
    }
}

/// Snapshot of the host's connectivity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NetworkInfo {
    /// Active link, `None` when there is no connectivity or it is unknown
    pub kind: Option<NetworkType>,

    pub airplane_mode: bool,
}

impl NetworkInfo {
    /// Connectivity could not be determined
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn on(kind: NetworkType) -> Self {
        Self {
            kind: Some(kind),
            airplane_mode: false,
        }
    }

    pub fn airplane() -> Self {
        Self {
            kind: None,
            airplane_mode: true,
        }
    }
}

/// Which networks may carry the tunnel
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NetworkPolicy {
    /// Only allow the tunnel over mobile data
    #[serde(default)]
    pub mobile_only: bool,

    /// Exempt Wi-Fi from the mobile-only restriction
    #[serde(default)]
    pub allow_wifi: bool,
}

/// Link types refused when `mobile_only` is set
const DISALLOWED_NETWORK_TYPES: [NetworkType; 3] =
    [NetworkType::Ethernet, NetworkType::Wifi, NetworkType::Wimax];

impl NetworkPolicy {
    /// Policy that accepts every network
    pub fn unrestricted() -> Self {
        Self::default()
    }

    pub fn mobile_only() -> Self {
        Self {
            mobile_only: true,
            allow_wifi: false,
        }
    }

    /// Whether the policy ever rejects a network
    pub fn is_enforced(&self) -> bool {
        self.mobile_only
    }

    /// Whether `info` may carry the tunnel
    ///
    /// Under `mobile_only`, missing connectivity and airplane mode are
    /// rejected along with the disallowed link types.
    pub fn connection_valid(&self, info: &NetworkInfo) -> bool {
        if !self.mobile_only {
            return true;
        }
        if info.airplane_mode {
            return false;
        }
        match info.kind {
            None => false,
            Some(NetworkType::Wifi) if self.allow_wifi => true,
            Some(kind) => !DISALLOWED_NETWORK_TYPES.contains(&kind),
        }
    }
}
