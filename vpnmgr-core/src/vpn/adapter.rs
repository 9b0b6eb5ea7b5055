//! Platform VPN adapter seam
//!
//! The adapter is the host's VPN facility. The session core never talks to
//! the network itself; it drives an implementation of [`PlatformAdapter`]
//! and listens to the unsolicited events it pushes.

use crate::error::AdapterError;
use crate::types::CommandOptions;
use crate::vpn::network_policy::NetworkInfo;
use crate::vpn::state::ErrorState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;
use tokio::sync::mpsc;

/// A feature the platform VPN facility supports
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    /// Tunnels are described by installable profiles
    ProfileBased,

    /// The platform can bring the tunnel up on demand
    OnDemand,

    /// The platform keeps the tunnel up permanently
    AlwaysOn,

    /// Tunnels can be scoped to individual applications
    PerApp,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ProfileBased => "profile-based",
            Capability::OnDemand => "on-demand",
            Capability::AlwaysOn => "always-on",
            Capability::PerApp => "per-app",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "profile-based" => Ok(Capability::ProfileBased),
            "on-demand" => Ok(Capability::OnDemand),
            "always-on" => Ok(Capability::AlwaysOn),
            "per-app" => Ok(Capability::PerApp),
            other => Err(format!("unknown capability: {}", other)),
        }
    }
}

/// Set of supported features
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilityFlags(BTreeSet<Capability>);

impl CapabilityFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, capability: Capability) -> Self {
        self.0.insert(capability);
        self
    }

    pub fn insert(&mut self, capability: Capability) -> bool {
        self.0.insert(capability)
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    /// No VPN feature at all, which means the host is not VPN capable
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Capability> for CapabilityFlags {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Events the adapter pushes without being asked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterEvent {
    /// An established tunnel went away
    Dropped(ErrorState),

    /// The host moved to a different network
    NetworkChanged(NetworkInfo),
}

/// Contract the session core requires from the host's VPN facility
///
/// `connect`, `disconnect` and `install_profile` resolve once the platform
/// has finished; the core runs them on their own tasks and never holds its
/// session lock across them.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Report what the platform supports
    async fn query_capability(
        &self,
        options: &CommandOptions,
    ) -> Result<CapabilityFlags, AdapterError>;

    /// Bring the tunnel up
    async fn connect(&self, options: &CommandOptions) -> Result<(), ErrorState>;

    /// Tear the tunnel down
    async fn disconnect(&self, options: &CommandOptions) -> Result<(), ErrorState>;

    /// Install or update the VPN profile
    async fn install_profile(&self, options: &CommandOptions) -> Result<(), ErrorState>;

    /// Describe the network currently carrying traffic
    async fn active_network(&self) -> NetworkInfo {
        NetworkInfo::unknown()
    }

    /// Hand over the unsolicited event channel
    ///
    /// Called once when the session starts; adapters without unsolicited
    /// events return `None`.
    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<AdapterEvent>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_parsing() {
        assert_eq!("profile-based".parse::<Capability>(), Ok(Capability::ProfileBased));
        assert_eq!("ON_DEMAND".parse::<Capability>(), Ok(Capability::OnDemand));
        assert!("teleport".parse::<Capability>().is_err());
    }

    #[test]
    fn test_capability_flags() {
        let flags: CapabilityFlags = [Capability::PerApp, Capability::ProfileBased]
            .into_iter()
            .collect();
        assert!(flags.contains(Capability::ProfileBased));
        assert!(!flags.contains(Capability::AlwaysOn));
        assert_eq!(
            flags.iter().collect::<Vec<_>>(),
            vec![Capability::ProfileBased, Capability::PerApp]
        );
        assert_eq!(
            serde_json::to_string(&flags).unwrap(),
            r#"["profile-based","per-app"]"#
        );
        assert!(CapabilityFlags::new().is_empty());
    }
}
