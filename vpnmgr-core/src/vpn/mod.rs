//! VPN session module
//!
//! Session state machine, command coordination, subscriber fan-out and the
//! platform adapter seam.

pub mod adapter;
pub mod coordinator;
pub mod network_policy;
pub mod profile;
pub mod state;
pub mod subscriber;

// Hook-based adapter for hosts driven by shell commands
pub mod hook_adapter;
pub mod output_parser;

// Public re-exports
pub use adapter::{AdapterEvent, Capability, CapabilityFlags, PlatformAdapter};
pub use coordinator::{CommandHandle, Coordinator, LifecycleCommand, StatusSnapshot};
pub use hook_adapter::{HookAdapter, HookConfig};
pub use network_policy::{NetworkInfo, NetworkPolicy, NetworkType};
pub use output_parser::OutputParser;
pub use profile::VpnProfile;
pub use state::{ConnectionState, ErrorState, SessionEvent};
pub use subscriber::SubscriptionId;
