//! Configuration module
//!
//! Handles loading and saving vpnmgr configuration from TOML files.

use crate::error::ConfigError;
use crate::types::CommandOptions;
use crate::vpn::hook_adapter::HookConfig;
use crate::vpn::network_policy::NetworkPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod toml_config;

/// Complete configuration structure
///
/// Contains the network policy, the adapter hooks and an optional default
/// profile used when a command is issued without options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpnMgrConfig {
    /// Which networks may carry the tunnel
    #[serde(default)]
    pub network: NetworkPolicy,

    /// Shell hooks backing the platform adapter
    #[serde(default)]
    pub hooks: Option<HookConfig>,

    /// Default provisioning options (`vpnHost`, `vpnUsername`, ...)
    #[serde(default)]
    pub profile: Option<BTreeMap<String, String>>,
}

impl VpnMgrConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(hooks) = &self.hooks {
            hooks.validate().map_err(|e| ConfigError::ValidationError {
                message: format!("Invalid hooks: {}", e),
            })?;
        }

        if !self.network.mobile_only && self.network.allow_wifi {
            tracing::debug!("allow_wifi has no effect unless mobile_only is set");
        }

        Ok(())
    }

    /// Hooks, required by hosts that drive the hook adapter
    pub fn require_hooks(&self) -> Result<&HookConfig, ConfigError> {
        self.hooks.as_ref().ok_or_else(|| ConfigError::MissingField {
            field: "hooks".to_string(),
        })
    }

    /// Default profile as command options, empty if none is configured
    pub fn profile_options(&self) -> CommandOptions {
        self.profile
            .clone()
            .map(CommandOptions::from)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid_and_unrestricted() {
        let config = VpnMgrConfig::default();
        assert_eq!(config.validate().ok(), Some(()));
        assert!(!config.network.is_enforced());
        assert!(config.profile_options().is_empty());
        assert!(matches!(
            config.require_hooks(),
            Err(ConfigError::MissingField { .. })
        ));
    }

    #[test]
    fn test_invalid_hooks_fail_validation() {
        let mut hooks = HookConfig::new("true", "true");
        hooks.timeout_secs = 0;
        let config = VpnMgrConfig {
            hooks: Some(hooks),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError { .. })
        ));
    }
}
