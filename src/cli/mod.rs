//! CLI command implementations
//!
//! This module contains the implementation of all CLI subcommands.

use std::path::Path;
use std::sync::Arc;
use vpnmgr_core::config::{toml_config, VpnMgrConfig};
use vpnmgr_core::error::VpnMgrError;
use vpnmgr_core::types::CommandOptions;
use vpnmgr_core::vpn::{Coordinator, HookAdapter};

pub mod shell;
pub mod vpn;

/// Load configuration from `path`, or the default location
pub fn load(path: Option<&Path>) -> Result<VpnMgrConfig, VpnMgrError> {
    match path {
        Some(path) => VpnMgrConfig::from_file(path),
        None => toml_config::load_config(),
    }
}

/// Start a session backed by the configured hooks
pub fn start_session(config: &VpnMgrConfig) -> Result<Coordinator, VpnMgrError> {
    let hooks = config.require_hooks()?.clone();
    let adapter = Arc::new(HookAdapter::new(hooks));
    Ok(Coordinator::new(adapter, config.network.clone()))
}

/// Options given on the command line, falling back to the configured profile
pub fn command_options(
    config: &VpnMgrConfig,
    json: Option<&str>,
) -> Result<CommandOptions, VpnMgrError> {
    match json {
        Some(json) => {
            let value: serde_json::Value = serde_json::from_str(json)?;
            Ok(CommandOptions::from_value(value)?)
        }
        None => Ok(config.profile_options()),
    }
}
