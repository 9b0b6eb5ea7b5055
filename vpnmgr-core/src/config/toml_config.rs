//! TOML configuration file I/O
//!
//! Handles loading and saving vpnmgr configuration to/from TOML files
//! in the user's configuration directory.

use crate::config::VpnMgrConfig;
use crate::error::{ConfigError, VpnMgrError};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default configuration file name
const CONFIG_FILE_NAME: &str = "config.toml";

/// Environment variable overriding the configuration directory
pub const CONFIG_DIR_ENV_VAR: &str = "VPNMGR_CONFIG_DIR";

impl VpnMgrConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, VpnMgrError> {
        let contents = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => VpnMgrError::Config(ConfigError::LoadFailed {
                path: path.to_string_lossy().to_string(),
            }),
            _ => VpnMgrError::Config(ConfigError::IoError {
                message: format!("Failed to read config file: {}", e),
            }),
        })?;

        let config = Self::from_toml_str(&contents)?;
        info!(
            path = %path.display(),
            mobile_only = config.network.mobile_only,
            hooks = config.hooks.is_some(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn from_toml_str(contents: &str) -> Result<Self, VpnMgrError> {
        let config: VpnMgrConfig = toml::from_str(contents).map_err(|e| {
            VpnMgrError::Config(ConfigError::ValidationError {
                message: format!("Failed to parse config file: {}", e),
            })
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<(), VpnMgrError> {
        let contents = toml::to_string_pretty(self)?;

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                VpnMgrError::Config(ConfigError::IoError {
                    message: format!("Failed to create config directory: {}", e),
                })
            })?;
        }

        std::fs::write(path, contents).map_err(|e| {
            VpnMgrError::Config(ConfigError::IoError {
                message: format!("Failed to write config file: {}", e),
            })
        })?;

        debug!(path = %path.display(), "Saved configuration");
        Ok(())
    }
}

/// Get the default configuration directory
///
/// Returns ~/.config/vpnmgr, or the VPNMGR_CONFIG_DIR environment variable if set
pub fn get_config_dir() -> Result<PathBuf, VpnMgrError> {
    if let Ok(config_dir) = std::env::var(CONFIG_DIR_ENV_VAR) {
        return Ok(PathBuf::from(config_dir));
    }

    let home = std::env::var("HOME").map_err(|_| {
        VpnMgrError::Config(ConfigError::IoError {
            message: "HOME environment variable not set".to_string(),
        })
    })?;

    Ok(PathBuf::from(home).join(".config").join("vpnmgr"))
}

/// Get the default configuration file path
pub fn get_config_path() -> Result<PathBuf, VpnMgrError> {
    Ok(get_config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load configuration from the default location
pub fn load_config() -> Result<VpnMgrConfig, VpnMgrError> {
    VpnMgrConfig::from_file(&get_config_path()?)
}
