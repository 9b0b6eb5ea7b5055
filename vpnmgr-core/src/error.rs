//! Error types for the vpnmgr session core
//!
//! This module defines all error types used throughout the library,
//! providing consistent error handling and user-friendly error messages.

use crate::vpn::state::ErrorState;
use thiserror::Error;

/// Main error type for vpnmgr
#[derive(Error, Debug)]
pub enum VpnMgrError {
    /// Errors related to configuration loading/parsing
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Errors raised by lifecycle commands against the session
    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    /// Errors raised while reading provisioning options
    #[error("Profile error: {0}")]
    Profile(#[from] ProfileError),

    /// Errors raised by a platform adapter outside of a command
    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing errors
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// JSON errors from the action bridge
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration file: {path}")]
    LoadFailed { path: String },

    #[error("Missing required configuration field: {field}")]
    MissingField { field: String },

    #[error("Configuration validation error: {message}")]
    ValidationError { message: String },

    #[error("I/O error: {message}")]
    IoError { message: String },
}

/// Errors a lifecycle command or query reports to its caller
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    /// The command is not valid from the current connection state
    #[error("Invalid connection state transition")]
    InvalidStateTransition,

    /// Another lifecycle command is still executing
    #[error("A lifecycle command is already in flight")]
    CommandInFlight,

    /// The platform VPN facility is missing or cannot be queried
    #[error("Platform VPN adapter unavailable")]
    AdapterUnavailable,

    /// The adapter reported a failure code
    #[error("Adapter reported {0}")]
    Adapter(ErrorState),
}

impl CommandError {
    /// The session error code this failure maps to, if any
    pub fn error_state(&self) -> Option<ErrorState> {
        match self {
            CommandError::Adapter(state) => Some(*state),
            _ => None,
        }
    }
}

impl From<ErrorState> for CommandError {
    fn from(state: ErrorState) -> Self {
        CommandError::Adapter(state)
    }
}

/// Provisioning option errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProfileError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Field {field} must be a string")]
    InvalidType { field: String },

    #[error("Certificate bundle is not valid base64")]
    InvalidCertificate,

    #[error("Certificate supplied without certificatePassword")]
    MissingCertificatePassword,
}

/// Adapter errors outside the session error codes
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("Platform VPN facility unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Hook `{hook}` is not configured")]
    HookNotConfigured { hook: String },

    #[error("Failed to spawn hook `{hook}`: {reason}")]
    SpawnFailed { hook: String, reason: String },

    #[error("Hook `{hook}` timed out after {seconds} seconds")]
    Timeout { hook: String, seconds: u64 },
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, VpnMgrError>;
