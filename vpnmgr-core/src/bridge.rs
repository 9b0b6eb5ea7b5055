//! JSON action bridge
//!
//! Maps the action names a hybrid-app shell sends (`isVpnCapable`, `isUp`,
//! `enable`, `disable`, `provision`, `status`) onto the coordinator and
//! renders replies, errors and session events as JSON. How those messages
//! travel between processes is up to the host.

use crate::error::{CommandError, ProfileError};
use crate::types::CommandOptions;
use crate::vpn::coordinator::{CommandHandle, Coordinator};
use crate::vpn::profile::VpnProfile;
use crate::vpn::state::{ConnectionState, ErrorState, SessionEvent};
use serde_json::{json, Value};
use std::str::FromStr;

/// Actions accepted by [`dispatch`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeAction {
    IsVpnCapable,
    IsUp,
    Enable,
    Disable,
    Provision,
    Status,
}

impl FromStr for BridgeAction {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "isVpnCapable" => Ok(BridgeAction::IsVpnCapable),
            "isUp" => Ok(BridgeAction::IsUp),
            "enable" => Ok(BridgeAction::Enable),
            "disable" => Ok(BridgeAction::Disable),
            "provision" => Ok(BridgeAction::Provision),
            "status" => Ok(BridgeAction::Status),
            other => Err(BridgeError::InvalidAction(other.to_string())),
        }
    }
}

/// Errors reported back to the shell
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    #[error("invalid action: {0}")]
    InvalidAction(String),

    #[error("missing fields: {0}")]
    MissingFields(#[from] ProfileError),

    #[error("{0}")]
    Command(#[from] CommandError),
}

impl BridgeError {
    /// Error code string sent to the shell
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::InvalidAction(_) => "INVALID_ACTION",
            BridgeError::MissingFields(_) => "MISSING_FIELDS",
            BridgeError::Command(CommandError::InvalidStateTransition) => "INVALID_STATE",
            BridgeError::Command(CommandError::CommandInFlight) => "COMMAND_IN_FLIGHT",
            BridgeError::Command(CommandError::AdapterUnavailable) => "NOT_SUPPORTED",
            BridgeError::Command(CommandError::Adapter(error)) => error_to_string(*error),
        }
    }

    /// Error payload sent to the shell
    pub fn to_json(&self) -> Value {
        json!({ "code": self.code(), "message": self.to_string() })
    }
}

/// Reply to a dispatched action
#[derive(Debug)]
pub struct BridgeReply {
    /// Value returned to the shell right away
    pub value: Value,

    /// Completion of the lifecycle command, for actions that start one
    pub completion: Option<CommandHandle>,
}

impl BridgeReply {
    fn immediate(value: Value) -> Self {
        Self {
            value,
            completion: None,
        }
    }
}

/// Shell-facing name of a connection state
///
/// The shell has always called the idle state `DISCONNECTED`.
pub fn state_to_string(state: ConnectionState) -> &'static str {
    match state {
        ConnectionState::Disabled => "DISCONNECTED",
        other => other.as_str(),
    }
}

/// Shell-facing name of an error state
///
/// The shell distinguishes fewer failure kinds than the session does.
pub fn error_to_string(error: ErrorState) -> &'static str {
    match error {
        ErrorState::PeerAuthFailed => ErrorState::AuthFailed.as_str(),
        ErrorState::LookupFailed => ErrorState::Unreachable.as_str(),
        ErrorState::GenericError => "UNKNOWN_ERROR",
        other => other.as_str(),
    }
}

/// Render a session event for the shell
pub fn event_to_json(event: &SessionEvent) -> Value {
    match event {
        SessionEvent::StateChanged(state) => {
            json!({ "type": "state", "value": state_to_string(*state) })
        }
        SessionEvent::ErrorChanged(error) => {
            json!({ "type": "error", "value": error_to_string(*error) })
        }
    }
}

/// Run one shell action against the coordinator
///
/// `enable` and `provision` require a complete profile in `args`
/// (`vpnHost`, `vpnUsername`, `vpnPassword`).
pub async fn dispatch(
    coordinator: &Coordinator,
    action: &str,
    args: Value,
) -> Result<BridgeReply, BridgeError> {
    let action: BridgeAction = action.parse()?;
    let options = CommandOptions::from_value(args)?;
    tracing::debug!(?action, ?options, "Bridge dispatch");

    match action {
        BridgeAction::IsVpnCapable => {
            let flags = coordinator.is_vpn_capable(&options).await?;
            Ok(BridgeReply::immediate(Value::Bool(!flags.is_empty())))
        }
        BridgeAction::IsUp => Ok(BridgeReply::immediate(Value::Bool(
            coordinator.is_up(&options),
        ))),
        BridgeAction::Status => {
            let status = coordinator.status(&options);
            Ok(BridgeReply::immediate(json!({
                "up": status.connection_state == ConnectionState::Connected,
                "state": state_to_string(status.connection_state),
                "error": error_to_string(status.error_state),
                "updatedAt": status.updated_at.to_rfc3339(),
            })))
        }
        BridgeAction::Enable => {
            VpnProfile::from_options(&options)?;
            let handle = coordinator.enable(options).await?;
            Ok(BridgeReply {
                value: Value::String(state_to_string(ConnectionState::Connecting).to_string()),
                completion: Some(handle),
            })
        }
        BridgeAction::Disable => {
            let handle = coordinator.disable(options).await?;
            Ok(BridgeReply {
                value: Value::String(
                    state_to_string(ConnectionState::Disconnecting).to_string(),
                ),
                completion: Some(handle),
            })
        }
        BridgeAction::Provision => {
            VpnProfile::from_options(&options)?;
            let handle = coordinator.provision(options).await?;
            Ok(BridgeReply {
                value: Value::Bool(true),
                completion: Some(handle),
            })
        }
    }
}
