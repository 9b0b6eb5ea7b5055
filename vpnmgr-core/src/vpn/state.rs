//! VPN session state machine
//!
//! Defines the connection and error states of the single VPN session and
//! the transition table that is the only way to change them.

use crate::error::CommandError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// VPN connection states
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    /// No tunnel
    #[default]
    Disabled,

    /// Waiting for the adapter to bring the tunnel up
    Connecting,

    /// Tunnel is up
    Connected,

    /// Waiting for the adapter to tear the tunnel down
    Disconnecting,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disabled => "DISABLED",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Connected => "CONNECTED",
            ConnectionState::Disconnecting => "DISCONNECTING",
        }
    }

    /// True while an enable or disable is being carried out by the adapter
    pub fn is_transitional(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Disconnecting
        )
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session error codes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorState {
    #[default]
    NoError,
    AuthFailed,
    PeerAuthFailed,
    LookupFailed,
    Unreachable,
    GenericError,
    DisallowedNetworkType,
}

impl ErrorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorState::NoError => "NO_ERROR",
            ErrorState::AuthFailed => "AUTH_FAILED",
            ErrorState::PeerAuthFailed => "PEER_AUTH_FAILED",
            ErrorState::LookupFailed => "LOOKUP_FAILED",
            ErrorState::Unreachable => "UNREACHABLE",
            ErrorState::GenericError => "GENERIC_ERROR",
            ErrorState::DisallowedNetworkType => "DISALLOWED_NETWORK_TYPE",
        }
    }

    /// Failure code to record for an adapter-reported failure
    ///
    /// A failure that arrives without a specific code is a `GENERIC_ERROR`.
    pub fn as_failure(self) -> Self {
        match self {
            ErrorState::NoError => ErrorState::GenericError,
            other => other,
        }
    }
}

impl std::fmt::Display for ErrorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification emitted by the state machine for every accepted change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum SessionEvent {
    StateChanged(ConnectionState),
    ErrorChanged(ErrorState),
}

/// Inputs to the transition table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionEvent {
    /// A caller asked to bring the tunnel up
    EnableRequested,

    /// The adapter finished bringing the tunnel up
    Connected,

    /// The adapter failed to bring the tunnel up
    ConnectFailed(ErrorState),

    /// A caller asked to tear the tunnel down
    DisableRequested,

    /// The adapter finished tearing the tunnel down
    Disconnected,

    /// The adapter failed while tearing the tunnel down
    DisconnectFailed(ErrorState),

    /// The adapter lost an established tunnel on its own
    Dropped(ErrorState),
}

/// Result of an accepted transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ConnectionState,
    pub to: ConnectionState,

    /// New error state, present only when it changed
    pub error: Option<ErrorState>,
}

impl Transition {
    /// Notifications for this transition in delivery order
    pub fn events(&self) -> Vec<SessionEvent> {
        let mut events = vec![SessionEvent::StateChanged(self.to)];
        if let Some(error) = self.error {
            events.push(SessionEvent::ErrorChanged(error));
        }
        events
    }
}

/// Authoritative connection and error state of the session
#[derive(Debug, Clone)]
pub struct SessionStateMachine {
    state: ConnectionState,
    error: ErrorState,
    updated_at: DateTime<Utc>,
}

impl SessionStateMachine {
    /// Create a machine in `DISABLED` / `NO_ERROR`
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disabled,
            error: ErrorState::NoError,
            updated_at: Utc::now(),
        }
    }

    pub fn current_state(&self) -> ConnectionState {
        self.state
    }

    pub fn current_error(&self) -> ErrorState {
        self.error
    }

    /// Time of the last accepted change
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Target state and error for `event`, or `None` if not allowed
    fn resolve(&self, event: TransitionEvent) -> Option<(ConnectionState, ErrorState)> {
        use ConnectionState::*;

        match (self.state, event) {
            (Disabled, TransitionEvent::EnableRequested) => Some((Connecting, self.error)),
            (Connecting, TransitionEvent::Connected) => Some((Connected, ErrorState::NoError)),
            (Connecting, TransitionEvent::ConnectFailed(e)) => Some((Disabled, e.as_failure())),
            (Connected, TransitionEvent::DisableRequested) => Some((Disconnecting, self.error)),
            (Connected, TransitionEvent::Dropped(e)) => Some((Disabled, e.as_failure())),
            (Disconnecting, TransitionEvent::Disconnected) => {
                Some((Disabled, ErrorState::NoError))
            }
            (Disconnecting, TransitionEvent::DisconnectFailed(e)) => {
                Some((Disabled, e.as_failure()))
            }
            _ => None,
        }
    }

    /// Check whether `event` would be accepted without applying it
    pub fn validate(&self, event: TransitionEvent) -> Result<(), CommandError> {
        self.resolve(event)
            .map(|_| ())
            .ok_or(CommandError::InvalidStateTransition)
    }

    /// Apply `event`, leaving the machine untouched if it is not allowed
    pub fn apply_transition(&mut self, event: TransitionEvent) -> Result<Transition, CommandError> {
        let (to, error) = self.resolve(event).ok_or_else(|| {
            tracing::debug!(state = %self.state, ?event, "Rejected state transition");
            CommandError::InvalidStateTransition
        })?;

        let from = self.state;
        let error_changed = error != self.error;
        self.state = to;
        self.error = error;
        self.updated_at = Utc::now();

        tracing::debug!(%from, %to, error = %self.error, "Applied state transition");

        Ok(Transition {
            from,
            to,
            error: error_changed.then_some(error),
        })
    }

    /// Record an error that did not move the connection state
    ///
    /// Returns the new error when it differs from the current one.
    pub fn record_error(&mut self, error: ErrorState) -> Option<ErrorState> {
        let error = error.as_failure();
        if error == self.error {
            return None;
        }
        self.error = error;
        self.updated_at = Utc::now();
        Some(error)
    }
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_machine_is_disabled_without_error() {
        let machine = SessionStateMachine::new();
        assert_eq!(machine.current_state(), ConnectionState::Disabled);
        assert_eq!(machine.current_error(), ErrorState::NoError);
    }

    #[test]
    fn test_full_lifecycle() {
        let mut machine = SessionStateMachine::new();

        let t = machine
            .apply_transition(TransitionEvent::EnableRequested)
            .unwrap();
        assert_eq!(t.to, ConnectionState::Connecting);
        assert_eq!(t.error, None);

        machine.apply_transition(TransitionEvent::Connected).unwrap();
        assert_eq!(machine.current_state(), ConnectionState::Connected);

        machine
            .apply_transition(TransitionEvent::DisableRequested)
            .unwrap();
        assert_eq!(machine.current_state(), ConnectionState::Disconnecting);

        let t = machine
            .apply_transition(TransitionEvent::Disconnected)
            .unwrap();
        assert_eq!(t.from, ConnectionState::Disconnecting);
        assert_eq!(t.to, ConnectionState::Disabled);
        assert_eq!(machine.current_error(), ErrorState::NoError);
    }

    #[test]
    fn test_connect_failure_records_error() {
        let mut machine = SessionStateMachine::new();
        machine
            .apply_transition(TransitionEvent::EnableRequested)
            .unwrap();

        let t = machine
            .apply_transition(TransitionEvent::ConnectFailed(ErrorState::AuthFailed))
            .unwrap();

        assert_eq!(t.to, ConnectionState::Disabled);
        assert_eq!(t.error, Some(ErrorState::AuthFailed));
        assert_eq!(
            t.events(),
            vec![
                SessionEvent::StateChanged(ConnectionState::Disabled),
                SessionEvent::ErrorChanged(ErrorState::AuthFailed),
            ]
        );
    }

    #[test]
    fn test_error_is_kept_until_connected() {
        let mut machine = SessionStateMachine::new();
        machine
            .apply_transition(TransitionEvent::EnableRequested)
            .unwrap();
        machine
            .apply_transition(TransitionEvent::ConnectFailed(ErrorState::Unreachable))
            .unwrap();

        let t = machine
            .apply_transition(TransitionEvent::EnableRequested)
            .unwrap();
        assert_eq!(t.error, None);
        assert_eq!(machine.current_error(), ErrorState::Unreachable);

        let t = machine.apply_transition(TransitionEvent::Connected).unwrap();
        assert_eq!(t.error, Some(ErrorState::NoError));
    }

    #[test]
    fn test_drop_without_code_is_generic_error() {
        let mut machine = SessionStateMachine::new();
        machine
            .apply_transition(TransitionEvent::EnableRequested)
            .unwrap();
        machine.apply_transition(TransitionEvent::Connected).unwrap();

        machine
            .apply_transition(TransitionEvent::Dropped(ErrorState::NoError))
            .unwrap();
        assert_eq!(machine.current_state(), ConnectionState::Disabled);
        assert_eq!(machine.current_error(), ErrorState::GenericError);
    }

    #[test]
    fn test_invalid_transitions_leave_state_unchanged() {
        let mut machine = SessionStateMachine::new();

        for event in [
            TransitionEvent::Connected,
            TransitionEvent::DisableRequested,
            TransitionEvent::Disconnected,
            TransitionEvent::Dropped(ErrorState::GenericError),
        ] {
            assert_eq!(
                machine.apply_transition(event),
                Err(CommandError::InvalidStateTransition)
            );
            assert_eq!(machine.current_state(), ConnectionState::Disabled);
            assert_eq!(machine.current_error(), ErrorState::NoError);
        }

        machine
            .apply_transition(TransitionEvent::EnableRequested)
            .unwrap();
        assert_eq!(
            machine.validate(TransitionEvent::EnableRequested),
            Err(CommandError::InvalidStateTransition)
        );
        assert_eq!(
            machine.apply_transition(TransitionEvent::DisableRequested),
            Err(CommandError::InvalidStateTransition)
        );
        assert_eq!(machine.current_state(), ConnectionState::Connecting);
    }

    #[test]
    fn test_record_error_reports_changes_only() {
        let mut machine = SessionStateMachine::new();
        assert_eq!(
            machine.record_error(ErrorState::LookupFailed),
            Some(ErrorState::LookupFailed)
        );
        assert_eq!(machine.record_error(ErrorState::LookupFailed), None);
        assert_eq!(machine.current_state(), ConnectionState::Disabled);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", ConnectionState::Disabled), "DISABLED");
        assert_eq!(format!("{}", ConnectionState::Disconnecting), "DISCONNECTING");
        assert_eq!(format!("{}", ErrorState::PeerAuthFailed), "PEER_AUTH_FAILED");
        assert_eq!(
            format!("{}", ErrorState::DisallowedNetworkType),
            "DISALLOWED_NETWORK_TYPE"
        );
    }

    #[test]
    fn test_serde_names_match_display() {
        let json = serde_json::to_string(&ConnectionState::Connecting).unwrap();
        assert_eq!(json, "\"CONNECTING\"");
        let json = serde_json::to_string(&SessionEvent::ErrorChanged(ErrorState::AuthFailed)).unwrap();
        assert_eq!(json, r#"{"type":"errorChanged","value":"AUTH_FAILED"}"#);
    }
}
