//! Command coordinator for the VPN session
//!
//! Owns the single session, serializes lifecycle commands against the
//! platform adapter and publishes every accepted transition to the
//! subscriber registry.
//!
//! The session mutex is only held while a transition is validated and
//! applied. Adapter work runs on spawned tasks that re-enter the
//! coordinator to finish the transition and clear the active command.

use crate::error::CommandError;
use crate::types::CommandOptions;
use crate::vpn::adapter::{AdapterEvent, CapabilityFlags, PlatformAdapter};
use crate::vpn::network_policy::{NetworkInfo, NetworkPolicy};
use crate::vpn::state::{
    ConnectionState, ErrorState, SessionEvent, SessionStateMachine, Transition, TransitionEvent,
};
use crate::vpn::subscriber::{SubscriberRegistry, SubscriptionId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Lifecycle commands that mutate or configure the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleCommand {
    Enable,
    Disable,
    Provision,
}

impl std::fmt::Display for LifecycleCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleCommand::Enable => write!(f, "enable"),
            LifecycleCommand::Disable => write!(f, "disable"),
            LifecycleCommand::Provision => write!(f, "provision"),
        }
    }
}

/// Point-in-time copy of the session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub connection_state: ConnectionState,
    pub error_state: ErrorState,
    pub active_command: Option<LifecycleCommand>,
    pub capabilities: CapabilityFlags,
    pub updated_at: DateTime<Utc>,
}

/// Completion of a dispatched lifecycle command
///
/// Resolves once the adapter has answered and the session has been
/// updated. Dropping the handle does not cancel the command.
#[derive(Debug)]
pub struct CommandHandle {
    command: LifecycleCommand,
    completion: oneshot::Receiver<Result<(), CommandError>>,
}

impl CommandHandle {
    pub fn command(&self) -> LifecycleCommand {
        self.command
    }
}

impl Future for CommandHandle {
    type Output = Result<(), CommandError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // The sender only disappears if the completion task died with the runtime
        Pin::new(&mut self.completion)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(CommandError::AdapterUnavailable)))
    }
}

#[derive(Debug)]
struct Session {
    machine: SessionStateMachine,
    capabilities: CapabilityFlags,
    active_command: Option<LifecycleCommand>,
}

struct Inner {
    session: Mutex<Session>,
    registry: SubscriberRegistry,
    adapter: Arc<dyn PlatformAdapter>,
    policy: NetworkPolicy,
    event_pump: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to the VPN session
///
/// Cheap to clone; every clone drives the same session.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl Coordinator {
    /// Start a session in `DISABLED` / `NO_ERROR`
    ///
    /// Must be called from within a Tokio runtime: the adapter's
    /// unsolicited event channel is drained by a spawned task.
    pub fn new(adapter: Arc<dyn PlatformAdapter>, policy: NetworkPolicy) -> Self {
        let events = adapter.take_events();
        let inner = Arc::new(Inner {
            session: Mutex::new(Session {
                machine: SessionStateMachine::new(),
                capabilities: CapabilityFlags::new(),
                active_command: None,
            }),
            registry: SubscriberRegistry::new(),
            adapter,
            policy,
            event_pump: Mutex::new(None),
        });

        if let Some(events) = events {
            let pump = tokio::spawn(Self::pump_events(Arc::downgrade(&inner), events));
            *lock_or_recover(&inner.event_pump) = Some(pump);
        }

        info!(adapter = inner.adapter.name(), "VPN session started");
        Self { inner }
    }

    async fn pump_events(inner: Weak<Inner>, mut events: mpsc::UnboundedReceiver<AdapterEvent>) {
        while let Some(event) = events.recv().await {
            let Some(inner) = inner.upgrade() else {
                break;
            };
            Coordinator { inner }.handle_adapter_event(event);
        }
        debug!("Adapter event channel closed");
    }

    /// Tear the session down
    ///
    /// Stops listening to the adapter and drops every subscriber.
    /// Commands already dispatched still finish against the session.
    pub fn shutdown(&self) {
        if let Some(pump) = lock_or_recover(&self.inner.event_pump).take() {
            pump.abort();
        }
        self.inner.registry.clear();
        info!("VPN session shut down");
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        lock_or_recover(&self.inner.session)
    }

    /// Publish a transition; callers hold the session lock
    fn publish(&self, transition: &Transition) {
        for event in transition.events() {
            self.inner.registry.notify(event);
        }
    }

    // ---- queries ----

    /// Ask the adapter what the platform supports
    #[tracing::instrument(skip(self, options))]
    pub async fn is_vpn_capable(
        &self,
        options: &CommandOptions,
    ) -> Result<CapabilityFlags, CommandError> {
        match self.inner.adapter.query_capability(options).await {
            Ok(flags) => {
                debug!(?flags, "Capability query succeeded");
                self.session().capabilities = flags.clone();
                Ok(flags)
            }
            Err(e) => {
                warn!("Capability query failed: {}", e);
                Err(CommandError::AdapterUnavailable)
            }
        }
    }

    /// True iff the session is `CONNECTED`; never contacts the adapter
    pub fn is_up(&self, _options: &CommandOptions) -> bool {
        self.session().machine.current_state() == ConnectionState::Connected
    }

    /// Current state and error of the session
    pub fn status(&self, _options: &CommandOptions) -> StatusSnapshot {
        let session = self.session();
        StatusSnapshot {
            connection_state: session.machine.current_state(),
            error_state: session.machine.current_error(),
            active_command: session.active_command,
            capabilities: session.capabilities.clone(),
            updated_at: session.machine.updated_at(),
        }
    }

    pub fn current_state(&self) -> ConnectionState {
        self.session().machine.current_state()
    }

    pub fn current_error(&self) -> ErrorState {
        self.session().machine.current_error()
    }

    // ---- subscribers ----

    /// Register a callback pair for state and error changes
    pub fn register<S, E>(&self, on_state_change: S, on_error_change: E) -> SubscriptionId
    where
        S: Fn(ConnectionState) + Send + Sync + 'static,
        E: Fn(ErrorState) + Send + Sync + 'static,
    {
        self.inner.registry.register(on_state_change, on_error_change)
    }

    /// Register a subscriber that receives events on a channel
    pub fn listen(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<SessionEvent>) {
        self.inner.registry.listen()
    }

    /// Remove a subscriber; unknown ids are ignored
    pub fn unregister(&self, id: SubscriptionId) {
        self.inner.registry.unregister(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.registry.len()
    }

    // ---- lifecycle commands ----

    /// Bring the tunnel up
    ///
    /// Fails immediately unless the session is `DISABLED` with no command in
    /// flight and, under a mobile-only policy, the active network is
    /// allowed. Otherwise moves to `CONNECTING` and returns a handle for
    /// the adapter's answer.
    #[tracing::instrument(skip(self, options))]
    pub async fn enable(&self, options: CommandOptions) -> Result<CommandHandle, CommandError> {
        self.precheck(LifecycleCommand::Enable)?;

        if self.inner.policy.is_enforced() {
            let network = self.inner.adapter.active_network().await;
            if !self.inner.policy.connection_valid(&network) {
                warn!(?network, "Refusing to enable VPN on a disallowed network");
                return Err(CommandError::Adapter(ErrorState::DisallowedNetworkType));
            }
        }

        self.begin(LifecycleCommand::Enable, options)
    }

    /// Tear the tunnel down; only valid from `CONNECTED`
    #[tracing::instrument(skip(self, options))]
    pub async fn disable(&self, options: CommandOptions) -> Result<CommandHandle, CommandError> {
        self.begin(LifecycleCommand::Disable, options)
    }

    /// Install or update the VPN profile
    ///
    /// Refused while a transition is in progress. Does not change the
    /// connection state; a failure is recorded as the session error.
    #[tracing::instrument(skip(self, options))]
    pub async fn provision(&self, options: CommandOptions) -> Result<CommandHandle, CommandError> {
        self.begin(LifecycleCommand::Provision, options)
    }

    /// Transition a command requests up front, if any
    fn request_event(command: LifecycleCommand) -> Option<TransitionEvent> {
        match command {
            LifecycleCommand::Enable => Some(TransitionEvent::EnableRequested),
            LifecycleCommand::Disable => Some(TransitionEvent::DisableRequested),
            LifecycleCommand::Provision => None,
        }
    }

    /// Validate `command` against the session
    ///
    /// The requested transition is checked first, then the in-flight slot.
    /// Provisioning has no transition but may not race one.
    fn validate(session: &Session, command: LifecycleCommand) -> Result<(), CommandError> {
        match Self::request_event(command) {
            Some(event) => session.machine.validate(event)?,
            None if session.machine.current_state().is_transitional() => {
                return Err(CommandError::CommandInFlight)
            }
            None => {}
        }
        if let Some(active) = session.active_command {
            debug!(%command, %active, "Command rejected, another is in flight");
            return Err(CommandError::CommandInFlight);
        }
        Ok(())
    }

    fn precheck(&self, command: LifecycleCommand) -> Result<(), CommandError> {
        Self::validate(&self.session(), command)
    }

    /// Claim the in-flight slot, apply the requested transition and
    /// dispatch the adapter call
    fn begin(
        &self,
        command: LifecycleCommand,
        options: CommandOptions,
    ) -> Result<CommandHandle, CommandError> {
        {
            let mut session = self.session();
            Self::validate(&session, command)?;

            if let Some(event) = Self::request_event(command) {
                let transition = session.machine.apply_transition(event)?;
                self.publish(&transition);
            }
            session.active_command = Some(command);
        }

        info!(%command, adapter = self.inner.adapter.name(), "Dispatching command to adapter");

        let (tx, completion) = oneshot::channel();
        let this = self.clone();
        tokio::spawn(async move {
            let adapter = Arc::clone(&this.inner.adapter);
            let call = tokio::spawn(async move {
                match command {
                    LifecycleCommand::Enable => adapter.connect(&options).await,
                    LifecycleCommand::Disable => adapter.disconnect(&options).await,
                    LifecycleCommand::Provision => adapter.install_profile(&options).await,
                }
            });
            let outcome = match call.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(%command, "Adapter call aborted: {}", e);
                    Err(ErrorState::GenericError)
                }
            };
            let result = this.complete(command, outcome);
            if tx.send(result).is_err() {
                debug!(%command, "Command handle dropped before completion");
            }
        });

        Ok(CommandHandle {
            command,
            completion,
        })
    }

    /// Apply the adapter's answer and free the in-flight slot
    fn complete(
        &self,
        command: LifecycleCommand,
        outcome: Result<(), ErrorState>,
    ) -> Result<(), CommandError> {
        let outcome = outcome.map_err(ErrorState::as_failure);
        let mut session = self.session();
        session.active_command = None;

        let event = match (command, outcome) {
            (LifecycleCommand::Enable, Ok(())) => Some(TransitionEvent::Connected),
            (LifecycleCommand::Enable, Err(e)) => Some(TransitionEvent::ConnectFailed(e)),
            (LifecycleCommand::Disable, Ok(())) => Some(TransitionEvent::Disconnected),
            (LifecycleCommand::Disable, Err(e)) => Some(TransitionEvent::DisconnectFailed(e)),
            (LifecycleCommand::Provision, _) => None,
        };

        match event {
            Some(event) => match session.machine.apply_transition(event) {
                Ok(transition) => self.publish(&transition),
                Err(_) => warn!(
                    %command,
                    state = %session.machine.current_state(),
                    "Adapter answer no longer applies, session moved on"
                ),
            },
            None => {
                if let Err(e) = outcome {
                    if let Some(error) = session.machine.record_error(e) {
                        self.inner.registry.notify_error_change(error);
                    }
                }
            }
        }

        match outcome {
            Ok(()) => {
                info!(%command, state = %session.machine.current_state(), "Command completed");
                Ok(())
            }
            Err(e) => {
                error!(%command, error = %e, "Command failed");
                Err(CommandError::Adapter(e))
            }
        }
    }

    // ---- unsolicited adapter events ----

    /// React to an event pushed by the adapter
    pub fn handle_adapter_event(&self, event: AdapterEvent) {
        match event {
            AdapterEvent::Dropped(error) => {
                let mut session = self.session();
                match session
                    .machine
                    .apply_transition(TransitionEvent::Dropped(error))
                {
                    Ok(transition) => {
                        warn!(error = %error.as_failure(), "VPN connection dropped");
                        self.publish(&transition);
                    }
                    Err(_) => debug!(
                        state = %session.machine.current_state(),
                        "Ignoring drop report outside CONNECTED"
                    ),
                }
            }
            AdapterEvent::NetworkChanged(info) => {
                self.network_changed(info);
            }
        }
    }

    /// Enforce the network policy after a connectivity change
    ///
    /// Returns true if the session was dropped because of it. The adapter
    /// teardown holds the in-flight slot until it finishes, so no new
    /// command reaches the adapter while it is still disconnecting.
    pub fn network_changed(&self, info: NetworkInfo) -> bool {
        if self.inner.policy.connection_valid(&info) {
            return false;
        }

        {
            let mut session = self.session();
            if session.active_command.is_some()
                || session.machine.current_state() != ConnectionState::Connected
            {
                return false;
            }
            let transition = match session.machine.apply_transition(TransitionEvent::Dropped(
                ErrorState::DisallowedNetworkType,
            )) {
                Ok(transition) => transition,
                Err(_) => return false,
            };
            self.publish(&transition);
            session.active_command = Some(LifecycleCommand::Disable);
        }

        warn!(?info, "Moved to a disallowed network, stopping the VPN");
        let this = self.clone();
        tokio::spawn(async move {
            let adapter = Arc::clone(&this.inner.adapter);
            let teardown =
                tokio::spawn(async move { adapter.disconnect(&CommandOptions::new()).await });
            match teardown.await {
                Ok(Ok(())) => debug!("Adapter teardown after network change finished"),
                Ok(Err(e)) => warn!(error = %e, "Adapter teardown after network change failed"),
                Err(e) => error!("Adapter teardown after network change aborted: {}", e),
            }
            this.session().active_command = None;
        });
        true
    }

    /// Name of the adapter driving this session
    pub fn adapter_name(&self) -> &str {
        self.inner.adapter.name()
    }
}

fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Session updates are applied whole under the lock, so a poisoned guard is still consistent
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
