//! Shared helpers for session integration tests
//!
//! `ScriptedAdapter` answers each adapter call with the next outcome a
//! test pushes through its `Script`, so tests decide when and how every
//! adapter call finishes.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use vpnmgr_core::error::AdapterError;
use vpnmgr_core::types::CommandOptions;
use vpnmgr_core::vpn::{
    AdapterEvent, Capability, CapabilityFlags, ConnectionState, Coordinator, ErrorState,
    NetworkInfo, NetworkPolicy, PlatformAdapter, SessionEvent,
};

type Outcome = Result<(), ErrorState>;

/// Sending half of a scripted adapter
pub struct Script {
    pub connect: mpsc::UnboundedSender<Outcome>,
    pub disconnect: mpsc::UnboundedSender<Outcome>,
    pub install: mpsc::UnboundedSender<Outcome>,
    pub events: mpsc::UnboundedSender<AdapterEvent>,
}

#[derive(Default)]
pub struct CallCounts {
    pub query: AtomicUsize,
    pub connect: AtomicUsize,
    pub disconnect: AtomicUsize,
    pub install: AtomicUsize,
    pub network: AtomicUsize,
}

/// Adapter whose answers come from a `Script`
pub struct ScriptedAdapter {
    connect: tokio::sync::Mutex<mpsc::UnboundedReceiver<Outcome>>,
    disconnect: tokio::sync::Mutex<mpsc::UnboundedReceiver<Outcome>>,
    install: tokio::sync::Mutex<mpsc::UnboundedReceiver<Outcome>>,
    events: Mutex<Option<mpsc::UnboundedReceiver<AdapterEvent>>>,
    capabilities: Mutex<Option<CapabilityFlags>>,
    network: Mutex<NetworkInfo>,
    panic_on_connect: AtomicBool,
    pub calls: CallCounts,
}

impl ScriptedAdapter {
    pub fn new() -> (Arc<Self>, Script) {
        let (connect_tx, connect_rx) = mpsc::unbounded_channel();
        let (disconnect_tx, disconnect_rx) = mpsc::unbounded_channel();
        let (install_tx, install_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let adapter = Arc::new(Self {
            connect: tokio::sync::Mutex::new(connect_rx),
            disconnect: tokio::sync::Mutex::new(disconnect_rx),
            install: tokio::sync::Mutex::new(install_rx),
            events: Mutex::new(Some(events_rx)),
            capabilities: Mutex::new(Some(CapabilityFlags::new().with(Capability::ProfileBased))),
            network: Mutex::new(NetworkInfo::unknown()),
            panic_on_connect: AtomicBool::new(false),
            calls: CallCounts::default(),
        });
        let script = Script {
            connect: connect_tx,
            disconnect: disconnect_tx,
            install: install_tx,
            events: events_tx,
        };
        (adapter, script)
    }

    /// Make capability queries fail
    pub fn set_unavailable(&self) {
        *self.capabilities.lock().unwrap() = None;
    }

    pub fn set_capabilities(&self, flags: CapabilityFlags) {
        *self.capabilities.lock().unwrap() = Some(flags);
    }

    pub fn set_network(&self, info: NetworkInfo) {
        *self.network.lock().unwrap() = info;
    }

    /// Make the next connect call panic instead of answering
    pub fn panic_on_connect(&self) {
        self.panic_on_connect.store(true, Ordering::SeqCst);
    }

    async fn next(queue: &tokio::sync::Mutex<mpsc::UnboundedReceiver<Outcome>>) -> Outcome {
        // A closed script means every remaining call succeeds
        queue.lock().await.recv().await.unwrap_or(Ok(()))
    }
}

#[async_trait]
impl PlatformAdapter for ScriptedAdapter {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn query_capability(
        &self,
        _options: &CommandOptions,
    ) -> Result<CapabilityFlags, AdapterError> {
        self.calls.query.fetch_add(1, Ordering::SeqCst);
        self.capabilities
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| AdapterError::Unavailable {
                reason: "scripted".to_string(),
            })
    }

    async fn connect(&self, _options: &CommandOptions) -> Result<(), ErrorState> {
        self.calls.connect.fetch_add(1, Ordering::SeqCst);
        if self.panic_on_connect.swap(false, Ordering::SeqCst) {
            panic!("scripted connect panic");
        }
        Self::next(&self.connect).await
    }

    async fn disconnect(&self, _options: &CommandOptions) -> Result<(), ErrorState> {
        self.calls.disconnect.fetch_add(1, Ordering::SeqCst);
        Self::next(&self.disconnect).await
    }

    async fn install_profile(&self, _options: &CommandOptions) -> Result<(), ErrorState> {
        self.calls.install.fetch_add(1, Ordering::SeqCst);
        Self::next(&self.install).await
    }

    async fn active_network(&self) -> NetworkInfo {
        self.calls.network.fetch_add(1, Ordering::SeqCst);
        *self.network.lock().unwrap()
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<AdapterEvent>> {
        self.events.lock().unwrap().take()
    }
}

/// Coordinator over a fresh scripted adapter
pub fn session(policy: NetworkPolicy) -> (Coordinator, Arc<ScriptedAdapter>, Script) {
    let (adapter, script) = ScriptedAdapter::new();
    let coordinator = Coordinator::new(adapter.clone(), policy);
    (coordinator, adapter, script)
}

pub fn calls(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}

/// Complete provisioning options
pub fn profile_options() -> CommandOptions {
    CommandOptions::new()
        .with("vpnHost", "vpn.example.com")
        .with("vpnUsername", "alice")
        .with("vpnPassword", "hunter2")
}

/// Receive exactly `count` events, failing after a second of silence
pub async fn collect(
    events: &mut mpsc::UnboundedReceiver<SessionEvent>,
    count: usize,
) -> Vec<SessionEvent> {
    let mut received = Vec::with_capacity(count);
    while received.len() < count {
        match tokio::time::timeout(Duration::from_secs(1), events.recv()).await {
            Ok(Some(event)) => received.push(event),
            Ok(None) => panic!("event channel closed after {:?}", received),
            Err(_) => panic!("timed out waiting for events, got {:?}", received),
        }
    }
    received
}

/// Assert nothing else arrives within a short grace period
pub async fn assert_quiet(events: &mut mpsc::UnboundedReceiver<SessionEvent>) {
    match tokio::time::timeout(Duration::from_millis(100), events.recv()).await {
        Ok(Some(event)) => panic!("unexpected event {:?}", event),
        Ok(None) | Err(_) => {}
    }
}

/// Wait until the session reaches `state`
pub async fn wait_for_state(coordinator: &Coordinator, state: ConnectionState) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while coordinator.current_state() != state {
        if tokio::time::Instant::now() > deadline {
            panic!(
                "session stuck in {} waiting for {}",
                coordinator.current_state(),
                state
            );
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Bring a session to CONNECTED through the script
pub async fn connect(coordinator: &Coordinator, script: &Script) {
    script.connect.send(Ok(())).unwrap();
    coordinator
        .enable(profile_options())
        .await
        .expect("enable accepted")
        .await
        .expect("connect succeeded");
    assert_eq!(coordinator.current_state(), ConnectionState::Connected);
}
