//! Integration tests for subscriber fan-out
//!
//! Callbacks run off the runtime's worker threads, so one slow or broken
//! listener must not hold back the others, even on a current-thread
//! runtime.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use vpnmgr_core::vpn::subscriber::SubscriberRegistry;
use vpnmgr_core::vpn::{ConnectionState, ErrorState, SessionEvent};

async fn next(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Option<SessionEvent> {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .ok()
        .flatten()
}

#[tokio::test]
async fn test_blocked_subscriber_does_not_delay_others() {
    // Given: One subscriber that blocks until released
    let registry = SubscriberRegistry::new();
    let (release, gate) = std_mpsc::channel::<()>();
    let gate = std::sync::Mutex::new(gate);
    let blocked_calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&blocked_calls);
    registry.register(
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            let _ = gate
                .lock()
                .unwrap()
                .recv_timeout(Duration::from_secs(5));
        },
        |_| {},
    );
    let (_, mut fast) = registry.listen();

    // When: An event is published
    let started = Instant::now();
    registry.notify_state_change(ConnectionState::Connecting);

    // Then: The other subscriber sees it while the first is still stuck
    assert_eq!(
        next(&mut fast).await,
        Some(SessionEvent::StateChanged(ConnectionState::Connecting))
    );
    assert!(started.elapsed() < Duration::from_secs(1));

    release.send(()).unwrap();
}

#[tokio::test]
async fn test_panicking_subscriber_does_not_affect_others() {
    let registry = SubscriberRegistry::new();
    registry.register(|_| panic!("state listener bug"), |_| panic!("error listener bug"));
    let (_, mut healthy) = registry.listen();

    registry.notify_state_change(ConnectionState::Disabled);
    registry.notify_error_change(ErrorState::LookupFailed);

    assert_eq!(
        next(&mut healthy).await,
        Some(SessionEvent::StateChanged(ConnectionState::Disabled))
    );
    assert_eq!(
        next(&mut healthy).await,
        Some(SessionEvent::ErrorChanged(ErrorState::LookupFailed))
    );
    assert_eq!(registry.len(), 2);
}

#[tokio::test]
async fn test_events_queued_before_unregister_are_delivered() {
    let registry = SubscriberRegistry::new();
    let (id, mut rx) = registry.listen();

    registry.notify_state_change(ConnectionState::Connecting);
    registry.unregister(id);
    registry.notify_state_change(ConnectionState::Connected);

    assert_eq!(
        next(&mut rx).await,
        Some(SessionEvent::StateChanged(ConnectionState::Connecting))
    );
    assert_eq!(next(&mut rx).await, None);
}

#[tokio::test]
async fn test_subscriber_registered_late_sees_only_new_events() {
    let registry = SubscriberRegistry::new();
    let (_, mut early) = registry.listen();
    registry.notify_state_change(ConnectionState::Connecting);

    let (_, mut late) = registry.listen();
    registry.notify_state_change(ConnectionState::Connected);

    assert_eq!(
        next(&mut early).await,
        Some(SessionEvent::StateChanged(ConnectionState::Connecting))
    );
    assert_eq!(
        next(&mut early).await,
        Some(SessionEvent::StateChanged(ConnectionState::Connected))
    );
    assert_eq!(
        next(&mut late).await,
        Some(SessionEvent::StateChanged(ConnectionState::Connected))
    );
}

#[tokio::test]
async fn test_clear_closes_every_subscriber() {
    let registry = SubscriberRegistry::new();
    let (_, mut first) = registry.listen();
    let (_, mut second) = registry.listen();

    registry.clear();

    assert!(registry.is_empty());
    assert_eq!(next(&mut first).await, None);
    assert_eq!(next(&mut second).await, None);
}

#[tokio::test]
async fn test_dropped_listener_is_unregistered_on_next_event() {
    let registry = SubscriberRegistry::new();
    let (_, dropped) = registry.listen();
    let (_, mut kept) = registry.listen();
    assert_eq!(registry.len(), 2);

    drop(dropped);
    registry.notify_state_change(ConnectionState::Connecting);

    assert_eq!(registry.len(), 1);
    assert_eq!(
        next(&mut kept).await,
        Some(SessionEvent::StateChanged(ConnectionState::Connecting))
    );
}
