//! Subscriber registry for session notifications
//!
//! Each subscriber gets its own unbounded channel. Callback subscribers
//! also get a dispatch task that runs every callback on the blocking pool,
//! so a slow or panicking callback only delays itself. Events are queued
//! in emission order while the session lock is held and drained in that
//! order.

use crate::vpn::state::{ConnectionState, ErrorState, SessionEvent};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Identity of a registered subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

struct Subscriber {
    queue: mpsc::UnboundedSender<SessionEvent>,
}

/// Owns every subscriber and fans notifications out to them
pub struct SubscriberRegistry {
    next_id: AtomicU64,
    subscribers: Mutex<BTreeMap<SubscriptionId, Subscriber>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            subscribers: Mutex::new(BTreeMap::new()),
        }
    }

    /// Register a callback pair
    ///
    /// Spawns the subscriber's dispatch task, so this must be called from
    /// within a Tokio runtime. Callbacks run one at a time on the blocking
    /// pool; the next event waits for the previous callback to return.
    pub fn register<S, E>(&self, on_state_change: S, on_error_change: E) -> SubscriptionId
    where
        S: Fn(ConnectionState) + Send + Sync + 'static,
        E: Fn(ErrorState) + Send + Sync + 'static,
    {
        let id = self.next_id();
        let (queue, mut rx) = mpsc::unbounded_channel::<SessionEvent>();
        let on_state_change = Arc::new(on_state_change);
        let on_error_change = Arc::new(on_error_change);

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let on_state_change = Arc::clone(&on_state_change);
                let on_error_change = Arc::clone(&on_error_change);
                let delivered = tokio::task::spawn_blocking(move || match event {
                    SessionEvent::StateChanged(state) => on_state_change(state),
                    SessionEvent::ErrorChanged(error) => on_error_change(error),
                })
                .await;
                if let Err(e) = delivered {
                    warn!(subscription = %id, ?event, "Subscriber callback failed, continuing: {}", e);
                }
            }
            debug!(subscription = %id, "Subscriber dispatch task finished");
        });

        self.insert(id, queue);
        id
    }

    /// Register a subscriber that receives events on a channel
    ///
    /// Dropping the receiver unregisters the subscriber on the next
    /// notification.
    pub fn listen(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<SessionEvent>) {
        let id = self.next_id();
        let (queue, rx) = mpsc::unbounded_channel();
        self.insert(id, queue);
        (id, rx)
    }

    fn next_id(&self) -> SubscriptionId {
        SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn insert(&self, id: SubscriptionId, queue: mpsc::UnboundedSender<SessionEvent>) {
        self.lock().insert(id, Subscriber { queue });
        debug!(subscription = %id, "Registered subscriber");
    }

    /// Remove a subscriber
    ///
    /// Unknown or already removed ids are ignored. Events queued before
    /// this call are still delivered.
    pub fn unregister(&self, id: SubscriptionId) {
        if self.lock().remove(&id).is_some() {
            debug!(subscription = %id, "Unregistered subscriber");
        }
    }

    pub fn notify_state_change(&self, state: ConnectionState) {
        self.notify(SessionEvent::StateChanged(state));
    }

    pub fn notify_error_change(&self, error: ErrorState) {
        self.notify(SessionEvent::ErrorChanged(error));
    }

    /// Queue one event for every current subscriber
    ///
    /// Subscribers whose receiving side is gone are dropped.
    pub fn notify(&self, event: SessionEvent) {
        self.lock().retain(|id, subscriber| {
            if subscriber.queue.send(event).is_ok() {
                return true;
            }
            debug!(subscription = %id, ?event, "Subscriber is gone, unregistering");
            false
        });
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop every subscriber
    pub fn clear(&self) {
        let mut subscribers = self.lock();
        debug!(count = subscribers.len(), "Dropping all subscribers");
        subscribers.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<SubscriptionId, Subscriber>> {
        // A poisoned map is still consistent: entries are only inserted or removed whole.
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}
