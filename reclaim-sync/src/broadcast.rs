//! Cross-tab refresh signalling.
//!
//! Tabs of the same identity share a key/value store that notifies every
//! other tab when a key is written or removed. A refresh is announced by
//! writing the current epoch millis under [`REFRESH_MARKER_KEY`] and removing
//! it straight away; listeners react to the write and ignore the removal.
//!
//! [`BroadcastChannel`] abstracts over the transport so an orchestrator can
//! also run on a plain in-process bus ([`LocalBroadcast`]).

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use reclaim_core::{epoch_millis, BroadcastError, ReclaimResult};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Key of the marker written to announce a refresh.
pub const REFRESH_MARKER_KEY: &str = "e_waste_refresh_trigger";

const EVENT_CAPACITY: usize = 64;

/// Identifies one tab (orchestrator instance) on a shared channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TabId(Uuid);

impl TabId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TabId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Change notification delivered to every subscriber of a [`SharedStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
    pub old_value: Option<String>,
    /// `None` when the key was removed.
    pub new_value: Option<String>,
    pub origin: TabId,
}

/// Key/value store shared by all tabs of an identity.
///
/// Writes that change a value, and removals of present keys, are announced
/// to subscribers. Writing the value a key already holds is silent.
#[derive(Debug)]
pub struct SharedStore {
    entries: Mutex<HashMap<String, String>>,
    events: broadcast::Sender<StorageEvent>,
}

impl SharedStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            entries: Mutex::new(HashMap::new()),
            events,
        }
    }

    pub fn get(&self, key: &str) -> ReclaimResult<Option<String>> {
        let entries = self.entries.lock().map_err(|_| BroadcastError::LockPoisoned)?;
        Ok(entries.get(key).cloned())
    }

    pub fn set_item(
        &self,
        origin: TabId,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> ReclaimResult<()> {
        let key = key.into();
        let value = value.into();
        let old_value = {
            let mut entries = self.entries.lock().map_err(|_| BroadcastError::LockPoisoned)?;
            entries.insert(key.clone(), value.clone())
        };
        if old_value.as_deref() == Some(value.as_str()) {
            return Ok(());
        }
        self.notify(StorageEvent {
            key,
            old_value,
            new_value: Some(value),
            origin,
        });
        Ok(())
    }

    pub fn remove_item(&self, origin: TabId, key: &str) -> ReclaimResult<()> {
        let old_value = {
            let mut entries = self.entries.lock().map_err(|_| BroadcastError::LockPoisoned)?;
            entries.remove(key)
        };
        if old_value.is_some() {
            self.notify(StorageEvent {
                key: key.to_string(),
                old_value,
                new_value: None,
                origin,
            });
        }
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.events.subscribe()
    }

    /// Number of live event receivers across all tabs.
    pub fn listener_count(&self) -> usize {
        self.events.receiver_count()
    }

    fn notify(&self, event: StorageEvent) {
        // No receivers is not an error: nobody else is listening.
        let _ = self.events.send(event);
    }
}

impl Default for SharedStore {
    fn default() -> Self {
        Self::new()
    }
}

/// A refresh announcement observed (or emitted) on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSignal {
    /// Emitting tab. `None` when notifications were lost and the signal
    /// stands in for them.
    pub origin: Option<TabId>,
    pub emitted_at_ms: i64,
}

/// Transport for cross-tab refresh signals.
pub trait BroadcastChannel: Send + Sync {
    fn tab_id(&self) -> TabId;

    /// Announce a refresh to every other tab.
    fn publish(&self) -> ReclaimResult<RefreshSignal>;

    /// Start receiving signals from other tabs.
    fn subscribe(&self) -> Subscription;

    /// Live subscriptions created through this channel.
    fn listener_count(&self) -> usize;
}

/// Counts live subscriptions of one channel.
#[derive(Debug)]
struct ListenerGuard(Arc<AtomicUsize>);

impl ListenerGuard {
    fn attach(count: &Arc<AtomicUsize>) -> Self {
        count.fetch_add(1, Ordering::SeqCst);
        Self(count.clone())
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug)]
enum Source {
    Storage {
        key: String,
        events: broadcast::Receiver<StorageEvent>,
    },
    Local(broadcast::Receiver<RefreshSignal>),
}

/// Stream of refresh signals from other tabs.
///
/// Signals emitted by the subscribing tab itself are filtered out. Dropping
/// the subscription detaches the listener.
#[derive(Debug)]
pub struct Subscription {
    tab_id: TabId,
    source: Source,
    _guard: ListenerGuard,
}

impl Subscription {
    /// Wait for the next signal from another tab.
    ///
    /// Returns [`BroadcastError::Closed`] once the channel can produce no
    /// more signals.
    pub async fn recv(&mut self) -> Result<RefreshSignal, BroadcastError> {
        loop {
            let received = match &mut self.source {
                Source::Storage { key, events } => match events.recv().await {
                    Ok(event) => {
                        if event.origin == self.tab_id || event.key != *key {
                            continue;
                        }
                        let Some(value) = event.new_value else {
                            continue;
                        };
                        Ok(RefreshSignal {
                            origin: Some(event.origin),
                            emitted_at_ms: value.parse().unwrap_or_else(|_| epoch_millis()),
                        })
                    }
                    Err(err) => Err(err),
                },
                Source::Local(signals) => match signals.recv().await {
                    Ok(signal) if signal.origin == Some(self.tab_id) => continue,
                    Ok(signal) => Ok(signal),
                    Err(err) => Err(err),
                },
            };

            return match received {
                Ok(signal) => Ok(signal),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(tab = %self.tab_id, missed, "refresh signals dropped, coalescing");
                    Ok(RefreshSignal {
                        origin: None,
                        emitted_at_ms: epoch_millis(),
                    })
                }
                Err(broadcast::error::RecvError::Closed) => Err(BroadcastError::Closed),
            };
        }
    }

    /// Discard signals already queued from other tabs without waiting.
    ///
    /// Returns how many were dropped; a lag counts as one.
    pub fn drain(&mut self) -> usize {
        use broadcast::error::TryRecvError;

        let mut dropped = 0;
        loop {
            let relevant = match &mut self.source {
                Source::Storage { key, events } => match events.try_recv() {
                    Ok(event) => {
                        event.origin != self.tab_id
                            && event.key == *key
                            && event.new_value.is_some()
                    }
                    Err(TryRecvError::Lagged(_)) => true,
                    Err(TryRecvError::Empty | TryRecvError::Closed) => return dropped,
                },
                Source::Local(signals) => match signals.try_recv() {
                    Ok(signal) => signal.origin != Some(self.tab_id),
                    Err(TryRecvError::Lagged(_)) => true,
                    Err(TryRecvError::Empty | TryRecvError::Closed) => return dropped,
                },
            };
            dropped += usize::from(relevant);
        }
    }
}

/// Channel backed by a marker key in a [`SharedStore`].
#[derive(Debug, Clone)]
pub struct StorageBroadcast {
    store: Arc<SharedStore>,
    key: String,
    tab_id: TabId,
    listeners: Arc<AtomicUsize>,
}

impl StorageBroadcast {
    pub fn new(store: Arc<SharedStore>) -> Self {
        Self::with_key(store, REFRESH_MARKER_KEY)
    }

    pub fn with_key(store: Arc<SharedStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            tab_id: TabId::new(),
            listeners: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn store(&self) -> &Arc<SharedStore> {
        &self.store
    }
}

impl BroadcastChannel for StorageBroadcast {
    fn tab_id(&self) -> TabId {
        self.tab_id
    }

    fn publish(&self) -> ReclaimResult<RefreshSignal> {
        let emitted_at_ms = epoch_millis();
        self.store
            .set_item(self.tab_id, self.key.as_str(), emitted_at_ms.to_string())?;
        self.store.remove_item(self.tab_id, &self.key)?;
        tracing::debug!(tab = %self.tab_id, key = %self.key, "refresh marker published");
        Ok(RefreshSignal {
            origin: Some(self.tab_id),
            emitted_at_ms,
        })
    }

    fn subscribe(&self) -> Subscription {
        Subscription {
            tab_id: self.tab_id,
            source: Source::Storage {
                key: self.key.clone(),
                events: self.store.subscribe(),
            },
            _guard: ListenerGuard::attach(&self.listeners),
        }
    }

    fn listener_count(&self) -> usize {
        self.listeners.load(Ordering::SeqCst)
    }
}

/// In-process bus connecting [`LocalBroadcast`] tabs.
#[derive(Debug, Clone)]
pub struct LocalBus {
    signals: broadcast::Sender<RefreshSignal>,
}

impl LocalBus {
    pub fn new() -> Self {
        let (signals, _) = broadcast::channel(EVENT_CAPACITY);
        Self { signals }
    }

    /// A new tab attached to this bus.
    pub fn tab(&self) -> LocalBroadcast {
        LocalBroadcast {
            bus: self.clone(),
            tab_id: TabId::new(),
            listeners: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Channel over a process-local [`LocalBus`].
#[derive(Debug, Clone)]
pub struct LocalBroadcast {
    bus: LocalBus,
    tab_id: TabId,
    listeners: Arc<AtomicUsize>,
}

impl BroadcastChannel for LocalBroadcast {
    fn tab_id(&self) -> TabId {
        self.tab_id
    }

    fn publish(&self) -> ReclaimResult<RefreshSignal> {
        let signal = RefreshSignal {
            origin: Some(self.tab_id),
            emitted_at_ms: epoch_millis(),
        };
        let _ = self.bus.signals.send(signal);
        tracing::debug!(tab = %self.tab_id, "refresh signal published");
        Ok(signal)
    }

    fn subscribe(&self) -> Subscription {
        Subscription {
            tab_id: self.tab_id,
            source: Source::Local(self.bus.signals.subscribe()),
            _guard: ListenerGuard::attach(&self.listeners),
        }
    }

    fn listener_count(&self) -> usize {
        self.listeners.load(Ordering::SeqCst)
    }
}
