//! Multiplexed subscription registry.
//!
//! Any number of local listeners share one transport channel per canonical
//! [`ChannelName`]:
//!
//! ```text
//! widget A ──subscribe_to_project_tasks("p1")──┐
//!                                              ├── entry "tasks:p1" ── ChannelHandle
//! widget B ──subscribe_to_project_tasks("p1")──┘      listeners [A, B]
//! ```
//!
//! A channel is opened by the first holder and closed when the last one
//! leaves. Holders are listeners and, on presence channels, an active
//! `track_presence`. The map lock is never held while the transport
//! activates or closes a channel or while listeners run, so listeners may
//! subscribe and unsubscribe from inside a callback.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};

use log::{debug, error, info, warn};
use serde_json::Value;
use tokio::sync::oneshot::error::TryRecvError;

use crate::config::RealtimeConfig;
use crate::error::{RealtimeError, TransportError};
use crate::protocol::{
    BroadcastMessage, ChannelEvent, ChannelKind, ChannelName, ChannelSpec, ChannelStatus,
    PresenceEvent, PresenceState, RowChange, RowFilter,
};
use crate::transport::{Ack, ChannelHandle, EventSink, NullTransport, Transport};

type Callback = Arc<dyn Fn(&ChannelEvent) + Send + Sync>;

#[derive(Clone)]
struct Listener {
    id: u64,
    active: Arc<AtomicBool>,
    callback: Callback,
}

/// What keeps a channel open.
enum Holder {
    Listener(Listener),
    Presence,
}

struct ChannelEntry {
    /// Distinguishes this entry from earlier ones under the same name.
    generation: u64,
    handle: Arc<dyn ChannelHandle>,
    listeners: Vec<Listener>,
    tracked: bool,
}

impl ChannelEntry {
    /// Returns whether the hold is new.
    fn hold(&mut self, holder: Holder) -> bool {
        match holder {
            Holder::Listener(listener) => {
                self.listeners.push(listener);
                true
            }
            Holder::Presence => !std::mem::replace(&mut self.tracked, true),
        }
    }

    fn is_idle(&self) -> bool {
        self.listeners.is_empty() && !self.tracked
    }

    fn deactivate(&self) {
        for listener in &self.listeners {
            listener.active.store(false, Ordering::Release);
        }
    }
}

/// A holder registered on a joined channel.
struct Attached {
    handle: Arc<dyn ChannelHandle>,
    generation: u64,
    /// False when the same hold was already in place.
    fresh: bool,
}

/// Registry statistics snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub channels_opened: u64,
    pub channels_closed: u64,
    pub open_failures: u64,
    pub close_failures: u64,
    pub rejoins: u64,
    pub events_delivered: u64,
    pub callback_panics: u64,
    pub active_channels: usize,
    pub active_listeners: usize,
}

/// Lock-free counters behind [`RegistryStats`].
struct AtomicRegistryStats {
    channels_opened: AtomicU64,
    channels_closed: AtomicU64,
    open_failures: AtomicU64,
    close_failures: AtomicU64,
    rejoins: AtomicU64,
    events_delivered: AtomicU64,
    callback_panics: AtomicU64,
}

impl AtomicRegistryStats {
    fn new() -> Self {
        Self {
            channels_opened: AtomicU64::new(0),
            channels_closed: AtomicU64::new(0),
            open_failures: AtomicU64::new(0),
            close_failures: AtomicU64::new(0),
            rejoins: AtomicU64::new(0),
            events_delivered: AtomicU64::new(0),
            callback_panics: AtomicU64::new(0),
        }
    }
}

struct RegistryInner {
    config: RealtimeConfig,
    transport: Arc<dyn Transport>,
    channels: Mutex<HashMap<ChannelName, ChannelEntry>>,
    next_id: AtomicU64,
    stats: AtomicRegistryStats,
}

impl RegistryInner {
    fn lock(&self) -> MutexGuard<'_, HashMap<ChannelName, ChannelEntry>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn sink(self: &Arc<Self>, name: ChannelName, generation: u64) -> EventSink {
        let registry = Arc::downgrade(self);
        Arc::new(move |event: ChannelEvent| {
            if let Some(inner) = registry.upgrade() {
                inner.dispatch(&name, generation, &event);
            }
        })
    }

    /// Register `holder` on `name`, opening the channel if needed.
    ///
    /// An existing channel that has errored is rejoined first.
    fn attach(
        self: &Arc<Self>,
        name: &ChannelName,
        spec: &ChannelSpec,
        holder: Holder,
    ) -> Result<Attached, TransportError> {
        let (attached, created) = {
            let mut channels = self.lock();
            if let Some(entry) = channels.get_mut(name) {
                let fresh = entry.hold(holder);
                let attached = Attached {
                    handle: entry.handle.clone(),
                    generation: entry.generation,
                    fresh,
                };
                (attached, false)
            } else {
                let generation = self.next_id();
                let sink = self.sink(name.clone(), generation);
                let handle = match self.transport.channel(name, spec, sink) {
                    Ok(handle) => handle,
                    Err(e) => {
                        self.open_failed(name, &e);
                        return Err(e);
                    }
                };

                let mut entry = ChannelEntry {
                    generation,
                    handle: handle.clone(),
                    listeners: Vec::new(),
                    tracked: false,
                };
                entry.hold(holder);
                channels.insert(name.clone(), entry);
                let attached = Attached {
                    handle,
                    generation,
                    fresh: true,
                };
                (attached, true)
            }
        };

        if !created {
            self.recover(name, attached.generation, &*attached.handle)?;
            return Ok(attached);
        }

        if let Err(e) = attached.handle.subscribe() {
            self.open_failed(name, &e);
            if let Some(entry) = self.take_generation(name, attached.generation) {
                entry.deactivate();
            }
            if let Err(close_err) = attached.handle.close() {
                debug!("Discarding failed channel {name}: {close_err}");
            }
            return Err(e);
        }

        self.stats.channels_opened.fetch_add(1, Ordering::Relaxed);
        debug!("Opened realtime channel {name}");
        Ok(attached)
    }

    /// Rejoin an errored channel. If that fails the entry is closed so the
    /// next call starts fresh.
    fn recover(
        &self,
        name: &ChannelName,
        generation: u64,
        handle: &dyn ChannelHandle,
    ) -> Result<(), TransportError> {
        if handle.status() != ChannelStatus::Errored {
            return Ok(());
        }
        match handle.subscribe() {
            Ok(()) => {
                self.stats.rejoins.fetch_add(1, Ordering::Relaxed);
                info!("Rejoined realtime channel {name}");
                Ok(())
            }
            Err(e) => {
                warn!("Failed to rejoin realtime channel {name}: {e}");
                if let Some(entry) = self.take_generation(name, generation) {
                    self.close_entry(name, entry);
                }
                Err(e)
            }
        }
    }

    /// Remove the entry under `name` if it is still the given generation.
    fn take_generation(&self, name: &ChannelName, generation: u64) -> Option<ChannelEntry> {
        let mut channels = self.lock();
        let ours = channels
            .get(name)
            .is_some_and(|e| e.generation == generation);
        if ours {
            channels.remove(name)
        } else {
            None
        }
    }

    fn open_failed(&self, name: &ChannelName, err: &TransportError) {
        self.stats.open_failures.fetch_add(1, Ordering::Relaxed);
        match err {
            TransportError::Unconfigured => debug!("Realtime disabled, skipping {name}"),
            _ => warn!("Failed to open realtime channel {name}: {err}"),
        }
    }

    /// Remove one listener; closes the channel if nothing else holds it.
    fn detach(&self, name: &ChannelName, listener_id: u64) {
        let removed = {
            let mut channels = self.lock();
            let Some(entry) = channels.get_mut(name) else {
                return;
            };
            let before = entry.listeners.len();
            entry.listeners.retain(|l| l.id != listener_id);
            if entry.listeners.len() == before || !entry.is_idle() {
                return;
            }
            channels.remove(name)
        };

        if let Some(entry) = removed {
            self.close_entry(name, entry);
        }
    }

    /// Drop the presence hold of `generation`; closes the channel if idle.
    fn release_presence(&self, name: &ChannelName, generation: u64) {
        let removed = {
            let mut channels = self.lock();
            let Some(entry) = channels.get_mut(name) else {
                return;
            };
            if entry.generation != generation || !entry.tracked {
                return;
            }
            entry.tracked = false;
            if !entry.is_idle() {
                return;
            }
            channels.remove(name)
        };

        if let Some(entry) = removed {
            self.close_entry(name, entry);
        }
    }

    fn close_entry(&self, name: &ChannelName, entry: ChannelEntry) {
        entry.deactivate();
        if let Err(e) = entry.handle.close() {
            self.stats.close_failures.fetch_add(1, Ordering::Relaxed);
            warn!("Error closing realtime channel {name}: {e}");
        }
        self.stats.channels_closed.fetch_add(1, Ordering::Relaxed);
        debug!("Closed realtime channel {name}");
    }

    /// Deliver one event to a snapshot of the channel's listeners.
    fn dispatch(&self, name: &ChannelName, generation: u64, event: &ChannelEvent) {
        let listeners = {
            let channels = self.lock();
            match channels.get(name) {
                Some(entry) if entry.generation == generation => entry.listeners.clone(),
                _ => return,
            }
        };

        for listener in listeners {
            if !listener.active.load(Ordering::Acquire) {
                continue;
            }
            let callback = &listener.callback;
            match panic::catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(()) => {
                    self.stats.events_delivered.fetch_add(1, Ordering::Relaxed);
                }
                Err(_) => {
                    self.stats.callback_panics.fetch_add(1, Ordering::Relaxed);
                    error!(
                        "Realtime listener on {name} panicked; continuing with remaining listeners"
                    );
                }
            }
        }
    }

    /// Open a throwaway broadcast channel, send once and close it again.
    fn send_transient(
        &self,
        name: &ChannelName,
        message: BroadcastMessage,
    ) -> Result<(), TransportError> {
        let sink: EventSink = Arc::new(|_: ChannelEvent| {});
        let handle = self
            .transport
            .channel(name, &ChannelSpec::Broadcast, sink)?;
        let result = handle.subscribe().and_then(|()| handle.send(message));
        if let Err(e) = handle.close() {
            self.stats.close_failures.fetch_add(1, Ordering::Relaxed);
            warn!("Error closing transient channel {name}: {e}");
        }
        result
    }
}

/// Process-facing realtime API.
///
/// Cloning is cheap; clones share the same channels.
#[derive(Clone)]
pub struct ChannelRegistry {
    inner: Arc<RegistryInner>,
}

impl ChannelRegistry {
    /// Create a registry over an explicit transport.
    pub fn new(config: RealtimeConfig, transport: Arc<dyn Transport>) -> Self {
        if !transport.is_live() {
            warn!("Realtime transport is not configured; subscriptions will be no-ops");
        }
        Self {
            inner: Arc::new(RegistryInner {
                config,
                transport,
                channels: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                stats: AtomicRegistryStats::new(),
            }),
        }
    }

    /// Create a registry, connecting only when `config` has credentials.
    ///
    /// An unconfigured `config` selects [`NullTransport`] and `connect` is
    /// never called.
    pub fn from_config<F>(config: RealtimeConfig, connect: F) -> Self
    where
        F: FnOnce(&RealtimeConfig) -> Arc<dyn Transport>,
    {
        let transport: Arc<dyn Transport> = if config.is_configured() {
            connect(&config)
        } else {
            Arc::new(NullTransport)
        };
        Self::new(config, transport)
    }

    /// A registry whose every operation is a no-op.
    pub fn disabled() -> Self {
        Self::new(RealtimeConfig::default(), Arc::new(NullTransport))
    }

    pub fn config(&self) -> &RealtimeConfig {
        &self.inner.config
    }

    /// Whether a live transport backs this registry.
    pub fn is_enabled(&self) -> bool {
        self.inner.transport.is_live()
    }

    // ── Row-change feeds ──────────────────────────────────────────

    /// Insert/update/delete events for one owner's notification records.
    ///
    /// Ids that cannot be written as a filter value (empty, or containing
    /// `,`) yield an inert subscription.
    pub fn subscribe_to_notifications<F>(&self, owner_id: &str, callback: F) -> Subscription
    where
        F: Fn(&RowChange) + Send + Sync + 'static,
    {
        let tables = &self.inner.config.tables;
        let filter = RowFilter::eq(
            &self.inner.config.schema,
            &tables.notifications,
            &tables.owner_column,
            owner_id,
        );
        self.subscribe_rows(ChannelKind::Notifications, owner_id, filter, callback)
    }

    /// Changes to the tasks of one project.
    ///
    /// Ids that cannot be written as a filter value (empty, or containing
    /// `,`) yield an inert subscription.
    pub fn subscribe_to_project_tasks<F>(&self, project_id: &str, callback: F) -> Subscription
    where
        F: Fn(&RowChange) + Send + Sync + 'static,
    {
        let tables = &self.inner.config.tables;
        let filter = RowFilter::eq(
            &self.inner.config.schema,
            &tables.tasks,
            &tables.project_column,
            project_id,
        );
        self.subscribe_rows(ChannelKind::ProjectTasks, project_id, filter, callback)
    }

    /// Changes to a single project row.
    ///
    /// Ids that cannot be written as a filter value (empty, or containing
    /// `,`) yield an inert subscription.
    pub fn subscribe_to_project<F>(&self, project_id: &str, callback: F) -> Subscription
    where
        F: Fn(&RowChange) + Send + Sync + 'static,
    {
        let tables = &self.inner.config.tables;
        let filter = RowFilter::eq(
            &self.inner.config.schema,
            &tables.projects,
            &tables.id_column,
            project_id,
        );
        self.subscribe_rows(ChannelKind::Project, project_id, filter, callback)
    }

    fn subscribe_rows<F>(
        &self,
        kind: ChannelKind,
        scope: &str,
        filter: RowFilter,
        callback: F,
    ) -> Subscription
    where
        F: Fn(&RowChange) + Send + Sync + 'static,
    {
        let callback: Callback = Arc::new(move |event: &ChannelEvent| {
            if let ChannelEvent::RowChange(change) = event {
                callback(change);
            }
        });
        self.subscribe(ChannelName::new(kind, scope), ChannelSpec::RowChanges(filter), callback)
    }

    // ── Presence ──────────────────────────────────────────────────

    /// Sync/join/leave events for a presence topic.
    pub fn subscribe_to_presence<F>(&self, channel: &str, callback: F) -> Subscription
    where
        F: Fn(&PresenceEvent) + Send + Sync + 'static,
    {
        let callback: Callback = Arc::new(move |event: &ChannelEvent| {
            if let ChannelEvent::Presence(presence) = event {
                callback(presence);
            }
        });
        self.subscribe(
            ChannelName::new(ChannelKind::Presence, channel),
            ChannelSpec::Presence,
            callback,
        )
    }

    /// Publish this client's presence on `channel`, opening it if needed.
    ///
    /// The publish starts before this returns; awaiting the ack is optional.
    /// An accepted track keeps the channel open until it is untracked. A
    /// refused one leaves the channel as it was.
    pub fn track_presence(&self, channel: &str, owner_id: &str, metadata: Value) -> PresenceAck {
        let name = ChannelName::new(ChannelKind::Presence, channel);
        let attached = match self.inner.attach(&name, &ChannelSpec::Presence, Holder::Presence) {
            Ok(attached) => attached,
            Err(TransportError::Unconfigured) => {
                return PresenceAck::ready(Err(RealtimeError::Unavailable));
            }
            Err(e) => return PresenceAck::ready(Err(e.into())),
        };

        let mut ack = attached
            .handle
            .track(PresenceState::new(owner_id, metadata));
        let release = attached.fresh.then(|| Release {
            registry: Arc::downgrade(&self.inner),
            name: name.clone(),
            generation: attached.generation,
        });

        match ack.try_recv() {
            Ok(Ok(())) => PresenceAck::ready(Ok(())),
            Ok(Err(e)) => {
                warn!("Presence track on {name} refused: {e}");
                if let Some(release) = release {
                    release.run();
                }
                PresenceAck::ready(Err(e.into()))
            }
            Err(TryRecvError::Closed) => {
                if let Some(release) = release {
                    release.run();
                }
                PresenceAck::ready(Err(RealtimeError::Dropped))
            }
            Err(TryRecvError::Empty) => PresenceAck::pending(ack, release),
        }
    }

    /// Withdraw this client's presence from `channel`.
    ///
    /// Resolves to [`RealtimeError::NotTracked`] when nothing was tracked;
    /// the registry is left untouched in that case.
    pub fn untrack_presence(&self, channel: &str) -> PresenceAck {
        let name = ChannelName::new(ChannelKind::Presence, channel);
        let (handle, removed) = {
            let mut channels = self.inner.lock();
            let (handle, idle) = match channels.get_mut(&name) {
                Some(entry) if entry.tracked => {
                    entry.tracked = false;
                    (entry.handle.clone(), entry.is_idle())
                }
                _ => return PresenceAck::ready(Err(RealtimeError::NotTracked(name.to_string()))),
            };
            let removed = if idle { channels.remove(&name) } else { None };
            (handle, removed)
        };

        let ack = handle.untrack();
        if let Some(entry) = removed {
            self.inner.close_entry(&name, entry);
        }
        PresenceAck::pending(ack, None)
    }

    // ── Broadcast ─────────────────────────────────────────────────

    /// Fire-and-forget publish on `broadcast:<channel>`.
    ///
    /// Messages are never buffered for listeners that subscribe later.
    pub fn broadcast(&self, channel: &str, event: &str, payload: Value) {
        let name = ChannelName::new(ChannelKind::Broadcast, channel);
        let message = BroadcastMessage::new(event, payload);

        let open = self
            .inner
            .lock()
            .get(&name)
            .map(|entry| (entry.handle.clone(), entry.generation));
        let result = match open {
            Some((handle, generation)) => self
                .inner
                .recover(&name, generation, &*handle)
                .and_then(|()| handle.send(message)),
            None => self.inner.send_transient(&name, message),
        };

        match result {
            Ok(()) => {}
            Err(TransportError::Unconfigured) => {
                debug!("Realtime disabled, dropping broadcast on {name}")
            }
            Err(e) => warn!("Broadcast on {name} failed: {e}"),
        }
    }

    /// Broadcast messages on `channel` whose event name is `event`.
    pub fn subscribe_to_broadcast<F>(
        &self,
        channel: &str,
        event: &str,
        callback: F,
    ) -> Subscription
    where
        F: Fn(&BroadcastMessage) + Send + Sync + 'static,
    {
        let event = event.to_string();
        let callback: Callback = Arc::new(move |incoming: &ChannelEvent| {
            if let ChannelEvent::Broadcast(message) = incoming {
                if message.event == event {
                    callback(message);
                }
            }
        });
        self.subscribe(
            ChannelName::new(ChannelKind::Broadcast, channel),
            ChannelSpec::Broadcast,
            callback,
        )
    }

    fn subscribe(&self, name: ChannelName, spec: ChannelSpec, callback: Callback) -> Subscription {
        let listener = Listener {
            id: self.inner.next_id(),
            active: Arc::new(AtomicBool::new(true)),
            callback,
        };
        let token = Subscription::live(&self.inner, name.clone(), &listener);

        match self.inner.attach(&name, &spec, Holder::Listener(listener)) {
            Ok(_) => token,
            Err(_) => Subscription::noop(),
        }
    }

    // ── Teardown & introspection ──────────────────────────────────

    /// Close every channel and forget all listeners.
    pub fn unsubscribe_all(&self) {
        let drained: Vec<(ChannelName, ChannelEntry)> = self.inner.lock().drain().collect();
        if !drained.is_empty() {
            info!("Closing {} realtime channels", drained.len());
        }
        for (name, entry) in drained {
            self.inner.close_entry(&name, entry);
        }
    }

    /// Connection state of an open channel, `None` if it is not open.
    pub fn channel_status(&self, name: &str) -> Option<ChannelStatus> {
        let handle = self.inner.lock().get(name).map(|entry| entry.handle.clone())?;
        Some(handle.status())
    }

    /// Names of all open channels, sorted.
    pub fn channel_names(&self) -> Vec<ChannelName> {
        let mut names: Vec<ChannelName> = self.inner.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn listener_count(&self, name: &str) -> usize {
        self.inner.lock().get(name).map_or(0, |entry| entry.listeners.len())
    }

    pub fn stats(&self) -> RegistryStats {
        let (active_channels, active_listeners) = {
            let channels = self.inner.lock();
            (
                channels.len(),
                channels.values().map(|e| e.listeners.len()).sum(),
            )
        };
        let stats = &self.inner.stats;
        RegistryStats {
            channels_opened: stats.channels_opened.load(Ordering::Relaxed),
            channels_closed: stats.channels_closed.load(Ordering::Relaxed),
            open_failures: stats.open_failures.load(Ordering::Relaxed),
            close_failures: stats.close_failures.load(Ordering::Relaxed),
            rejoins: stats.rejoins.load(Ordering::Relaxed),
            events_delivered: stats.events_delivered.load(Ordering::Relaxed),
            callback_panics: stats.callback_panics.load(Ordering::Relaxed),
            active_channels,
            active_listeners,
        }
    }
}

impl fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("enabled", &self.is_enabled())
            .field("channels", &self.channel_names())
            .finish()
    }
}

// ───────────────────────────────────────────────────────────────────
// Subscription tokens
// ───────────────────────────────────────────────────────────────────

struct TokenInner {
    registry: Weak<RegistryInner>,
    name: ChannelName,
    listener_id: u64,
    active: Arc<AtomicBool>,
}

/// Handle returned by every `subscribe_*` call.
///
/// Dropping it does not unsubscribe; use [`into_guard`](Self::into_guard)
/// for scope-bound listeners.
pub struct Subscription {
    inner: Option<TokenInner>,
}

impl Subscription {
    fn live(registry: &Arc<RegistryInner>, name: ChannelName, listener: &Listener) -> Self {
        Self {
            inner: Some(TokenInner {
                registry: Arc::downgrade(registry),
                name,
                listener_id: listener.id,
                active: listener.active.clone(),
            }),
        }
    }

    /// A token that refers to nothing.
    pub fn noop() -> Self {
        Self { inner: None }
    }

    /// Remove this listener. Safe to call any number of times.
    pub fn unsubscribe(&self) {
        let Some(token) = &self.inner else {
            return;
        };
        if !token.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(registry) = token.registry.upgrade() {
            registry.detach(&token.name, token.listener_id);
        }
    }

    /// Whether the listener is still registered.
    pub fn is_active(&self) -> bool {
        self.inner
            .as_ref()
            .is_some_and(|t| t.active.load(Ordering::Acquire))
    }

    pub fn channel(&self) -> Option<&ChannelName> {
        self.inner.as_ref().map(|t| &t.name)
    }

    pub fn into_guard(self) -> SubscriptionGuard {
        SubscriptionGuard(self)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel())
            .field("active", &self.is_active())
            .finish()
    }
}

/// Unsubscribes when dropped.
#[derive(Debug)]
pub struct SubscriptionGuard(Subscription);

impl SubscriptionGuard {
    pub fn subscription(&self) -> &Subscription {
        &self.0
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.0.unsubscribe();
    }
}

// ───────────────────────────────────────────────────────────────────
// Presence acknowledgements
// ───────────────────────────────────────────────────────────────────

/// Presence hold to drop if a pending track is refused.
struct Release {
    registry: Weak<RegistryInner>,
    name: ChannelName,
    generation: u64,
}

impl Release {
    fn run(self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.release_presence(&self.name, self.generation);
        }
    }
}

enum AckState {
    Ready(Option<Result<(), RealtimeError>>),
    Pending(Ack, Option<Release>),
}

/// Completion signal of a presence publish.
pub struct PresenceAck {
    state: AckState,
}

impl PresenceAck {
    fn ready(result: Result<(), RealtimeError>) -> Self {
        Self {
            state: AckState::Ready(Some(result)),
        }
    }

    fn pending(ack: Ack, release: Option<Release>) -> Self {
        Self {
            state: AckState::Pending(ack, release),
        }
    }
}

impl Future for PresenceAck {
    type Output = Result<(), RealtimeError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let (rx, release) = match &mut self.get_mut().state {
            AckState::Ready(result) => {
                return Poll::Ready(result.take().unwrap_or(Err(RealtimeError::Dropped)));
            }
            AckState::Pending(rx, release) => (rx, release),
        };
        let result = match Pin::new(rx).poll(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(Ok(result)) => result.map_err(RealtimeError::from),
            Poll::Ready(Err(_)) => Err(RealtimeError::Dropped),
        };
        if let Some(release) = release.take() {
            if result.is_err() {
                release.run();
            }
        }
        Poll::Ready(result)
    }
}

impl fmt::Debug for PresenceAck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            AckState::Ready(_) => "ready",
            AckState::Pending(..) => "pending",
        };
        f.debug_struct("PresenceAck").field("state", &state).finish()
    }
}
