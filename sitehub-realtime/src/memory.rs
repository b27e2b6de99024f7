//! In-process transport: a hub of topic rooms with server-side filtering.
//!
//! ```text
//! ChannelRegistry A ── MemoryTransport (conn A) ──┐
//!                                                 ├── MemoryHub
//! ChannelRegistry B ── MemoryTransport (conn B) ──┘     │
//!                                                       ├── Room "tasks:p1"      rows, filter
//!                                                       ├── Room "presence:s7"   member set
//!                                                       └── Room "broadcast:s7"  fan-out
//! ```
//!
//! Each topic gets its own room so that events are isolated between topics.
//! Rooms are created on first join and dropped once empty. Row changes are
//! pushed in with [`MemoryHub::emit_row_change`] and routed to every joined
//! channel whose filter matches, the way the hosted backend does it.
//! Broadcasts are not echoed back to the sending connection.
//!
//! Sinks are always invoked after the hub lock is released.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use crate::error::TransportError;
use crate::protocol::{
    BroadcastMessage, ChannelEvent, ChannelName, ChannelSpec, ChannelStatus, PresenceEvent,
    PresenceMember, PresenceState, RowChange,
};
use crate::transport::{ack, Ack, ChannelHandle, EventSink, Transport};

/// Statistics for monitoring hub traffic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubStats {
    pub channels_created: u64,
    pub messages_sent: u64,
    pub events_delivered: u64,
    pub active_rooms: usize,
    pub open_channels: usize,
}

struct AtomicHubStats {
    channels_created: AtomicU64,
    messages_sent: AtomicU64,
    events_delivered: AtomicU64,
}

impl AtomicHubStats {
    fn new() -> Self {
        Self {
            channels_created: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            events_delivered: AtomicU64::new(0),
        }
    }
}

/// A joined channel inside a room.
struct RoomMember {
    handle_id: u64,
    connection: Uuid,
    spec: ChannelSpec,
    sink: EventSink,
    status: Arc<Mutex<ChannelStatus>>,
}

impl RoomMember {
    /// Errored members stay in the room until they rejoin or close, but
    /// receive nothing meanwhile.
    fn is_joined(&self) -> bool {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) == ChannelStatus::Joined
    }
}

/// All joined channels and the presence set of one topic.
#[derive(Default)]
struct Room {
    members: Vec<RoomMember>,
    presence: Vec<PresenceMember>,
}

impl Room {
    fn presence_sinks(&self) -> Vec<EventSink> {
        self.members
            .iter()
            .filter(|m| m.spec == ChannelSpec::Presence && m.is_joined())
            .map(|m| m.sink.clone())
            .collect()
    }
}

/// Injected failures, matched by topic prefix.
#[derive(Default)]
struct Faults {
    reject_channels: Vec<String>,
    reject_joins: Vec<String>,
    reject_tracks: Vec<String>,
}

struct HubInner {
    rooms: Mutex<HashMap<String, Room>>,
    faults: Mutex<Faults>,
    fail_close: AtomicBool,
    next_handle: AtomicU64,
    stats: AtomicHubStats,
}

impl HubInner {
    fn rooms(&self) -> MutexGuard<'_, HashMap<String, Room>> {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn faults(&self) -> MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver collected events outside any hub lock.
    fn deliver(&self, deliveries: Vec<(EventSink, ChannelEvent)>) -> usize {
        let count = deliveries.len();
        for (sink, event) in deliveries {
            sink(event);
        }
        self.stats
            .events_delivered
            .fetch_add(count as u64, Ordering::Relaxed);
        count
    }
}

/// Presence change fanned out as a `Join`/`Leave` followed by a `Sync`.
fn presence_deliveries(
    sinks: Vec<EventSink>,
    change: PresenceEvent,
    members: Vec<PresenceMember>,
) -> Vec<(EventSink, ChannelEvent)> {
    let mut out = Vec::with_capacity(sinks.len() * 2);
    for sink in sinks {
        out.push((sink.clone(), ChannelEvent::Presence(change.clone())));
        out.push((
            sink,
            ChannelEvent::Presence(PresenceEvent::Sync {
                members: members.clone(),
            }),
        ));
    }
    out
}

/// Shared in-process realtime backend.
#[derive(Clone)]
pub struct MemoryHub {
    inner: Arc<HubInner>,
}

impl Default for MemoryHub {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHub {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                rooms: Mutex::new(HashMap::new()),
                faults: Mutex::new(Faults::default()),
                fail_close: AtomicBool::new(false),
                next_handle: AtomicU64::new(1),
                stats: AtomicHubStats::new(),
            }),
        }
    }

    /// Open a new client connection to this hub.
    pub fn connect(&self) -> MemoryTransport {
        MemoryTransport {
            hub: self.inner.clone(),
            connection: Uuid::new_v4(),
        }
    }

    /// Route a row change from `schema` to every matching joined channel.
    ///
    /// Returns the number of channels that received it.
    pub fn emit_row_change(&self, schema: &str, change: RowChange) -> usize {
        let deliveries: Vec<(EventSink, ChannelEvent)> = {
            let rooms = self.inner.rooms();
            rooms
                .values()
                .flat_map(|room| room.members.iter())
                .filter(|m| m.is_joined())
                .filter(|m| match &m.spec {
                    ChannelSpec::RowChanges(filter) => {
                        filter.matches(schema, change.table(), change.filter_row())
                    }
                    _ => false,
                })
                .map(|m| (m.sink.clone(), ChannelEvent::RowChange(change.clone())))
                .collect()
        };
        self.inner.deliver(deliveries)
    }

    /// Refuse `Transport::channel` for topics starting with `prefix`.
    pub fn reject_channels(&self, prefix: impl Into<String>) {
        self.inner.faults().reject_channels.push(prefix.into());
    }

    /// Let channels be created but fail activation for topics starting with `prefix`.
    pub fn reject_joins(&self, prefix: impl Into<String>) {
        self.inner.faults().reject_joins.push(prefix.into());
    }

    /// Refuse presence publishes on topics starting with `prefix`.
    pub fn reject_tracks(&self, prefix: impl Into<String>) {
        self.inner.faults().reject_tracks.push(prefix.into());
    }

    /// Make every subsequent `close` report a failure (teardown still happens).
    pub fn fail_close(&self, fail: bool) {
        self.inner.fail_close.store(fail, Ordering::Relaxed);
    }

    pub fn clear_faults(&self) {
        *self.inner.faults() = Faults::default();
        self.fail_close(false);
    }

    /// Mark every joined channel on `topic` as errored, as a dropped socket would.
    pub fn disrupt(&self, topic: &str) -> usize {
        let rooms = self.inner.rooms();
        let Some(room) = rooms.get(topic) else {
            return 0;
        };
        log::warn!("Disrupting {} channels on {topic}", room.members.len());
        for member in &room.members {
            *member.status.lock().unwrap_or_else(PoisonError::into_inner) = ChannelStatus::Errored;
        }
        room.members.len()
    }

    /// Joined channels across all topics.
    pub fn open_channels(&self) -> usize {
        self.inner.rooms().values().map(|r| r.members.len()).sum()
    }

    /// Joined channels on one topic.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner
            .rooms()
            .get(topic)
            .map_or(0, |r| r.members.len())
    }

    /// Current presence set of a topic.
    pub fn presence(&self, topic: &str) -> Vec<PresenceMember> {
        self.inner
            .rooms()
            .get(topic)
            .map(|r| r.presence.clone())
            .unwrap_or_default()
    }

    /// Active topic names.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.inner.rooms().keys().cloned().collect();
        topics.sort();
        topics
    }

    pub fn stats(&self) -> HubStats {
        let rooms = self.inner.rooms();
        HubStats {
            channels_created: self.inner.stats.channels_created.load(Ordering::Relaxed),
            messages_sent: self.inner.stats.messages_sent.load(Ordering::Relaxed),
            events_delivered: self.inner.stats.events_delivered.load(Ordering::Relaxed),
            active_rooms: rooms.len(),
            open_channels: rooms.values().map(|r| r.members.len()).sum(),
        }
    }
}

/// One client connection to a [`MemoryHub`].
#[derive(Clone)]
pub struct MemoryTransport {
    hub: Arc<HubInner>,
    connection: Uuid,
}

impl MemoryTransport {
    /// Identity of this connection; also its presence key.
    pub fn connection_id(&self) -> Uuid {
        self.connection
    }
}

impl Transport for MemoryTransport {
    fn channel(
        &self,
        topic: &ChannelName,
        spec: &ChannelSpec,
        sink: EventSink,
    ) -> Result<Arc<dyn ChannelHandle>, TransportError> {
        let rejected = self
            .hub
            .faults()
            .reject_channels
            .iter()
            .any(|p| topic.as_str().starts_with(p.as_str()));
        if rejected {
            return Err(TransportError::Rejected {
                topic: topic.to_string(),
                reason: "channel refused".to_string(),
            });
        }
        if let ChannelSpec::RowChanges(filter) = spec {
            filter.validate()?;
        }

        self.hub.stats.channels_created.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(MemoryChannel {
            id: self.hub.next_handle.fetch_add(1, Ordering::Relaxed),
            topic: topic.to_string(),
            connection: self.connection,
            spec: spec.clone(),
            sink,
            status: Arc::new(Mutex::new(ChannelStatus::Joining)),
            hub: self.hub.clone(),
        }))
    }
}

/// A channel handle backed by a hub room.
pub struct MemoryChannel {
    id: u64,
    topic: String,
    connection: Uuid,
    spec: ChannelSpec,
    sink: EventSink,
    status: Arc<Mutex<ChannelStatus>>,
    hub: Arc<HubInner>,
}

impl MemoryChannel {
    fn set_status(&self, status: ChannelStatus) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }

    fn presence_key(&self) -> String {
        self.connection.to_string()
    }

    fn is_joined(&self) -> bool {
        self.status() == ChannelStatus::Joined
    }
}

impl ChannelHandle for MemoryChannel {
    fn subscribe(&self) -> Result<(), TransportError> {
        match self.status() {
            ChannelStatus::Joined => return Ok(()),
            ChannelStatus::Closed | ChannelStatus::Leaving => {
                return Err(TransportError::Closed(self.topic.clone()));
            }
            ChannelStatus::Joining | ChannelStatus::Errored => {}
        }

        let refused = self
            .hub
            .faults()
            .reject_joins
            .iter()
            .any(|p| self.topic.starts_with(p.as_str()));
        if refused {
            log::debug!("Refusing join on {} for connection {}", self.topic, self.connection);
            self.set_status(ChannelStatus::Errored);
            return Err(TransportError::Rejected {
                topic: self.topic.clone(),
                reason: "join refused".to_string(),
            });
        }

        // Presence channels receive the current member set on join.
        let initial = {
            let mut rooms = self.hub.rooms();
            if !rooms.contains_key(&self.topic) {
                log::debug!("Creating room {}", self.topic);
            }
            let room = rooms.entry(self.topic.clone()).or_default();
            room.members.retain(|m| m.handle_id != self.id);
            room.members.push(RoomMember {
                handle_id: self.id,
                connection: self.connection,
                spec: self.spec.clone(),
                sink: self.sink.clone(),
                status: self.status.clone(),
            });
            self.set_status(ChannelStatus::Joined);
            match self.spec {
                ChannelSpec::Presence => Some(room.presence.clone()),
                _ => None,
            }
        };

        if let Some(members) = initial {
            self.hub.deliver(vec![(
                self.sink.clone(),
                ChannelEvent::Presence(PresenceEvent::Sync { members }),
            )]);
        }
        Ok(())
    }

    fn status(&self) -> ChannelStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn track(&self, state: PresenceState) -> Ack {
        if !self.is_joined() {
            return ack(Err(TransportError::Closed(self.topic.clone())));
        }
        let refused = self
            .hub
            .faults()
            .reject_tracks
            .iter()
            .any(|p| self.topic.starts_with(p.as_str()));
        if refused {
            return ack(Err(TransportError::Rejected {
                topic: self.topic.clone(),
                reason: "track refused".to_string(),
            }));
        }
        let key = self.presence_key();

        let deliveries = {
            let mut rooms = self.hub.rooms();
            let Some(room) = rooms.get_mut(&self.topic) else {
                return ack(Err(TransportError::Closed(self.topic.clone())));
            };
            room.presence.retain(|m| m.key != key);
            room.presence.push(PresenceMember {
                key: key.clone(),
                state: state.clone(),
            });
            presence_deliveries(
                room.presence_sinks(),
                PresenceEvent::Join {
                    key,
                    joined: vec![state],
                },
                room.presence.clone(),
            )
        };

        self.hub.deliver(deliveries);
        ack(Ok(()))
    }

    fn untrack(&self) -> Ack {
        if !self.is_joined() {
            return ack(Err(TransportError::Closed(self.topic.clone())));
        }
        let key = self.presence_key();

        let deliveries = {
            let mut rooms = self.hub.rooms();
            match rooms.get_mut(&self.topic) {
                Some(room) => {
                    let left: Vec<PresenceState> = room
                        .presence
                        .iter()
                        .filter(|m| m.key == key)
                        .map(|m| m.state.clone())
                        .collect();
                    if left.is_empty() {
                        Vec::new()
                    } else {
                        room.presence.retain(|m| m.key != key);
                        presence_deliveries(
                            room.presence_sinks(),
                            PresenceEvent::Leave { key, left },
                            room.presence.clone(),
                        )
                    }
                }
                None => Vec::new(),
            }
        };

        self.hub.deliver(deliveries);
        ack(Ok(()))
    }

    fn send(&self, message: BroadcastMessage) -> Result<(), TransportError> {
        if !self.is_joined() {
            return Err(TransportError::Closed(self.topic.clone()));
        }

        let deliveries: Vec<(EventSink, ChannelEvent)> = {
            let rooms = self.hub.rooms();
            rooms
                .get(&self.topic)
                .map(|room| {
                    room.members
                        .iter()
                        .filter(|m| {
                            m.spec == ChannelSpec::Broadcast
                                && m.connection != self.connection
                                && m.is_joined()
                        })
                        .map(|m| (m.sink.clone(), ChannelEvent::Broadcast(message.clone())))
                        .collect()
                })
                .unwrap_or_default()
        };

        self.hub.stats.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.hub.deliver(deliveries);
        Ok(())
    }

    fn close(&self) -> Result<(), TransportError> {
        if self.status() == ChannelStatus::Closed {
            return Ok(());
        }
        self.set_status(ChannelStatus::Leaving);
        let key = self.presence_key();

        let deliveries = {
            let mut rooms = self.hub.rooms();
            let mut deliveries = Vec::new();
            if let Some(room) = rooms.get_mut(&self.topic) {
                room.members.retain(|m| m.handle_id != self.id);

                if self.spec == ChannelSpec::Presence {
                    let left: Vec<PresenceState> = room
                        .presence
                        .iter()
                        .filter(|m| m.key == key)
                        .map(|m| m.state.clone())
                        .collect();
                    if !left.is_empty() {
                        room.presence.retain(|m| m.key != key);
                        deliveries = presence_deliveries(
                            room.presence_sinks(),
                            PresenceEvent::Leave { key, left },
                            room.presence.clone(),
                        );
                    }
                }

                if room.members.is_empty() {
                    log::debug!("Removing empty room {}", self.topic);
                    rooms.remove(&self.topic);
                }
            }
            deliveries
        };

        self.set_status(ChannelStatus::Closed);
        self.hub.deliver(deliveries);

        if self.hub.fail_close.load(Ordering::Relaxed) {
            return Err(TransportError::CloseFailed(self.topic.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ChannelKind, RowFilter};
    use serde_json::json;

    fn recording_sink() -> (EventSink, Arc<Mutex<Vec<ChannelEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let captured = events.clone();
        let sink: EventSink =
            Arc::new(move |event: ChannelEvent| captured.lock().unwrap().push(event));
        (sink, events)
    }

    fn tasks_spec(project: &str) -> ChannelSpec {
        ChannelSpec::RowChanges(RowFilter::eq("public", "tasks", "project_id", project))
    }

    #[test]
    fn test_room_created_on_join_and_dropped_when_empty() {
        let hub = MemoryHub::new();
        let transport = hub.connect();
        let topic = ChannelName::new(ChannelKind::ProjectTasks, "p1");
        let (sink, _) = recording_sink();

        let handle = transport.channel(&topic, &tasks_spec("p1"), sink).unwrap();
        assert_eq!(handle.status(), ChannelStatus::Joining);
        assert_eq!(hub.open_channels(), 0);

        handle.subscribe().unwrap();
        assert_eq!(handle.status(), ChannelStatus::Joined);
        assert_eq!(hub.topics(), vec!["tasks:p1".to_string()]);

        handle.close().unwrap();
        assert_eq!(handle.status(), ChannelStatus::Closed);
        assert!(hub.topics().is_empty());
        // Closing twice is harmless
        handle.close().unwrap();
    }

    #[test]
    fn test_row_change_routed_by_filter() {
        let hub = MemoryHub::new();
        let transport = hub.connect();
        let (sink1, events1) = recording_sink();
        let (sink2, events2) = recording_sink();

        let p1 = transport
            .channel(&ChannelName::new(ChannelKind::ProjectTasks, "p1"), &tasks_spec("p1"), sink1)
            .unwrap();
        let p2 = transport
            .channel(&ChannelName::new(ChannelKind::ProjectTasks, "p2"), &tasks_spec("p2"), sink2)
            .unwrap();
        p1.subscribe().unwrap();
        p2.subscribe().unwrap();

        let delivered = hub.emit_row_change(
            "public",
            RowChange::Insert {
                table: "tasks".into(),
                record: json!({"id": 1, "project_id": "p1"}),
            },
        );

        assert_eq!(delivered, 1);
        assert_eq!(events1.lock().unwrap().len(), 1);
        assert!(events2.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unjoined_channel_receives_nothing() {
        let hub = MemoryHub::new();
        let transport = hub.connect();
        let (sink, events) = recording_sink();
        let _handle = transport
            .channel(&ChannelName::new(ChannelKind::ProjectTasks, "p1"), &tasks_spec("p1"), sink)
            .unwrap();

        let delivered = hub.emit_row_change(
            "public",
            RowChange::Delete {
                table: "tasks".into(),
                old_record: json!({"project_id": "p1"}),
            },
        );
        assert_eq!(delivered, 0);
        assert!(events.lock().unwrap().is_empty());
    }

    #[test]
    fn test_broadcast_skips_sender_connection() {
        let hub = MemoryHub::new();
        let alice = hub.connect();
        let bob = hub.connect();
        let topic = ChannelName::new(ChannelKind::Broadcast, "site-7");

        let (sink_a, events_a) = recording_sink();
        let (sink_b, events_b) = recording_sink();
        let a = alice.channel(&topic, &ChannelSpec::Broadcast, sink_a).unwrap();
        let b = bob.channel(&topic, &ChannelSpec::Broadcast, sink_b).unwrap();
        a.subscribe().unwrap();
        b.subscribe().unwrap();

        a.send(BroadcastMessage::new("ping", json!({"x": 1}))).unwrap();

        assert!(events_a.lock().unwrap().is_empty());
        let received = events_b.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(
            received[0],
            ChannelEvent::Broadcast(BroadcastMessage::new("ping", json!({"x": 1})))
        );
        assert_eq!(hub.stats().messages_sent, 1);
    }

    #[tokio::test]
    async fn test_presence_track_untrack() {
        let hub = MemoryHub::new();
        let alice = hub.connect();
        let bob = hub.connect();
        let topic = ChannelName::new(ChannelKind::Presence, "site-7");

        let (sink_a, _) = recording_sink();
        let (sink_b, events_b) = recording_sink();
        let a = alice.channel(&topic, &ChannelSpec::Presence, sink_a).unwrap();
        let b = bob.channel(&topic, &ChannelSpec::Presence, sink_b).unwrap();
        a.subscribe().unwrap();
        b.subscribe().unwrap();

        a.track(PresenceState::new("user-a", json!({"page": "tasks"})))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hub.presence("presence:site-7").len(), 1);
        assert_eq!(hub.presence("presence:site-7")[0].key, alice.connection_id().to_string());

        a.untrack().await.unwrap().unwrap();
        assert!(hub.presence("presence:site-7").is_empty());

        let events = events_b.lock().unwrap();
        // initial sync, join + sync, leave + sync
        assert_eq!(events.len(), 5);
        assert!(matches!(events[1], ChannelEvent::Presence(PresenceEvent::Join { .. })));
        assert!(matches!(events[3], ChannelEvent::Presence(PresenceEvent::Leave { .. })));
    }

    #[tokio::test]
    async fn test_close_drops_tracked_presence() {
        let hub = MemoryHub::new();
        let alice = hub.connect();
        let bob = hub.connect();
        let topic = ChannelName::new(ChannelKind::Presence, "site-7");

        let (sink_a, _) = recording_sink();
        let (sink_b, events_b) = recording_sink();
        let a = alice.channel(&topic, &ChannelSpec::Presence, sink_a).unwrap();
        let b = bob.channel(&topic, &ChannelSpec::Presence, sink_b).unwrap();
        a.subscribe().unwrap();
        b.subscribe().unwrap();
        a.track(PresenceState::new("user-a", json!({}))).await.unwrap().unwrap();

        a.close().unwrap();

        assert!(hub.presence("presence:site-7").is_empty());
        let events = events_b.lock().unwrap();
        assert!(matches!(
            events.last(),
            Some(ChannelEvent::Presence(PresenceEvent::Sync { members })) if members.is_empty()
        ));
    }

    #[test]
    fn test_faults() {
        let hub = MemoryHub::new();
        let transport = hub.connect();
        let topic = ChannelName::new(ChannelKind::ProjectTasks, "p1");

        hub.reject_channels("tasks:");
        let (sink, _) = recording_sink();
        assert!(matches!(
            transport.channel(&topic, &tasks_spec("p1"), sink.clone()),
            Err(TransportError::Rejected { .. })
        ));

        hub.clear_faults();
        hub.reject_joins("tasks:");
        let handle = transport.channel(&topic, &tasks_spec("p1"), sink.clone()).unwrap();
        assert!(handle.subscribe().is_err());
        assert_eq!(handle.status(), ChannelStatus::Errored);

        hub.clear_faults();
        let handle = transport.channel(&topic, &tasks_spec("p1"), sink).unwrap();
        handle.subscribe().unwrap();
        hub.fail_close(true);
        assert_eq!(handle.close(), Err(TransportError::CloseFailed("tasks:p1".into())));
        assert_eq!(hub.open_channels(), 0);
    }

    #[test]
    fn test_invalid_filter_rejected() {
        let hub = MemoryHub::new();
        let transport = hub.connect();
        let (sink, _) = recording_sink();
        let result = transport.channel(
            &ChannelName::new(ChannelKind::ProjectTasks, ""),
            &tasks_spec(""),
            sink,
        );
        assert!(matches!(result, Err(TransportError::InvalidFilter(_))));
        assert_eq!(hub.stats().channels_created, 0);
    }

    #[test]
    fn test_disrupt_marks_errored() {
        let hub = MemoryHub::new();
        let transport = hub.connect();
        let (sink, _) = recording_sink();
        let handle = transport
            .channel(&ChannelName::new(ChannelKind::Broadcast, "s"), &ChannelSpec::Broadcast, sink)
            .unwrap();
        handle.subscribe().unwrap();

        assert_eq!(hub.disrupt("broadcast:s"), 1);
        assert_eq!(handle.status(), ChannelStatus::Errored);
        assert_eq!(hub.disrupt("broadcast:none"), 0);
    }

    #[test]
    fn test_errored_member_receives_nothing_until_rejoin() {
        let hub = MemoryHub::new();
        let topic = ChannelName::new(ChannelKind::ProjectTasks, "p1");
        let (sink, events) = recording_sink();
        let handle = hub
            .connect()
            .channel(&topic, &tasks_spec("p1"), sink)
            .unwrap();
        handle.subscribe().unwrap();
        let change = RowChange::Insert {
            table: "tasks".into(),
            record: json!({"project_id": "p1"}),
        };

        hub.disrupt("tasks:p1");
        assert_eq!(hub.emit_row_change("public", change.clone()), 0);
        assert!(events.lock().unwrap().is_empty());

        handle.subscribe().unwrap();
        assert_eq!(handle.status(), ChannelStatus::Joined);
        assert_eq!(hub.subscriber_count("tasks:p1"), 1);
        assert_eq!(hub.emit_row_change("public", change), 1);
        assert_eq!(events.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_broadcast_skips_errored_peer() {
        let hub = MemoryHub::new();
        let topic = ChannelName::new(ChannelKind::Broadcast, "s");
        let (peer_sink, received) = recording_sink();
        let (own_sink, _) = recording_sink();
        let peer = hub
            .connect()
            .channel(&topic, &ChannelSpec::Broadcast, peer_sink)
            .unwrap();
        let sender = hub
            .connect()
            .channel(&topic, &ChannelSpec::Broadcast, own_sink)
            .unwrap();
        peer.subscribe().unwrap();
        sender.subscribe().unwrap();

        hub.disrupt("broadcast:s");
        sender.subscribe().unwrap();
        sender.send(BroadcastMessage::new("ping", json!({}))).unwrap();
        assert!(received.lock().unwrap().is_empty());

        peer.subscribe().unwrap();
        sender.send(BroadcastMessage::new("ping", json!({}))).unwrap();
        assert_eq!(received.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_track_leaves_presence_unchanged() {
        let hub = MemoryHub::new();
        let topic = ChannelName::new(ChannelKind::Presence, "s");
        let (sink, _) = recording_sink();
        let handle = hub
            .connect()
            .channel(&topic, &ChannelSpec::Presence, sink)
            .unwrap();
        handle.subscribe().unwrap();

        hub.reject_tracks("presence:");
        let result = handle.track(PresenceState::new("u1", json!({}))).await.unwrap();
        assert!(matches!(result, Err(TransportError::Rejected { .. })));
        assert!(hub.presence("presence:s").is_empty());

        hub.clear_faults();
        handle.track(PresenceState::new("u1", json!({}))).await.unwrap().unwrap();
        assert_eq!(hub.presence("presence:s").len(), 1);
    }
}
