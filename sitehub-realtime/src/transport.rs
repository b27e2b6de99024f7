//! Contract toward the backing pub/sub client.
//!
//! A [`Transport`] hands out one [`ChannelHandle`] per topic. The registry
//! drives every handle through the same lifecycle:
//!
//! ```text
//! Transport::channel(topic, spec, sink)   configure; must not emit yet
//!       │
//!       ▼
//! ChannelHandle::subscribe()              activate; may emit through sink
//!       │
//!       ├── track()/untrack()/send()      presence + broadcast
//!       ▼
//! ChannelHandle::close()                  exactly once, by the registry
//! ```
//!
//! The sink may be invoked from any thread. Implementations must not hold
//! their own locks while calling it, since listeners re-enter the registry.

use std::sync::Arc;
use tokio::sync::oneshot;

use crate::error::TransportError;
use crate::protocol::{
    BroadcastMessage, ChannelEvent, ChannelName, ChannelSpec, ChannelStatus, PresenceState,
};

/// Callback a transport uses to deliver events for one channel.
pub type EventSink = Arc<dyn Fn(ChannelEvent) + Send + Sync>;

/// Completion signal for presence publishes.
pub type Ack = oneshot::Receiver<Result<(), TransportError>>;

/// An already-resolved [`Ack`].
pub fn ack(result: Result<(), TransportError>) -> Ack {
    let (tx, rx) = oneshot::channel();
    let _ = tx.send(result);
    rx
}

/// Factory for transport-level channels.
pub trait Transport: Send + Sync {
    /// Configure a channel for `topic`. Events flow once it is subscribed.
    fn channel(
        &self,
        topic: &ChannelName,
        spec: &ChannelSpec,
        sink: EventSink,
    ) -> Result<Arc<dyn ChannelHandle>, TransportError>;

    /// Whether this transport can actually reach a backend.
    fn is_live(&self) -> bool {
        true
    }
}

/// One open transport-level channel.
pub trait ChannelHandle: Send + Sync {
    /// Activate the channel at the transport level. Called again to rejoin
    /// a channel whose status is `Errored`.
    fn subscribe(&self) -> Result<(), TransportError>;

    fn status(&self) -> ChannelStatus;

    /// Publish this client's presence state.
    fn track(&self, state: PresenceState) -> Ack;

    /// Withdraw this client's presence state.
    fn untrack(&self) -> Ack;

    /// Fire-and-forget broadcast. Queued sends must survive a following
    /// [`close`](Self::close).
    fn send(&self, message: BroadcastMessage) -> Result<(), TransportError>;

    fn close(&self) -> Result<(), TransportError>;
}

/// Null-object transport used when no backend is configured.
///
/// Every channel request is refused, so the registry never stores an entry
/// and hands out no-op subscriptions.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTransport;

impl Transport for NullTransport {
    fn channel(
        &self,
        _topic: &ChannelName,
        _spec: &ChannelSpec,
        _sink: EventSink,
    ) -> Result<Arc<dyn ChannelHandle>, TransportError> {
        Err(TransportError::Unconfigured)
    }

    fn is_live(&self) -> bool {
        false
    }
}
