//! # sitehub-realtime — Real-time subscription layer for SiteHub
//!
//! Multiplexes row-change feeds, presence and broadcast listeners onto the
//! smallest number of live transport channels.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  subscribe_*   ┌─────────────────┐  channel()   ┌─────────────┐
//! │ UI consumers │ ─────────────► │ ChannelRegistry │ ───────────► │ Transport   │
//! │ (N per topic)│ ◄───────────── │ (1 per topic)   │ ◄─────────── │ (backend)   │
//! └──────────────┘   callbacks    └─────────────────┘  EventSink   └─────────────┘
//!                                         │
//!                                         ▼
//!                              name → { handle, listeners, tracked }
//! ```
//!
//! ## Modules
//!
//! - [`registry`] — `ChannelRegistry`, subscription tokens, presence acks
//! - [`protocol`] — channel names, row filters, event types
//! - [`transport`] — backend contract and the null transport
//! - [`memory`] — in-process hub implementing the transport contract
//! - [`config`] — endpoint, credentials and table configuration
//! - [`error`] — transport and realtime errors
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use serde_json::json;
//! use sitehub_realtime::{ChannelRegistry, MemoryHub, RealtimeConfig, RowChange};
//!
//! let hub = MemoryHub::new();
//! let config = RealtimeConfig::new("mem://local", "anon");
//! let registry = ChannelRegistry::new(config, Arc::new(hub.connect()));
//!
//! let sub = registry.subscribe_to_project_tasks("proj-9", |change| {
//!     println!("task {} changed", change.table());
//! });
//!
//! hub.emit_row_change("public", RowChange::Insert {
//!     table: "tasks".into(),
//!     record: json!({"id": 7, "project_id": "proj-9"}),
//! });
//!
//! sub.unsubscribe();
//! assert!(registry.channel_names().is_empty());
//! ```

pub mod config;
pub mod error;
pub mod memory;
pub mod protocol;
pub mod registry;
pub mod transport;

// Re-exports for convenience
pub use config::{RealtimeConfig, TableConfig};
pub use error::{RealtimeError, TransportError};
pub use memory::{HubStats, MemoryChannel, MemoryHub, MemoryTransport};
pub use protocol::{
    BroadcastMessage, ChannelEvent, ChannelKind, ChannelName, ChannelSpec, ChannelStatus,
    PresenceEvent, PresenceMember, PresenceState, RowChange, RowFilter,
};
pub use registry::{ChannelRegistry, PresenceAck, RegistryStats, Subscription, SubscriptionGuard};
pub use transport::{Ack, ChannelHandle, EventSink, NullTransport, Transport};
