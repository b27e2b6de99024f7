//! Channel naming, row filters and the events delivered to subscribers.
//!
//! Every logical topic maps to one canonical [`ChannelName`]:
//! ```text
//! ┌───────────────┬──────────────────────────┬──────────────────────────┐
//! │ kind          │ name                     │ transport spec           │
//! ├───────────────┼──────────────────────────┼──────────────────────────┤
//! │ Notifications │ notifications:<ownerId>  │ rows, <owner>=eq.<id>    │
//! │ ProjectTasks  │ tasks:<projectId>        │ rows, <project>=eq.<id>  │
//! │ Project       │ project:<projectId>      │ rows, id=eq.<id>         │
//! │ Presence      │ presence:<channel>       │ presence sync/join/leave │
//! │ Broadcast     │ broadcast:<channel>      │ broadcast messages       │
//! └───────────────┴──────────────────────────┴──────────────────────────┘
//! ```
//!
//! The prefix keeps presence, broadcast and row-change topics disjoint even
//! when callers reuse the same human-readable scope.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Borrow;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::TransportError;

/// Kinds of logical channel the registry multiplexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelKind {
    Notifications,
    ProjectTasks,
    Project,
    Presence,
    Broadcast,
}

impl ChannelKind {
    /// Namespace prefix used in the canonical channel name.
    pub fn prefix(&self) -> &'static str {
        match self {
            ChannelKind::Notifications => "notifications",
            ChannelKind::ProjectTasks => "tasks",
            ChannelKind::Project => "project",
            ChannelKind::Presence => "presence",
            ChannelKind::Broadcast => "broadcast",
        }
    }
}

/// Canonical key of a logical topic, e.g. `tasks:proj-9`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelName(String);

impl ChannelName {
    pub fn new(kind: ChannelKind, scope: &str) -> Self {
        Self(format!("{}:{}", kind.prefix(), scope))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ChannelName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ChannelName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Server-side equality filter for a row-change feed.
///
/// Rendered in the backend's filter syntax as `column=eq.value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowFilter {
    pub schema: String,
    pub table: String,
    pub column: String,
    pub value: String,
}

impl RowFilter {
    pub fn eq(
        schema: impl Into<String>,
        table: impl Into<String>,
        column: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            column: column.into(),
            value: value.into(),
        }
    }

    /// Filter expression in backend syntax.
    pub fn expression(&self) -> String {
        format!("{}=eq.{}", self.column, self.value)
    }

    /// Reject filters the backend would refuse to parse.
    pub fn validate(&self) -> Result<(), TransportError> {
        if self.schema.is_empty() || self.table.is_empty() || self.column.is_empty() {
            return Err(TransportError::InvalidFilter(format!(
                "incomplete target {}.{} ({})",
                self.schema, self.table, self.column
            )));
        }
        if self.value.is_empty() || self.value.contains(',') {
            return Err(TransportError::InvalidFilter(self.expression()));
        }
        Ok(())
    }

    /// Whether a row of `schema.table` passes this filter.
    ///
    /// String and non-string JSON values compare by their textual form, so a
    /// numeric id column matches a filter value of `"42"`.
    pub fn matches(&self, schema: &str, table: &str, row: &Value) -> bool {
        if schema != self.schema || table != self.table {
            return false;
        }
        match row.get(&self.column) {
            Some(Value::String(s)) => *s == self.value,
            Some(Value::Null) | None => false,
            Some(other) => other.to_string() == self.value,
        }
    }
}

/// What a transport channel listens for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelSpec {
    RowChanges(RowFilter),
    Presence,
    Broadcast,
}

/// Insert/update/delete notification for one row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RowChange {
    Insert {
        table: String,
        record: Value,
    },
    Update {
        table: String,
        record: Value,
        old_record: Value,
    },
    Delete {
        table: String,
        old_record: Value,
    },
}

impl RowChange {
    pub fn table(&self) -> &str {
        match self {
            RowChange::Insert { table, .. }
            | RowChange::Update { table, .. }
            | RowChange::Delete { table, .. } => table,
        }
    }

    /// Current row values (absent for deletes).
    pub fn record(&self) -> Option<&Value> {
        match self {
            RowChange::Insert { record, .. } | RowChange::Update { record, .. } => Some(record),
            RowChange::Delete { .. } => None,
        }
    }

    /// Previous row values (absent for inserts).
    pub fn old_record(&self) -> Option<&Value> {
        match self {
            RowChange::Update { old_record, .. } | RowChange::Delete { old_record, .. } => {
                Some(old_record)
            }
            RowChange::Insert { .. } => None,
        }
    }

    /// The row a server-side filter is evaluated against.
    pub fn filter_row(&self) -> &Value {
        match self {
            RowChange::Insert { record, .. } | RowChange::Update { record, .. } => record,
            RowChange::Delete { old_record, .. } => old_record,
        }
    }
}

/// One client's published presence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceState {
    pub owner_id: String,
    /// Arbitrary client metadata (display name, current page, device…)
    pub metadata: Value,
    /// Unix milliseconds at which the state was published
    pub online_at: u64,
}

impl PresenceState {
    pub fn new(owner_id: impl Into<String>, metadata: Value) -> Self {
        let online_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        Self {
            owner_id: owner_id.into(),
            metadata,
            online_at,
        }
    }
}

/// A presence entry keyed by the transport's presence ref.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceMember {
    pub key: String,
    pub state: PresenceState,
}

/// Presence changes on a presence channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PresenceEvent {
    /// Full member set after any change.
    Sync { members: Vec<PresenceMember> },
    /// States added under `key`.
    Join { key: String, joined: Vec<PresenceState> },
    /// States removed from `key`.
    Leave { key: String, left: Vec<PresenceState> },
}

/// Fire-and-forget message on a broadcast channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastMessage {
    pub event: String,
    pub payload: Value,
}

impl BroadcastMessage {
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }
}

/// Everything a transport can deliver on a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChannelEvent {
    RowChange(RowChange),
    Presence(PresenceEvent),
    Broadcast(BroadcastMessage),
}

/// Connection state of one transport channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelStatus {
    Joining,
    Joined,
    Leaving,
    Closed,
    Errored,
}

impl ChannelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelStatus::Joining => "joining",
            ChannelStatus::Joined => "joined",
            ChannelStatus::Leaving => "leaving",
            ChannelStatus::Closed => "closed",
            ChannelStatus::Errored => "errored",
        }
    }
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
