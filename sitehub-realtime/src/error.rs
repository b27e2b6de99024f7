//! Error types for the realtime layer.
//!
//! Nothing here is ever raised to UI code at call time. Transport errors are
//! logged and counted inside the registry; presence acks carry a
//! [`RealtimeError`] that callers are free to ignore.

use thiserror::Error;

/// Errors reported by a [`Transport`](crate::transport::Transport) or one of
/// its channel handles.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Realtime transport is not configured")]
    Unconfigured,

    #[error("Channel '{topic}' rejected: {reason}")]
    Rejected { topic: String, reason: String },

    #[error("Channel '{0}' is closed")]
    Closed(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Close failed for '{0}'")]
    CloseFailed(String),
}

/// Outcome errors surfaced through presence acks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RealtimeError {
    /// The registry is backed by the null transport.
    #[error("Realtime is unavailable")]
    Unavailable,

    /// `untrack_presence` was called for a channel this client never tracked.
    #[error("Presence is not tracked on '{0}'")]
    NotTracked(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The transport dropped the acknowledgement without answering.
    #[error("Acknowledgement dropped")]
    Dropped,
}
