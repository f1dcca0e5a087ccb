//! Outward session events and the sinks that receive them.

use serde::Serialize;
use tokio::sync::{broadcast, mpsc};

use crate::domain::{SessionId, ValidationError};

use super::state::FailureReason;

/// A session state change reported to the UI layer.
///
/// Every `SessionStarted` is followed by exactly one of `GuidanceFailed`,
/// `GuidanceEnded` or `PermissionDenied` for the same session, possibly
/// preceded by `GuidanceStarted`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    SessionStarted {
        session_id: SessionId,
    },
    GuidanceStarted {
        session_id: SessionId,
    },
    GuidanceFailed {
        session_id: SessionId,
        reason: FailureReason,
    },
    GuidanceEnded {
        session_id: SessionId,
    },
    ValidationRejected {
        reason: ValidationError,
    },
    PermissionDenied {
        session_id: SessionId,
    },
}

impl SessionEvent {
    /// The session the event belongs to; `None` for rejected input.
    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            SessionEvent::SessionStarted { session_id }
            | SessionEvent::GuidanceStarted { session_id }
            | SessionEvent::GuidanceFailed { session_id, .. }
            | SessionEvent::GuidanceEnded { session_id }
            | SessionEvent::PermissionDenied { session_id } => Some(*session_id),
            SessionEvent::ValidationRejected { .. } => None,
        }
    }

    /// Event type name as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::SessionStarted { .. } => "SessionStarted",
            SessionEvent::GuidanceStarted { .. } => "GuidanceStarted",
            SessionEvent::GuidanceFailed { .. } => "GuidanceFailed",
            SessionEvent::GuidanceEnded { .. } => "GuidanceEnded",
            SessionEvent::ValidationRejected { .. } => "ValidationRejected",
            SessionEvent::PermissionDenied { .. } => "PermissionDenied",
        }
    }
}

/// Receiver of session events.
///
/// Called from the coordinator's task; implementations must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: SessionEvent);
}

/// Sink that fans events out to any number of subscribers.
///
/// Events emitted with no subscriber are dropped. A subscriber that falls
/// more than `capacity` events behind loses the oldest ones.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<SessionEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }
}

impl EventSink for BroadcastSink {
    fn emit(&self, event: SessionEvent) {
        // No subscribers is not an error
        let _ = self.tx.send(event);
    }
}

/// Sink that queues every event for a single consumer.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }
}
