//! Application state for the web layer.

use crate::session::{BroadcastSink, Coordinator};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Handle to the session coordinator
    pub coordinator: Coordinator,

    /// Event fan-out feeding the server-sent event stream
    pub events: BroadcastSink,
}

impl AppState {
    /// Create a new app state.
    pub fn new(coordinator: Coordinator, events: BroadcastSink) -> Self {
        Self {
            coordinator,
            events,
        }
    }
}
