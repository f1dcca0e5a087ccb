//! Guidance session coordination.
//!
//! The [`Coordinator`] owns the lifecycle of one guidance session at a time:
//!
//! ```text
//! Idle ─start─▶ [AwaitingPermission] ─▶ [Initializing] ─▶ AwaitingRoute ─Ok─▶ Guiding
//!                       │                     │                 │                │
//!                    denied                 error          other status    stop / end
//!                       ▼                     ▼                 ▼                ▼
//!                    Failed ◀─────────────────┴─────────────────┘              Ended
//! ```
//!
//! A new `start` from any state ends the current session first. Outcomes
//! are reported to an [`EventSink`] rather than returned to the caller.

mod config;
mod coordinator;
mod error;
mod event;
mod state;

pub use config::CoordinatorConfig;
pub use coordinator::Coordinator;
pub use error::CommandError;
pub use event::{BroadcastSink, ChannelSink, EventSink, SessionEvent};
pub use state::{FailureReason, SessionSnapshot, SessionState};
