//! Command error types.

use crate::domain::ValidationError;

/// Errors returned synchronously from coordinator commands.
///
/// Gateway and permission failures are never returned here; they are
/// reported through the event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// The stop list was rejected before reaching the gateway
    #[error("invalid stop list: {0}")]
    Validation(#[from] ValidationError),

    /// Too many commands are already waiting
    #[error("session busy: another command is in flight")]
    SessionBusy,

    /// The coordinator task is no longer running
    #[error("coordinator is not running")]
    Closed,
}
