//! Web layer for the navigation server.
//!
//! Provides HTTP endpoints for starting and stopping guidance, reading the
//! current session and streaming session events.

mod dto;
mod routes;
mod state;

pub use dto::*;
pub use routes::{AppError, create_router};
pub use state::AppState;
