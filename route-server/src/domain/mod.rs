//! Domain types for the navigation session coordinator.
//!
//! All types enforce their invariants at construction time, so code that
//! receives a [`StopList`] can trust every coordinate in it.

mod session_id;
mod status;
mod stop;

pub use session_id::SessionId;
pub use status::RouteStatus;
pub use stop::{RawStop, Stop, StopList, ValidationError, validate};
