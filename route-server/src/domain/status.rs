//! Route computation outcomes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Result of one route computation attempt.
///
/// Produced exactly once per `compute_and_guide` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RouteStatus {
    Ok,
    NoRouteFound,
    NetworkError,
    Canceled,
    Unauthorized,
    TermsNotAccepted,
    LocationPermissionMissing,
    UnknownError(i32),
}

impl fmt::Display for RouteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteStatus::Ok => f.write_str("ok"),
            RouteStatus::NoRouteFound => f.write_str("no route found"),
            RouteStatus::NetworkError => f.write_str("network error"),
            RouteStatus::Canceled => f.write_str("route canceled"),
            RouteStatus::Unauthorized => f.write_str("unauthorized"),
            RouteStatus::TermsNotAccepted => f.write_str("terms not accepted"),
            RouteStatus::LocationPermissionMissing => f.write_str("location permission missing"),
            RouteStatus::UnknownError(code) => write!(f, "unknown error {code}"),
        }
    }
}
