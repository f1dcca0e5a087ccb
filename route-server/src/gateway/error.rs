//! Routing gateway error types.

use crate::domain::RouteStatus;

/// Wire code for an invalid or unauthorized API key.
pub const CODE_NOT_AUTHORIZED: i32 = 1;
/// Wire code for terms of service not accepted.
pub const CODE_TERMS_NOT_ACCEPTED: i32 = 2;
/// Wire code for a network failure inside the engine.
pub const CODE_NETWORK_ERROR: i32 = 3;
/// Wire code for missing location permission on the guidance device.
pub const CODE_LOCATION_PERMISSION_MISSING: i32 = 4;

/// Errors reported by a routing gateway.
///
/// Every failure a gateway can produce, from initialization or from a
/// route computation, maps to exactly one variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum GatewayError {
    /// API key invalid or not authorized
    #[error("routing API key invalid or not authorized")]
    NotAuthorized,

    /// Terms of service not accepted
    #[error("routing terms of service not accepted")]
    TermsNotAccepted,

    /// Network failure talking to or inside the engine
    #[error("network error")]
    NetworkError,

    /// The engine has no location permission
    #[error("location permission missing")]
    LocationPermissionMissing,

    /// No route connects the stops
    #[error("no route found")]
    NoRouteFound,

    /// The route computation was canceled
    #[error("route canceled")]
    RouteCanceled,

    /// Any code the gateway does not document
    #[error("unknown gateway error: {0}")]
    Unknown(i32),
}

impl GatewayError {
    /// Map an initialization error code to a gateway error.
    pub fn from_code(code: i32) -> Self {
        match code {
            CODE_NOT_AUTHORIZED => GatewayError::NotAuthorized,
            CODE_TERMS_NOT_ACCEPTED => GatewayError::TermsNotAccepted,
            CODE_NETWORK_ERROR => GatewayError::NetworkError,
            CODE_LOCATION_PERMISSION_MISSING => GatewayError::LocationPermissionMissing,
            other => GatewayError::Unknown(other),
        }
    }

    /// Map a non-`Ok` route status to a gateway error.
    ///
    /// Returns `None` for [`RouteStatus::Ok`].
    pub fn from_route_status(status: RouteStatus) -> Option<Self> {
        let err = match status {
            RouteStatus::Ok => return None,
            RouteStatus::NoRouteFound => GatewayError::NoRouteFound,
            RouteStatus::NetworkError => GatewayError::NetworkError,
            RouteStatus::Canceled => GatewayError::RouteCanceled,
            RouteStatus::Unauthorized => GatewayError::NotAuthorized,
            RouteStatus::TermsNotAccepted => GatewayError::TermsNotAccepted,
            RouteStatus::LocationPermissionMissing => GatewayError::LocationPermissionMissing,
            RouteStatus::UnknownError(code) => GatewayError::Unknown(code),
        };
        Some(err)
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::NotAuthorized => "NOT_AUTHORIZED",
            GatewayError::TermsNotAccepted => "TERMS_NOT_ACCEPTED",
            GatewayError::NetworkError => "NETWORK_ERROR",
            GatewayError::LocationPermissionMissing => "LOCATION_PERMISSION_MISSING",
            GatewayError::NoRouteFound => "NO_ROUTE_FOUND",
            GatewayError::RouteCanceled => "ROUTE_CANCELED",
            GatewayError::Unknown(_) => "UNKNOWN",
        }
    }
}

impl From<GatewayError> for RouteStatus {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NotAuthorized => RouteStatus::Unauthorized,
            GatewayError::TermsNotAccepted => RouteStatus::TermsNotAccepted,
            GatewayError::NetworkError => RouteStatus::NetworkError,
            GatewayError::LocationPermissionMissing => RouteStatus::LocationPermissionMissing,
            GatewayError::NoRouteFound => RouteStatus::NoRouteFound,
            GatewayError::RouteCanceled => RouteStatus::Canceled,
            GatewayError::Unknown(code) => RouteStatus::UnknownError(code),
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(_: reqwest::Error) -> Self {
        GatewayError::NetworkError
    }
}
