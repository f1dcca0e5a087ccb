//! Data transfer objects for web requests and responses.

use serde::{Deserialize, Serialize};

use crate::domain::{RawStop, SessionId, ValidationError};

/// Request to start navigating.
#[derive(Debug, Deserialize)]
pub struct StartNavigationRequest {
    /// Stops in visiting order
    pub stops: Vec<RawStop>,
}

/// Response to an accepted start request.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct StartNavigationResponse {
    /// Id of the new session
    pub session_id: SessionId,
}

/// Response to a stop request.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct StopNavigationResponse {
    /// Id of the session that was stopped, if one was active
    pub stopped: Option<SessionId>,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,

    /// Validation details, when the stop list was rejected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationError>,
}
