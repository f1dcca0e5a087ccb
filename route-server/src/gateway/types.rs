//! Wire types for the remote routing engine API.

use serde::{Deserialize, Serialize};

use crate::domain::{RouteStatus, SessionId, Stop, StopList};

use super::RouteOptions;

/// Response to `POST /v1/navigator/init`.
#[derive(Debug, Clone, Deserialize)]
pub struct InitResponse {
    /// Whether the navigator is ready for route requests.
    pub ready: bool,

    /// Error code when not ready.
    #[serde(default)]
    pub error_code: Option<i32>,
}

/// A single waypoint in a route request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl From<&Stop> for Waypoint {
    fn from(stop: &Stop) -> Self {
        Self {
            latitude: stop.latitude(),
            longitude: stop.longitude(),
        }
    }
}

/// Body of `POST /v1/routes`.
#[derive(Debug, Clone, Serialize)]
pub struct RouteRequest {
    pub session_id: SessionId,
    pub waypoints: Vec<Waypoint>,
    pub options: RouteOptions,
}

impl RouteRequest {
    pub fn new(session_id: SessionId, stops: &StopList, options: RouteOptions) -> Self {
        Self {
            session_id,
            waypoints: stops.iter().map(Waypoint::from).collect(),
            options,
        }
    }
}

/// Response to `POST /v1/routes`.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteResponse {
    pub status: RouteStatus,
}

/// Error body returned by the engine on non-success responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub code: i32,

    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RawStop, validate};

    #[test]
    fn route_request_keeps_stop_order() {
        let stops = validate(&[RawStop::new(40.0, -73.0), RawStop::new(40.1, -73.1)]).unwrap();
        let req = RouteRequest::new(SessionId::new(3), &stops, RouteOptions::default());

        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["session_id"], 3);
        assert_eq!(json["waypoints"][0]["latitude"], 40.0);
        assert_eq!(json["waypoints"][1]["longitude"], -73.1);
        assert_eq!(json["options"]["travel_mode"], "DRIVING");
    }

    #[test]
    fn init_response_without_error_code() {
        let resp: InitResponse = serde_json::from_str(r#"{"ready": true}"#).unwrap();
        assert!(resp.ready);
        assert_eq!(resp.error_code, None);
    }

    #[test]
    fn route_response_parses_status() {
        let resp: RouteResponse = serde_json::from_str(r#"{"status": "CANCELED"}"#).unwrap();
        assert_eq!(resp.status, RouteStatus::Canceled);
    }

    #[test]
    fn error_body_message_optional() {
        let body: ErrorBody = serde_json::from_str(r#"{"code": 2}"#).unwrap();
        assert_eq!(body.code, 2);
        assert!(body.message.is_none());
    }
}
