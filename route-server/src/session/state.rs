//! Session states and failure reasons.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::domain::{SessionId, StopList};
use crate::gateway::GatewayError;

/// Why a session ended in [`SessionState::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// The gateway failed to initialize or to compute a route.
    Gateway(GatewayError),
    /// Location permission was denied.
    PermissionDenied,
}

impl FailureReason {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            FailureReason::Gateway(e) => e.code(),
            FailureReason::PermissionDenied => "PERMISSION_DENIED",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Gateway(e) => write!(f, "{e}"),
            FailureReason::PermissionDenied => f.write_str("location permission denied"),
        }
    }
}

impl From<GatewayError> for FailureReason {
    fn from(err: GatewayError) -> Self {
        FailureReason::Gateway(err)
    }
}

impl Serialize for FailureReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let unknown_code = match self {
            FailureReason::Gateway(GatewayError::Unknown(code)) => Some(*code),
            _ => None,
        };

        let mut s = serializer.serialize_struct("FailureReason", 3)?;
        s.serialize_field("code", self.code())?;
        s.serialize_field("message", &self.to_string())?;
        s.serialize_field("gateway_code", &unknown_code)?;
        s.end()
    }
}

/// Lifecycle state of a guidance session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum SessionState {
    /// No session has been started.
    Idle,
    /// Waiting for the platform to answer a location permission request.
    AwaitingPermission,
    /// Waiting for the gateway to become ready.
    Initializing,
    /// Route requested, waiting for its status.
    AwaitingRoute,
    /// Route computed and guidance running.
    Guiding,
    /// Stopped by the caller or ended by the guidance engine.
    Ended,
    /// Failed; a new start is required.
    Failed(FailureReason),
}

impl SessionState {
    /// Whether the session still owns gateway resources.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SessionState::AwaitingPermission
                | SessionState::Initializing
                | SessionState::AwaitingRoute
                | SessionState::Guiding
        )
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::AwaitingPermission => "awaiting_permission",
            SessionState::Initializing => "initializing",
            SessionState::AwaitingRoute => "awaiting_route",
            SessionState::Guiding => "guiding",
            SessionState::Ended => "ended",
            SessionState::Failed(_) => "failed",
        }
    }
}

/// One navigation attempt, owned by the coordinator.
#[derive(Debug, Clone)]
pub(crate) struct GuidanceSession {
    pub id: SessionId,
    pub state: SessionState,
    pub stops: Arc<StopList>,
    pub last_error: Option<FailureReason>,
    pub started_at: DateTime<Utc>,
}

impl GuidanceSession {
    pub fn new(id: SessionId, stops: StopList) -> Self {
        Self {
            id,
            state: SessionState::Idle,
            stops: Arc::new(stops),
            last_error: None,
            started_at: Utc::now(),
        }
    }
}

/// Point-in-time view of the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    /// Current or most recent session, if any.
    pub session_id: Option<SessionId>,

    #[serde(flatten)]
    pub state: SessionState,

    /// Stops of the current or most recent session.
    pub stops: Option<StopList>,

    pub last_error: Option<FailureReason>,

    pub started_at: Option<DateTime<Utc>>,

    /// Whether the gateway has reported ready.
    pub gateway_ready: bool,

    /// Callbacks discarded because their session was superseded or finished.
    pub stale_callbacks: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_pending_and_guiding_states_are_active() {
        let active = [
            SessionState::AwaitingPermission,
            SessionState::Initializing,
            SessionState::AwaitingRoute,
            SessionState::Guiding,
        ];
        let inactive = [
            SessionState::Idle,
            SessionState::Ended,
            SessionState::Failed(FailureReason::PermissionDenied),
        ];

        for state in active {
            assert!(state.is_active(), "{state:?}");
        }
        for state in inactive {
            assert!(!state.is_active(), "{state:?}");
        }
    }

    #[test]
    fn reason_codes() {
        assert_eq!(FailureReason::PermissionDenied.code(), "PERMISSION_DENIED");
        assert_eq!(
            FailureReason::Gateway(GatewayError::NoRouteFound).code(),
            "NO_ROUTE_FOUND"
        );
    }

    #[test]
    fn state_serialization() {
        let json = serde_json::to_value(SessionState::Guiding).unwrap();
        assert_eq!(json["state"], "guiding");

        let json = serde_json::to_value(SessionState::Failed(FailureReason::Gateway(
            GatewayError::Unknown(17),
        )))
        .unwrap();
        assert_eq!(json["state"], "failed");
        assert_eq!(json["reason"]["code"], "UNKNOWN");
        assert_eq!(json["reason"]["gateway_code"], 17);
        assert_eq!(json["reason"]["message"], "unknown gateway error: 17");
    }

    #[test]
    fn snapshot_flattens_state() {
        let snapshot = SessionSnapshot {
            session_id: Some(SessionId::new(2)),
            state: SessionState::AwaitingRoute,
            stops: None,
            last_error: None,
            started_at: None,
            gateway_ready: true,
            stale_callbacks: 0,
        };

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["session_id"], 2);
        assert_eq!(json["state"], "awaiting_route");
        assert_eq!(json["gateway_ready"], true);
    }
}
