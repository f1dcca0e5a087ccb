//! Routing gateway: the boundary to the external route/guidance engine.
//!
//! The coordinator never computes routes itself. It hands a validated
//! [`StopList`] to a [`RoutingGateway`] and waits for a single
//! [`RouteStatus`] in return.
//!
//! Two implementations are provided:
//! - [`HttpGateway`] talks to a remote engine over HTTP
//! - [`MockGateway`] is scriptable and runs in-process, for development
//!   and tests

mod client;
mod error;
mod mock;
mod types;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{RouteStatus, SessionId, StopList};

pub use client::{GatewayConfig, HttpGateway};
pub use error::GatewayError;
pub use mock::{GatewayCall, InitBehaviour, MockGateway, RouteBehaviour};

/// How the route should be travelled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TravelMode {
    #[default]
    Driving,
    Cycling,
    Walking,
    TwoWheeler,
}

/// Which guidance prompts the engine should play.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AudioGuidance {
    Silent,
    AlertsOnly,
    #[default]
    VoiceAlertsAndGuidance,
}

/// Options passed along with every route request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteOptions {
    pub travel_mode: TravelMode,
    pub audio_guidance: AudioGuidance,
}

/// External route computation and guidance engine.
///
/// Implementations must tolerate `initialize` being called again after a
/// session was torn down. `stop_guidance` and `clear_destinations` are
/// best-effort and must be safe to call when nothing is active.
#[async_trait]
pub trait RoutingGateway: Send + Sync {
    /// Bring the engine to a ready state.
    async fn initialize(&self) -> Result<(), GatewayError>;

    /// Compute a route through `stops` and start guidance on success.
    ///
    /// Resolves once with the outcome. The coordinator never has two of
    /// these in flight: a superseded call's future is dropped before the
    /// next one starts, after `clear_destinations` and `stop_guidance`.
    async fn compute_and_guide(
        &self,
        session: SessionId,
        stops: &StopList,
        options: &RouteOptions,
    ) -> RouteStatus;

    /// Halt any active guidance.
    ///
    /// Must take effect before any `compute_and_guide` called after it.
    fn stop_guidance(&self);

    /// Drop any destinations left over from a previous request.
    ///
    /// Must take effect before any `compute_and_guide` called after it.
    fn clear_destinations(&self);
}
