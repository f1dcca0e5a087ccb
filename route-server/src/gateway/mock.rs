//! Mock routing gateway for development and tests.
//!
//! Replies can be immediate or held until the caller completes them by
//! hand, which makes it possible to drive every interleaving of commands
//! and late callbacks. Every call is recorded in order.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::debug;

use crate::domain::{RouteStatus, SessionId, StopList};

use super::error::GatewayError;
use super::{RouteOptions, RoutingGateway};

/// How the mock answers `initialize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitBehaviour {
    /// Resolve at once with this result.
    Immediate(Result<(), GatewayError>),
    /// Hold until [`MockGateway::complete_init`] is called.
    Manual,
}

/// How the mock answers `compute_and_guide`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteBehaviour {
    /// Resolve at once with this status.
    Immediate(RouteStatus),
    /// Hold until [`MockGateway::complete_route`] is called.
    Manual,
}

/// A call received by the mock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayCall {
    Initialize,
    ComputeAndGuide { session: SessionId, stops: usize },
    StopGuidance,
    ClearDestinations,
}

#[derive(Debug)]
struct MockState {
    init: InitBehaviour,
    route: RouteBehaviour,
    calls: Vec<GatewayCall>,
    pending_init: Vec<oneshot::Sender<Result<(), GatewayError>>>,
    pending_routes: Vec<(SessionId, oneshot::Sender<RouteStatus>)>,
}

impl MockState {
    /// Drop held requests whose callers have gone away.
    fn prune(&mut self) {
        self.pending_init.retain(|tx| !tx.is_closed());
        self.pending_routes.retain(|(_, tx)| !tx.is_closed());
    }
}

/// In-process routing gateway with scripted replies.
#[derive(Debug)]
pub struct MockGateway {
    state: Mutex<MockState>,
}

impl MockGateway {
    /// A gateway that initializes and routes successfully at once.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                init: InitBehaviour::Immediate(Ok(())),
                route: RouteBehaviour::Immediate(RouteStatus::Ok),
                calls: Vec::new(),
                pending_init: Vec::new(),
                pending_routes: Vec::new(),
            }),
        }
    }

    pub fn with_init(self, init: InitBehaviour) -> Self {
        self.lock().init = init;
        self
    }

    pub fn with_route(self, route: RouteBehaviour) -> Self {
        self.lock().route = route;
        self
    }

    /// Change how later route requests are answered.
    pub fn set_route(&self, route: RouteBehaviour) {
        self.lock().route = route;
    }

    /// Change how later initializations are answered.
    pub fn set_init(&self, init: InitBehaviour) {
        self.lock().init = init;
    }

    /// Calls received so far, oldest first.
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.lock().calls.clone()
    }

    /// Number of held route requests whose caller is still waiting.
    ///
    /// A request dropped by its caller no longer counts.
    pub fn pending_routes(&self) -> usize {
        let mut state = self.lock();
        state.prune();
        state.pending_routes.len()
    }

    /// Number of held initializations whose caller is still waiting.
    pub fn pending_inits(&self) -> usize {
        let mut state = self.lock();
        state.prune();
        state.pending_init.len()
    }

    /// Resolve the held route request for `session`.
    ///
    /// Returns false if no request for that session is held, or its
    /// caller has gone away.
    pub fn complete_route(&self, session: SessionId, status: RouteStatus) -> bool {
        let sender = {
            let mut state = self.lock();
            state.prune();
            let Some(pos) = state.pending_routes.iter().position(|(s, _)| *s == session) else {
                return false;
            };
            state.pending_routes.remove(pos).1
        };
        sender.send(status).is_ok()
    }

    /// Resolve the oldest held initialization still being waited on.
    pub fn complete_init(&self, result: Result<(), GatewayError>) -> bool {
        let sender = {
            let mut state = self.lock();
            state.prune();
            if state.pending_init.is_empty() {
                return false;
            }
            state.pending_init.remove(0)
        };
        sender.send(result).is_ok()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RoutingGateway for MockGateway {
    async fn initialize(&self) -> Result<(), GatewayError> {
        let rx = {
            let mut state = self.lock();
            state.calls.push(GatewayCall::Initialize);
            match state.init {
                InitBehaviour::Immediate(result) => return result,
                InitBehaviour::Manual => {
                    let (tx, rx) = oneshot::channel();
                    state.pending_init.push(tx);
                    rx
                }
            }
        };

        rx.await.unwrap_or(Err(GatewayError::Unknown(0)))
    }

    async fn compute_and_guide(
        &self,
        session: SessionId,
        stops: &StopList,
        _options: &RouteOptions,
    ) -> RouteStatus {
        let rx = {
            let mut state = self.lock();
            state.calls.push(GatewayCall::ComputeAndGuide {
                session,
                stops: stops.len(),
            });
            match state.route {
                RouteBehaviour::Immediate(status) => return status,
                RouteBehaviour::Manual => {
                    let (tx, rx) = oneshot::channel();
                    state.pending_routes.push((session, tx));
                    rx
                }
            }
        };

        debug!(session = %session, "Mock route request held");
        rx.await.unwrap_or(RouteStatus::Canceled)
    }

    fn stop_guidance(&self) {
        self.lock().calls.push(GatewayCall::StopGuidance);
    }

    fn clear_destinations(&self) {
        self.lock().calls.push(GatewayCall::ClearDestinations);
    }
}
