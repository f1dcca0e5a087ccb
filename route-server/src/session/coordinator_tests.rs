//! Unit tests for the session coordinator state machine.

use super::*;
use crate::domain::ValidationError;
use crate::gateway::{GatewayCall, InitBehaviour, MockGateway, RouteBehaviour};
use crate::permission::StaticPermissions;
use crate::session::event::ChannelSink;
use std::time::Duration;

fn raw(stops: &[(f64, f64)]) -> Vec<RawStop> {
    stops
        .iter()
        .map(|&(lat, lng)| RawStop::new(lat, lng))
        .collect()
}

fn two_stops() -> Vec<RawStop> {
    raw(&[(40.0, -73.0), (40.1, -73.1)])
}

fn id(n: u64) -> SessionId {
    SessionId::new(n)
}

struct Harness {
    coordinator: Coordinator,
    gateway: Arc<MockGateway>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
}

impl Harness {
    fn new(gateway: MockGateway) -> Self {
        Self::with_permissions(gateway, StaticPermissions::granted())
    }

    fn with_permissions(gateway: MockGateway, permissions: StaticPermissions) -> Self {
        let gateway = Arc::new(gateway);
        let (sink, events) = ChannelSink::new();
        let coordinator = Coordinator::spawn(
            gateway.clone(),
            Arc::new(permissions),
            Arc::new(sink),
            CoordinatorConfig::default(),
        );

        Self {
            coordinator,
            gateway,
            events,
        }
    }

    async fn next_event(&mut self) -> SessionEvent {
        tokio::time::timeout(Duration::from_secs(1), self.events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    /// Events already emitted, without waiting.
    fn drain_events(&mut self) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }

    async fn wait_for(&self, pred: impl Fn(&SessionSnapshot) -> bool) -> SessionSnapshot {
        for _ in 0..200 {
            let snapshot = self.coordinator.snapshot().await.unwrap();
            if pred(&snapshot) {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!(
            "condition never held; last snapshot: {:?}",
            self.coordinator.snapshot().await
        );
    }

    async fn wait_for_gateway(&self, what: &str, pred: impl Fn(&MockGateway) -> bool) {
        for _ in 0..200 {
            if pred(&self.gateway) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("gateway never reached: {what}; calls: {:?}", self.gateway.calls());
    }

    async fn wait_for_pending_routes(&self, n: usize) {
        self.wait_for_gateway("pending routes", |g| g.pending_routes() == n)
            .await;
    }

    async fn wait_for_pending_inits(&self, n: usize) {
        self.wait_for_gateway("pending inits", |g| g.pending_inits() == n)
            .await;
    }
}

fn count_calls(gateway: &MockGateway, pred: impl Fn(&GatewayCall) -> bool) -> usize {
    gateway.calls().iter().filter(|c| pred(c)).count()
}

fn route_calls(gateway: &MockGateway) -> usize {
    count_calls(gateway, |c| matches!(c, GatewayCall::ComputeAndGuide { .. }))
}

fn init_calls(gateway: &MockGateway) -> usize {
    count_calls(gateway, |c| *c == GatewayCall::Initialize)
}

#[tokio::test]
async fn start_with_ok_route_reaches_guiding() {
    let mut h = Harness::new(MockGateway::new());

    let session = h.coordinator.start(two_stops()).await.unwrap();
    assert_eq!(session, id(1));

    assert_eq!(
        h.next_event().await,
        SessionEvent::SessionStarted { session_id: id(1) }
    );
    assert_eq!(
        h.next_event().await,
        SessionEvent::GuidanceStarted { session_id: id(1) }
    );

    let snapshot = h.coordinator.snapshot().await.unwrap();
    assert_eq!(snapshot.state, SessionState::Guiding);
    assert_eq!(snapshot.session_id, Some(id(1)));
    assert_eq!(snapshot.stops.map(|s| s.len()), Some(2));
    assert!(snapshot.gateway_ready);
}

#[tokio::test]
async fn destinations_cleared_and_guidance_stopped_before_route_request() {
    let mut h = Harness::new(MockGateway::new());

    h.coordinator.start(two_stops()).await.unwrap();
    h.next_event().await;
    h.next_event().await;

    assert_eq!(
        h.gateway.calls(),
        vec![
            GatewayCall::Initialize,
            GatewayCall::ClearDestinations,
            GatewayCall::StopGuidance,
            GatewayCall::ComputeAndGuide {
                session: id(1),
                stops: 2
            },
        ]
    );
}

#[tokio::test]
async fn invalid_coordinate_rejected_without_touching_gateway() {
    let mut h = Harness::new(MockGateway::new());

    let result = h.coordinator.start(raw(&[(91.0, 0.0)])).await;
    assert_eq!(
        result,
        Err(CommandError::Validation(
            ValidationError::InvalidCoordinate { index: 0 }
        ))
    );

    assert_eq!(
        h.next_event().await,
        SessionEvent::ValidationRejected {
            reason: ValidationError::InvalidCoordinate { index: 0 }
        }
    );

    let snapshot = h.coordinator.snapshot().await.unwrap();
    assert_eq!(snapshot.state, SessionState::Idle);
    assert_eq!(snapshot.session_id, None);
    assert!(h.gateway.calls().is_empty());
    assert!(h.drain_events().is_empty());
}

#[tokio::test]
async fn empty_stop_list_rejected() {
    let mut h = Harness::new(MockGateway::new());

    let result = h.coordinator.start(vec![]).await;
    assert_eq!(
        result,
        Err(CommandError::Validation(ValidationError::EmptyStopList))
    );
    assert_eq!(
        h.next_event().await,
        SessionEvent::ValidationRejected {
            reason: ValidationError::EmptyStopList
        }
    );
}

#[tokio::test]
async fn invalid_start_leaves_guiding_session_alone() {
    let mut h = Harness::new(MockGateway::new());

    h.coordinator.start(two_stops()).await.unwrap();
    h.next_event().await;
    h.next_event().await;

    assert!(h.coordinator.start(vec![]).await.is_err());
    h.next_event().await;

    let snapshot = h.coordinator.snapshot().await.unwrap();
    assert_eq!(snapshot.state, SessionState::Guiding);
    assert_eq!(snapshot.session_id, Some(id(1)));
}

#[tokio::test]
async fn stop_before_route_result_cancels_request() {
    let mut h = Harness::new(MockGateway::new().with_route(RouteBehaviour::Manual));

    h.coordinator.start(two_stops()).await.unwrap();
    h.wait_for_pending_routes(1).await;

    assert_eq!(h.coordinator.stop().await, Ok(Some(id(1))));

    // The route request was dropped, so no late Ok can be delivered
    h.wait_for_pending_routes(0).await;
    assert!(!h.gateway.complete_route(id(1), RouteStatus::Ok));

    let snapshot = h.coordinator.snapshot().await.unwrap();
    assert_eq!(snapshot.state, SessionState::Ended);
    assert_eq!(snapshot.stale_callbacks, 0);
    assert_eq!(
        h.drain_events(),
        vec![
            SessionEvent::SessionStarted { session_id: id(1) },
            SessionEvent::GuidanceEnded { session_id: id(1) },
        ]
    );
}

#[tokio::test]
async fn start_while_guiding_ends_old_session_first() {
    let mut h = Harness::new(MockGateway::new());

    h.coordinator.start(two_stops()).await.unwrap();
    h.next_event().await;
    h.next_event().await;

    let second = h.coordinator.start(raw(&[(51.5, -0.1)])).await.unwrap();
    assert_eq!(second, id(2));

    assert_eq!(
        h.next_event().await,
        SessionEvent::GuidanceEnded { session_id: id(1) }
    );
    assert_eq!(
        h.next_event().await,
        SessionEvent::SessionStarted { session_id: id(2) }
    );
    assert_eq!(
        h.next_event().await,
        SessionEvent::GuidanceStarted { session_id: id(2) }
    );

    let snapshot = h.coordinator.snapshot().await.unwrap();
    assert_eq!(snapshot.session_id, Some(id(2)));
    assert_eq!(snapshot.state, SessionState::Guiding);
    assert_eq!(snapshot.stops.map(|s| s.len()), Some(1));
}

#[tokio::test]
async fn superseded_route_request_is_cancelled() {
    let mut h = Harness::new(MockGateway::new().with_route(RouteBehaviour::Manual));

    h.coordinator.start(two_stops()).await.unwrap();
    h.wait_for_pending_routes(1).await;
    h.coordinator.start(raw(&[(1.0, 1.0)])).await.unwrap();

    // Only the new session's request is still in flight
    h.wait_for_gateway("second route requested, first dropped", |g| {
        route_calls(g) == 2 && g.pending_routes() == 1
    })
    .await;
    assert!(!h.gateway.complete_route(id(1), RouteStatus::Ok));

    let snapshot = h.coordinator.snapshot().await.unwrap();
    assert_eq!(snapshot.session_id, Some(id(2)));
    assert_eq!(snapshot.state, SessionState::AwaitingRoute);

    assert!(h.gateway.complete_route(id(2), RouteStatus::Ok));
    let snapshot = h.wait_for(|s| s.state == SessionState::Guiding).await;
    assert_eq!(snapshot.stale_callbacks, 0);

    assert_eq!(
        h.drain_events(),
        vec![
            SessionEvent::SessionStarted { session_id: id(1) },
            SessionEvent::GuidanceEnded { session_id: id(1) },
            SessionEvent::SessionStarted { session_id: id(2) },
            SessionEvent::GuidanceStarted { session_id: id(2) },
        ]
    );
}

#[tokio::test]
async fn route_failure_is_reported_once_without_retry() {
    let mut h = Harness::new(
        MockGateway::new().with_route(RouteBehaviour::Immediate(RouteStatus::NoRouteFound)),
    );

    h.coordinator.start(two_stops()).await.unwrap();
    h.next_event().await;

    let reason = FailureReason::Gateway(GatewayError::NoRouteFound);
    assert_eq!(
        h.next_event().await,
        SessionEvent::GuidanceFailed {
            session_id: id(1),
            reason
        }
    );

    let snapshot = h.coordinator.snapshot().await.unwrap();
    assert_eq!(snapshot.state, SessionState::Failed(reason));
    assert_eq!(snapshot.last_error, Some(reason));

    assert_eq!(route_calls(&h.gateway), 1);
    assert!(h.drain_events().is_empty());
}

#[tokio::test]
async fn every_route_status_maps_to_a_failure() {
    for status in [
        RouteStatus::NetworkError,
        RouteStatus::Canceled,
        RouteStatus::Unauthorized,
        RouteStatus::TermsNotAccepted,
        RouteStatus::LocationPermissionMissing,
        RouteStatus::UnknownError(42),
    ] {
        let mut h =
            Harness::new(MockGateway::new().with_route(RouteBehaviour::Immediate(status)));

        h.coordinator.start(two_stops()).await.unwrap();
        h.next_event().await;

        match h.next_event().await {
            SessionEvent::GuidanceFailed { reason, .. } => {
                let expected = GatewayError::from_route_status(status).unwrap();
                assert_eq!(reason, FailureReason::Gateway(expected));
            }
            other => panic!("expected GuidanceFailed for {status:?}, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn init_failure_fails_session_and_reinitializes_next_time() {
    let mut h = Harness::new(
        MockGateway::new().with_init(InitBehaviour::Immediate(Err(GatewayError::NotAuthorized))),
    );

    h.coordinator.start(two_stops()).await.unwrap();
    h.next_event().await;

    let reason = FailureReason::Gateway(GatewayError::NotAuthorized);
    assert_eq!(
        h.next_event().await,
        SessionEvent::GuidanceFailed {
            session_id: id(1),
            reason
        }
    );
    let snapshot = h.coordinator.snapshot().await.unwrap();
    assert_eq!(snapshot.state, SessionState::Failed(reason));
    assert!(!snapshot.gateway_ready);

    // Gateway recovers; a fresh start initializes again
    h.gateway.set_init(InitBehaviour::Immediate(Ok(())));
    h.coordinator.start(two_stops()).await.unwrap();
    h.next_event().await;
    assert_eq!(
        h.next_event().await,
        SessionEvent::GuidanceStarted { session_id: id(2) }
    );

    assert_eq!(init_calls(&h.gateway), 2);
}

#[tokio::test]
async fn ready_gateway_is_not_initialized_again() {
    let mut h = Harness::new(MockGateway::new());

    h.coordinator.start(two_stops()).await.unwrap();
    h.next_event().await;
    h.next_event().await;
    h.coordinator.stop().await.unwrap();
    h.next_event().await;

    h.coordinator.start(two_stops()).await.unwrap();
    h.next_event().await;
    h.next_event().await;

    assert_eq!(init_calls(&h.gateway), 1);
}

#[tokio::test]
async fn superseding_during_initialization() {
    let mut h = Harness::new(MockGateway::new().with_init(InitBehaviour::Manual));

    h.coordinator.start(two_stops()).await.unwrap();
    h.wait_for_pending_inits(1).await;
    h.coordinator.start(two_stops()).await.unwrap();

    // The superseded initialization was dropped
    h.wait_for_gateway("second init requested, first dropped", |g| {
        init_calls(g) == 2 && g.pending_inits() == 1
    })
    .await;
    let snapshot = h.coordinator.snapshot().await.unwrap();
    assert_eq!(snapshot.session_id, Some(id(2)));
    assert_eq!(snapshot.state, SessionState::Initializing);

    // The only one left belongs to the new session
    assert!(h.gateway.complete_init(Ok(())));
    let snapshot = h.wait_for(|s| s.state == SessionState::Guiding).await;
    assert_eq!(snapshot.stale_callbacks, 0);

    assert_eq!(
        h.drain_events(),
        vec![
            SessionEvent::SessionStarted { session_id: id(1) },
            SessionEvent::GuidanceEnded { session_id: id(1) },
            SessionEvent::SessionStarted { session_id: id(2) },
            SessionEvent::GuidanceStarted { session_id: id(2) },
        ]
    );
}

#[tokio::test]
async fn permission_denied_fails_without_gateway() {
    let mut h = Harness::with_permissions(MockGateway::new(), StaticPermissions::denied());

    h.coordinator.start(two_stops()).await.unwrap();

    assert_eq!(
        h.next_event().await,
        SessionEvent::SessionStarted { session_id: id(1) }
    );
    assert_eq!(
        h.next_event().await,
        SessionEvent::PermissionDenied { session_id: id(1) }
    );

    let snapshot = h.coordinator.snapshot().await.unwrap();
    assert_eq!(
        snapshot.state,
        SessionState::Failed(FailureReason::PermissionDenied)
    );
    assert!(h.gateway.calls().is_empty());
}

#[tokio::test]
async fn permission_granted_on_request_continues() {
    let mut h = Harness::with_permissions(MockGateway::new(), StaticPermissions::on_request());

    h.coordinator.start(two_stops()).await.unwrap();
    h.next_event().await;
    assert_eq!(
        h.next_event().await,
        SessionEvent::GuidanceStarted { session_id: id(1) }
    );
}

#[tokio::test]
async fn external_end_finishes_guiding_session() {
    let mut h = Harness::new(MockGateway::new());

    h.coordinator.start(two_stops()).await.unwrap();
    h.next_event().await;
    h.next_event().await;

    h.coordinator.end_guidance(id(1)).unwrap();
    assert_eq!(
        h.next_event().await,
        SessionEvent::GuidanceEnded { session_id: id(1) }
    );

    let snapshot = h.coordinator.snapshot().await.unwrap();
    assert_eq!(snapshot.state, SessionState::Ended);
    assert_eq!(h.gateway.calls().last(), Some(&GatewayCall::ClearDestinations));

    // Stopping afterwards does nothing
    assert_eq!(h.coordinator.stop().await, Ok(None));
    assert!(h.drain_events().is_empty());
}

#[tokio::test]
async fn external_end_for_unknown_session_is_stale() {
    let mut h = Harness::new(MockGateway::new());

    h.coordinator.start(two_stops()).await.unwrap();
    h.next_event().await;
    h.next_event().await;

    h.coordinator.end_guidance(id(99)).unwrap();
    let snapshot = h.wait_for(|s| s.stale_callbacks == 1).await;
    assert_eq!(snapshot.state, SessionState::Guiding);
}

#[tokio::test]
async fn stop_when_idle_is_noop() {
    let mut h = Harness::new(MockGateway::new());

    assert_eq!(h.coordinator.stop().await, Ok(None));
    assert!(h.gateway.calls().is_empty());
    assert!(h.drain_events().is_empty());
}

#[tokio::test]
async fn guidance_ended_emitted_exactly_once() {
    let mut h = Harness::new(MockGateway::new());

    h.coordinator.start(two_stops()).await.unwrap();
    h.next_event().await;
    h.next_event().await;

    assert_eq!(h.coordinator.stop().await, Ok(Some(id(1))));
    assert_eq!(h.coordinator.stop().await, Ok(None));
    h.coordinator.end_guidance(id(1)).unwrap();
    h.wait_for(|s| s.stale_callbacks == 1).await;

    assert_eq!(
        h.drain_events(),
        vec![SessionEvent::GuidanceEnded { session_id: id(1) }]
    );
}

#[tokio::test]
async fn failed_session_needs_new_start() {
    let mut h = Harness::new(
        MockGateway::new().with_route(RouteBehaviour::Immediate(RouteStatus::NetworkError)),
    );

    h.coordinator.start(two_stops()).await.unwrap();
    h.next_event().await;
    h.next_event().await;

    assert_eq!(h.coordinator.stop().await, Ok(None));

    h.gateway.set_route(RouteBehaviour::Immediate(RouteStatus::Ok));
    h.coordinator.start(two_stops()).await.unwrap();
    assert_eq!(
        h.next_event().await,
        SessionEvent::SessionStarted { session_id: id(2) }
    );
    assert_eq!(
        h.next_event().await,
        SessionEvent::GuidanceStarted { session_id: id(2) }
    );
}

#[tokio::test]
async fn session_ids_increase() {
    let mut h = Harness::new(MockGateway::new());

    let a = h.coordinator.start(two_stops()).await.unwrap();
    let b = h.coordinator.start(two_stops()).await.unwrap();
    let c = h.coordinator.start(two_stops()).await.unwrap();

    assert!(a < b && b < c);
    h.drain_events();
}

#[tokio::test]
async fn full_queue_reports_busy() {
    let (commands, _command_rx) = mpsc::channel(1);
    let (callbacks, _callback_rx) = mpsc::unbounded_channel();
    let coordinator = Coordinator {
        commands,
        callbacks,
    };

    let (reply, _rx) = oneshot::channel();
    assert!(coordinator.submit(Command::Stop { reply }).is_ok());

    let (reply, _rx) = oneshot::channel();
    assert_eq!(
        coordinator.submit(Command::Stop { reply }).err(),
        Some(CommandError::SessionBusy)
    );
}

#[tokio::test]
async fn stopped_actor_reports_closed() {
    let (commands, command_rx) = mpsc::channel(1);
    let (callbacks, callback_rx) = mpsc::unbounded_channel();
    drop(command_rx);
    drop(callback_rx);

    let coordinator = Coordinator {
        commands,
        callbacks,
    };

    assert_eq!(coordinator.stop().await, Err(CommandError::Closed));
    assert_eq!(
        coordinator.start(two_stops()).await,
        Err(CommandError::Closed)
    );
    assert_eq!(
        coordinator.end_guidance(id(1)),
        Err(CommandError::Closed)
    );
}

#[tokio::test]
async fn dropping_last_handle_tears_down_active_session() {
    let mut h = Harness::new(MockGateway::new());

    h.coordinator.start(two_stops()).await.unwrap();
    h.next_event().await;
    h.next_event().await;

    let Harness {
        coordinator,
        gateway,
        mut events,
    } = h;
    drop(coordinator);

    let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap();
    assert_eq!(
        event,
        Some(SessionEvent::GuidanceEnded { session_id: id(1) })
    );
    assert_eq!(gateway.calls().last(), Some(&GatewayCall::ClearDestinations));
}

mod proptests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashMap;

    #[derive(Debug, Clone)]
    enum Op {
        StartValid,
        StartInvalid,
        Stop,
        CompleteLatest(bool),
        CompleteOldest(bool),
        EndLatest,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => Just(Op::StartValid),
            1 => Just(Op::StartInvalid),
            2 => Just(Op::Stop),
            2 => any::<bool>().prop_map(Op::CompleteLatest),
            1 => any::<bool>().prop_map(Op::CompleteOldest),
            1 => Just(Op::EndLatest),
        ]
    }

    fn route_sessions(gateway: &MockGateway) -> Vec<SessionId> {
        gateway
            .calls()
            .iter()
            .filter_map(|c| match c {
                GatewayCall::ComputeAndGuide { session, .. } => Some(*session),
                _ => None,
            })
            .collect()
    }

    async fn settle(h: &Harness) {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        let _ = h.coordinator.snapshot().await;
    }

    async fn run_ops(ops: Vec<Op>) -> Vec<SessionEvent> {
        let mut h = Harness::new(MockGateway::new().with_route(RouteBehaviour::Manual));

        for op in ops {
            match op {
                Op::StartValid => {
                    let _ = h.coordinator.start(two_stops()).await;
                }
                Op::StartInvalid => {
                    let _ = h.coordinator.start(raw(&[(0.0, 200.0)])).await;
                }
                Op::Stop => {
                    let _ = h.coordinator.stop().await;
                }
                Op::CompleteLatest(ok) | Op::CompleteOldest(ok) => {
                    let sessions = route_sessions(&h.gateway);
                    let target = if matches!(op, Op::CompleteLatest(_)) {
                        sessions.last()
                    } else {
                        sessions.first()
                    };
                    if let Some(session) = target {
                        let status = if ok {
                            RouteStatus::Ok
                        } else {
                            RouteStatus::NoRouteFound
                        };
                        h.gateway.complete_route(*session, status);
                    }
                }
                Op::EndLatest => {
                    if let Some(session) = route_sessions(&h.gateway).last() {
                        let _ = h.coordinator.end_guidance(*session);
                    }
                }
            }
            settle(&h).await;
        }

        let _ = h.coordinator.stop().await;
        settle(&h).await;
        h.drain_events()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Each session gets exactly one terminal event, and no two
        /// sessions are ever guiding at the same time
        #[test]
        fn one_terminal_event_per_session_and_no_overlap(ops in prop::collection::vec(op(), 1..25)) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let events = runtime.block_on(run_ops(ops));

            let mut terminal: HashMap<SessionId, usize> = HashMap::new();
            let mut started = Vec::new();
            let mut guiding: Option<SessionId> = None;

            for event in &events {
                match event {
                    SessionEvent::SessionStarted { session_id } => {
                        prop_assert!(guiding.is_none(), "new session while {:?} guiding", guiding);
                        started.push(*session_id);
                    }
                    SessionEvent::GuidanceStarted { session_id } => {
                        prop_assert!(guiding.is_none());
                        guiding = Some(*session_id);
                    }
                    SessionEvent::GuidanceEnded { session_id }
                    | SessionEvent::GuidanceFailed { session_id, .. }
                    | SessionEvent::PermissionDenied { session_id } => {
                        *terminal.entry(*session_id).or_default() += 1;
                        if guiding == Some(*session_id) {
                            guiding = None;
                        }
                    }
                    SessionEvent::ValidationRejected { .. } => {}
                }
            }

            for session in started {
                prop_assert_eq!(terminal.get(&session).copied(), Some(1), "session {:?}", session);
            }
        }
    }
}
