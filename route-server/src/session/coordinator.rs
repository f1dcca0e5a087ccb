//! Session coordinator.
//!
//! A single task owns the guidance session. Commands from the UI and
//! callbacks from the gateway and permission provider are all applied by
//! that task, one at a time, so transitions never interleave.
//!
//! Long-running work (`initialize`, `compute_and_guide`, permission
//! requests) runs in spawned tasks that post their outcome back tagged with
//! the session id. At most one such task exists at a time, and it is
//! aborted when its session is torn down. An outcome is applied only if its
//! session is still the current one and still waiting for that outcome;
//! anything that slipped out before the abort is stale and dropped.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

use crate::domain::{RawStop, RouteStatus, SessionId, validate};
use crate::gateway::{GatewayError, RouteOptions, RoutingGateway};
use crate::permission::PermissionProvider;

use super::config::CoordinatorConfig;
use super::error::CommandError;
use super::event::{EventSink, SessionEvent};
use super::state::{FailureReason, GuidanceSession, SessionSnapshot, SessionState};

/// Commands from callers.
enum Command {
    Start {
        stops: Vec<RawStop>,
        reply: oneshot::Sender<Result<SessionId, CommandError>>,
    },
    Stop {
        reply: oneshot::Sender<Option<SessionId>>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
}

/// Outcomes of asynchronous work, tagged with the session that asked.
#[derive(Debug)]
enum Callback {
    PermissionResolved {
        session: SessionId,
        granted: bool,
    },
    GatewayInitialized {
        session: SessionId,
        result: Result<(), GatewayError>,
    },
    RouteComputed {
        session: SessionId,
        status: RouteStatus,
    },
    GuidanceFinished {
        session: SessionId,
    },
}

impl Callback {
    fn session(&self) -> SessionId {
        match self {
            Callback::PermissionResolved { session, .. }
            | Callback::GatewayInitialized { session, .. }
            | Callback::RouteComputed { session, .. }
            | Callback::GuidanceFinished { session } => *session,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Callback::PermissionResolved { .. } => "permission_resolved",
            Callback::GatewayInitialized { .. } => "gateway_initialized",
            Callback::RouteComputed { .. } => "route_computed",
            Callback::GuidanceFinished { .. } => "guidance_finished",
        }
    }
}

/// Handle to a running session coordinator.
///
/// Cheap to clone. The coordinator task stops once every handle is dropped.
#[derive(Clone)]
pub struct Coordinator {
    commands: mpsc::Sender<Command>,
    callbacks: mpsc::UnboundedSender<Callback>,
}

impl Coordinator {
    /// Spawn a coordinator task on the current tokio runtime.
    pub fn spawn(
        gateway: Arc<dyn RoutingGateway>,
        permissions: Arc<dyn PermissionProvider>,
        sink: Arc<dyn EventSink>,
        config: CoordinatorConfig,
    ) -> Self {
        let (commands, command_rx) = mpsc::channel(config.command_capacity.max(1));
        let (callbacks, callback_rx) = mpsc::unbounded_channel();

        let actor = SessionActor {
            gateway,
            permissions,
            sink,
            options: config.route_options,
            callbacks: callbacks.clone(),
            gateway_ready: false,
            next_id: SessionId::new(1),
            session: None,
            pending: None,
            stale_callbacks: 0,
        };

        tokio::spawn(actor.run(command_rx, callback_rx));

        Self {
            commands,
            callbacks,
        }
    }

    /// Start navigating through `stops`, superseding any current session.
    ///
    /// Returns the new session id once the session is created. The outcome
    /// of the route request arrives later as an event.
    pub async fn start(&self, stops: Vec<RawStop>) -> Result<SessionId, CommandError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Command::Start { stops, reply })?;
        rx.await.map_err(|_| CommandError::Closed)?
    }

    /// Stop the current session.
    ///
    /// Returns the id of the session that was stopped, or `None` if nothing
    /// was active.
    pub async fn stop(&self) -> Result<Option<SessionId>, CommandError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Command::Stop { reply })?;
        rx.await.map_err(|_| CommandError::Closed)
    }

    /// Current state of the coordinator.
    ///
    /// Waits for a queue slot rather than failing with `SessionBusy`.
    pub async fn snapshot(&self) -> Result<SessionSnapshot, CommandError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Snapshot { reply })
            .await
            .map_err(|_| CommandError::Closed)?;
        rx.await.map_err(|_| CommandError::Closed)
    }

    /// Report that guidance for `session` ended outside the coordinator's
    /// control, e.g. the final stop was reached or the host closed the
    /// guidance view.
    ///
    /// Ignored unless `session` is current and guiding.
    pub fn end_guidance(&self, session: SessionId) -> Result<(), CommandError> {
        self.callbacks
            .send(Callback::GuidanceFinished { session })
            .map_err(|_| CommandError::Closed)
    }

    fn submit(&self, command: Command) -> Result<(), CommandError> {
        self.commands.try_send(command).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => CommandError::SessionBusy,
            mpsc::error::TrySendError::Closed(_) => CommandError::Closed,
        })
    }
}

/// Spawned work the current session is waiting on.
///
/// A route request gets a fresh one each time a session enters
/// `AwaitingRoute`, and it is aborted before any other session may issue
/// a request.
#[derive(Debug)]
struct PendingWork {
    session: SessionId,
    kind: &'static str,
    started_at: Instant,
    task: AbortHandle,
}

/// The task that owns all session state.
struct SessionActor {
    gateway: Arc<dyn RoutingGateway>,
    permissions: Arc<dyn PermissionProvider>,
    sink: Arc<dyn EventSink>,
    options: RouteOptions,
    callbacks: mpsc::UnboundedSender<Callback>,
    gateway_ready: bool,
    next_id: SessionId,
    session: Option<GuidanceSession>,
    pending: Option<PendingWork>,
    stale_callbacks: u64,
}

impl SessionActor {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut callbacks: mpsc::UnboundedReceiver<Callback>,
    ) {
        debug!("Session coordinator running");

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(callback) = callbacks.recv() => self.handle_callback(callback),
            }
        }

        if self.teardown() {
            info!("Session coordinator shut down with an active session");
        }
        debug!("Session coordinator stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start { stops, reply } => {
                let _ = reply.send(self.start(stops));
            }
            Command::Stop { reply } => {
                let _ = reply.send(self.stop());
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn start(&mut self, raw: Vec<RawStop>) -> Result<SessionId, CommandError> {
        let stops = match validate(&raw) {
            Ok(stops) => stops,
            Err(e) => {
                warn!(error = %e, stops = raw.len(), "Rejected stop list");
                self.emit(SessionEvent::ValidationRejected { reason: e });
                return Err(e.into());
            }
        };

        if let Some(old) = self.current_id() {
            if self.teardown() {
                info!(session = %old, "Superseded by new start");
            }
        }

        let id = self.next_id;
        self.next_id = id.next();
        info!(
            session = %id,
            stops = stops.len(),
            destination = %stops.last(),
            "Session started"
        );

        self.session = Some(GuidanceSession::new(id, stops));
        self.emit(SessionEvent::SessionStarted { session_id: id });

        if self.permissions.has_location_permission() {
            self.begin_initialization(id);
        } else {
            self.transition(SessionState::AwaitingPermission);
            let permissions = self.permissions.clone();
            let tx = self.callbacks.clone();
            let task = tokio::spawn(async move {
                let granted = permissions.request_location_permission().await;
                let _ = tx.send(Callback::PermissionResolved {
                    session: id,
                    granted,
                });
            });
            self.track(id, "permission", task);
        }

        Ok(id)
    }

    fn stop(&mut self) -> Option<SessionId> {
        let id = self.current_id()?;
        if self.teardown() {
            info!(session = %id, "Session stopped");
            Some(id)
        } else {
            debug!(session = %id, "Stop with no active session");
            None
        }
    }

    /// Stop the current session if it is active.
    ///
    /// Halts guidance, clears destinations, moves the session to `Ended`
    /// and emits `GuidanceEnded`. Returns false if nothing was active.
    fn teardown(&mut self) -> bool {
        let Some(session) = self.session.as_ref() else {
            return false;
        };
        if !session.state.is_active() {
            return false;
        }
        let id = session.id;

        self.cancel_pending();
        self.gateway.stop_guidance();
        self.gateway.clear_destinations();

        self.transition(SessionState::Ended);
        self.emit(SessionEvent::GuidanceEnded { session_id: id });
        true
    }

    fn begin_initialization(&mut self, id: SessionId) {
        if self.gateway_ready {
            self.request_route(id);
            return;
        }

        self.transition(SessionState::Initializing);
        let gateway = self.gateway.clone();
        let tx = self.callbacks.clone();
        let task = tokio::spawn(async move {
            let result = gateway.initialize().await;
            let _ = tx.send(Callback::GatewayInitialized {
                session: id,
                result,
            });
        });
        self.track(id, "initialize", task);
    }

    fn request_route(&mut self, id: SessionId) {
        let Some(stops) = self.session.as_ref().map(|s| s.stops.clone()) else {
            return;
        };

        self.transition(SessionState::AwaitingRoute);

        // Nothing from an earlier request may leak into this one
        self.gateway.clear_destinations();
        self.gateway.stop_guidance();

        let gateway = self.gateway.clone();
        let options = self.options;
        let tx = self.callbacks.clone();
        let task = tokio::spawn(async move {
            let status = gateway.compute_and_guide(id, &stops, &options).await;
            let _ = tx.send(Callback::RouteComputed {
                session: id,
                status,
            });
        });
        self.track(id, "compute_and_guide", task);
    }

    fn track(&mut self, session: SessionId, kind: &'static str, task: JoinHandle<()>) {
        self.cancel_pending();
        self.pending = Some(PendingWork {
            session,
            kind,
            started_at: Instant::now(),
            task: task.abort_handle(),
        });
    }

    /// Forget the pending work once its outcome has been applied.
    fn finish_pending(&mut self) {
        if let Some(work) = self.pending.take() {
            debug!(
                session = %work.session,
                work = work.kind,
                elapsed = ?work.started_at.elapsed(),
                "Pending work finished"
            );
        }
    }

    /// Abort the pending work, if any.
    fn cancel_pending(&mut self) {
        if let Some(work) = self.pending.take() {
            work.task.abort();
            debug!(
                session = %work.session,
                work = work.kind,
                elapsed = ?work.started_at.elapsed(),
                "Pending work aborted"
            );
        }
    }

    fn handle_callback(&mut self, callback: Callback) {
        let state = match self.session.as_ref() {
            Some(s) if s.id == callback.session() => s.state,
            _ => {
                self.discard(&callback);
                return;
            }
        };

        match (callback, state) {
            (
                Callback::PermissionResolved { session, granted },
                SessionState::AwaitingPermission,
            ) => {
                self.finish_pending();
                if granted {
                    debug!(session = %session, "Location permission granted");
                    self.begin_initialization(session);
                } else {
                    warn!(session = %session, "Location permission denied");
                    self.fail(FailureReason::PermissionDenied);
                    self.emit(SessionEvent::PermissionDenied {
                        session_id: session,
                    });
                }
            }
            (Callback::GatewayInitialized { session, result }, SessionState::Initializing) => {
                self.finish_pending();
                match result {
                    Ok(()) => {
                        info!(session = %session, "Gateway ready");
                        self.gateway_ready = true;
                        self.request_route(session);
                    }
                    Err(e) => {
                        warn!(session = %session, error = %e, "Gateway initialization failed");
                        self.gateway_ready = false;
                        self.fail_guidance(session, e.into());
                    }
                }
            }
            (Callback::RouteComputed { session, status }, SessionState::AwaitingRoute) => {
                self.finish_pending();
                match GatewayError::from_route_status(status) {
                    None => {
                        self.transition(SessionState::Guiding);
                        self.emit(SessionEvent::GuidanceStarted {
                            session_id: session,
                        });
                    }
                    Some(e) => {
                        warn!(session = %session, status = %status, "Route request failed");
                        self.fail_guidance(session, e.into());
                    }
                }
            }
            (Callback::GuidanceFinished { session }, SessionState::Guiding) => {
                info!(session = %session, "Guidance finished");
                self.teardown();
            }
            (callback, _) => self.discard(&callback),
        }
    }

    fn fail_guidance(&mut self, session: SessionId, reason: FailureReason) {
        self.fail(reason);
        self.emit(SessionEvent::GuidanceFailed {
            session_id: session,
            reason,
        });
    }

    fn fail(&mut self, reason: FailureReason) {
        self.cancel_pending();
        if let Some(session) = self.session.as_mut() {
            session.last_error = Some(reason);
        }
        self.transition(SessionState::Failed(reason));
    }

    fn emit(&self, event: SessionEvent) {
        debug!(event = event.kind(), session = ?event.session_id(), "Session event");
        self.sink.emit(event);
    }

    fn discard(&mut self, callback: &Callback) {
        self.stale_callbacks += 1;
        debug!(
            session = %callback.session(),
            current = ?self.current_id(),
            callback = callback.name(),
            "Discarded stale callback"
        );
    }

    fn transition(&mut self, to: SessionState) {
        if let Some(session) = self.session.as_mut() {
            debug!(
                session = %session.id,
                from = session.state.name(),
                to = to.name(),
                "Session transition"
            );
            session.state = to;
        }
    }

    fn current_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(|s| s.id)
    }

    fn snapshot(&self) -> SessionSnapshot {
        let session = self.session.as_ref();
        SessionSnapshot {
            session_id: session.map(|s| s.id),
            state: session.map_or(SessionState::Idle, |s| s.state),
            stops: session.map(|s| (*s.stops).clone()),
            last_error: session.and_then(|s| s.last_error),
            started_at: session.map(|s| s.started_at),
            gateway_ready: self.gateway_ready,
            stale_callbacks: self.stale_callbacks,
        }
    }
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
