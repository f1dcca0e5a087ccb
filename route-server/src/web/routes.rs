//! HTTP route handlers.

use std::convert::Infallible;

use axum::body::Bytes;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use futures::Stream;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::domain::{SessionId, ValidationError};
use crate::session::{CommandError, SessionSnapshot};

use super::dto::*;
use super::state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/navigation/start", post(start_navigation))
        .route("/navigation/stop", post(stop_navigation))
        .route("/navigation/end/:session_id", post(end_navigation))
        .route("/navigation/session", get(session_snapshot))
        .route("/navigation/events", get(navigation_events))
        .fallback(not_implemented)
        .with_state(state)
}

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// Start navigating through the posted stops.
async fn start_navigation(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, AppError> {
    // Parse JSON manually so we can log the body on failure
    let req: StartNavigationRequest = serde_json::from_slice(&body).map_err(|e| {
        warn!(error = %e, body = %String::from_utf8_lossy(&body), "Invalid start request");
        AppError::BadRequest {
            message: format!("Invalid JSON: {e}"),
        }
    })?;

    let session_id = state.coordinator.start(req.stops).await?;
    info!(session = %session_id, "Navigation start accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(StartNavigationResponse { session_id }),
    )
        .into_response())
}

/// Stop the current session.
async fn stop_navigation(
    State(state): State<AppState>,
) -> Result<Json<StopNavigationResponse>, AppError> {
    let stopped = state.coordinator.stop().await?;
    Ok(Json(StopNavigationResponse { stopped }))
}

/// Report that guidance for a session ended on the device.
async fn end_navigation(
    State(state): State<AppState>,
    Path(session_id): Path<u64>,
) -> Result<StatusCode, AppError> {
    state.coordinator.end_guidance(SessionId::new(session_id))?;
    Ok(StatusCode::ACCEPTED)
}

/// Current session state.
async fn session_snapshot(
    State(state): State<AppState>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(state.coordinator.snapshot().await?))
}

/// Stream session events as server-sent events.
async fn navigation_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.events.subscribe();

    let stream = futures::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let sse = Event::default()
                        .event(event.kind())
                        .json_data(&event)
                        .unwrap_or_else(|_| Event::default().comment("unserializable event"));
                    return Some((Ok(sse), rx));
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Anything not routed above.
async fn not_implemented() -> AppError {
    AppError::NotFound {
        message: "not implemented".to_string(),
    }
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    BadRequest { message: String },
    Rejected { error: ValidationError },
    Busy,
    NotFound { message: String },
    Unavailable,
}

impl From<CommandError> for AppError {
    fn from(e: CommandError) -> Self {
        match e {
            CommandError::Validation(error) => AppError::Rejected { error },
            CommandError::SessionBusy => AppError::Busy,
            CommandError::Closed => AppError::Unavailable,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, validation) = match self {
            AppError::BadRequest { message } => (StatusCode::BAD_REQUEST, message, None),
            AppError::Rejected { error } => {
                (StatusCode::UNPROCESSABLE_ENTITY, error.to_string(), Some(error))
            }
            AppError::Busy => (
                StatusCode::CONFLICT,
                CommandError::SessionBusy.to_string(),
                None,
            ),
            AppError::NotFound { message } => (StatusCode::NOT_FOUND, message, None),
            AppError::Unavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                CommandError::Closed.to_string(),
                None,
            ),
        };

        warn!(status = status.as_u16(), %message, "Request failed");

        let body = Json(ErrorResponse {
            error: message,
            validation,
        });
        (status, body).into_response()
    }
}
