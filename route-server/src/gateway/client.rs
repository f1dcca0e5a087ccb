//! HTTP client for a remote route/guidance engine.
//!
//! Initialization and route computation are request/response calls.
//! Stopping guidance and clearing destinations return at once: the request
//! is queued and sent in the background, in call order. A route request
//! first waits until every control request queued before it has been
//! answered, so the engine never sees a clear or stop meant for an earlier
//! session after the route that follows it.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use tracing::{debug, warn};

use crate::domain::{RouteStatus, SessionId, StopList};

use super::error::GatewayError;
use super::types::{ErrorBody, InitResponse, RouteRequest, RouteResponse};
use super::{RouteOptions, RoutingGateway};

/// Default base URL for the routing engine.
const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8700";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

const PATH_INIT: &str = "/v1/navigator/init";
const PATH_ROUTES: &str = "/v1/routes";
const PATH_STOP_GUIDANCE: &str = "/v1/guidance/stop";
const PATH_CLEAR_DESTINATIONS: &str = "/v1/destinations/clear";

/// Configuration for the HTTP gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// API key sent in the `x-apikey` header
    pub api_key: String,
    /// Base URL of the engine
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl GatewayConfig {
    /// Create a new config with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Set a custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set request timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// Control requests waiting to be sent, oldest first.
#[derive(Debug, Default)]
struct ControlQueue {
    pending: Mutex<VecDeque<&'static str>>,
    /// Held while queued requests are being sent.
    sending: tokio::sync::Mutex<()>,
}

impl ControlQueue {
    fn lock(&self) -> MutexGuard<'_, VecDeque<&'static str>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Routing gateway backed by a remote engine over HTTP.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    http: reqwest::Client,
    base_url: String,
    control: Arc<ControlQueue>,
}

impl HttpGateway {
    /// Create a new gateway client with the given configuration.
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let mut headers = HeaderMap::new();

        let api_key =
            HeaderValue::from_str(&config.api_key).map_err(|_| GatewayError::NotAuthorized)?;
        headers.insert("x-apikey", api_key);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url,
            control: Arc::new(ControlQueue::default()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Turn a non-success response into a gateway error.
    async fn error_from_response(response: reqwest::Response) -> GatewayError {
        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return GatewayError::NotAuthorized;
        }

        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ErrorBody>(&body) {
            Ok(err) => GatewayError::from_code(err.code),
            Err(_) => GatewayError::Unknown(i32::from(status.as_u16())),
        }
    }

    async fn post_route(
        &self,
        session: SessionId,
        stops: &StopList,
        options: &RouteOptions,
    ) -> Result<RouteStatus, GatewayError> {
        let request = RouteRequest::new(session, stops, *options);

        let response = self
            .http
            .post(self.url(PATH_ROUTES))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let body: RouteResponse = response.json().await.map_err(|e| {
            warn!(error = %e, "Malformed route response");
            GatewayError::Unknown(0)
        })?;

        Ok(body.status)
    }

    /// Queue a body-less control POST and send it in the background.
    ///
    /// Without a runtime the request stays queued until the next route
    /// request sends it.
    fn enqueue_control(&self, path: &'static str) {
        self.control.lock().push_back(path);

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!(path, "No async runtime, gateway request left queued");
            return;
        };

        let gateway = self.clone();
        handle.spawn(async move { gateway.flush_controls().await });
    }

    /// Send every queued control request, one at a time, in order.
    async fn flush_controls(&self) {
        let _sending = self.control.sending.lock().await;

        loop {
            let next = self.control.lock().pop_front();
            let Some(path) = next else {
                break;
            };

            match self.http.post(self.url(path)).send().await {
                Ok(resp) if resp.status().is_success() => debug!(path, "Gateway request done"),
                Ok(resp) => warn!(path, status = resp.status().as_u16(), "Gateway request rejected"),
                Err(e) => warn!(path, error = %e, "Gateway request failed"),
            }
        }
    }
}

#[async_trait]
impl RoutingGateway for HttpGateway {
    async fn initialize(&self) -> Result<(), GatewayError> {
        let response = self.http.post(self.url(PATH_INIT)).send().await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let body: InitResponse = response.json().await?;
        if body.ready {
            Ok(())
        } else {
            Err(body
                .error_code
                .map(GatewayError::from_code)
                .unwrap_or(GatewayError::Unknown(0)))
        }
    }

    async fn compute_and_guide(
        &self,
        session: SessionId,
        stops: &StopList,
        options: &RouteOptions,
    ) -> RouteStatus {
        // Flushed on its own task so a dropped route request cannot lose
        // a control request it already took off the queue
        let gateway = self.clone();
        if let Err(e) = tokio::spawn(async move { gateway.flush_controls().await }).await {
            warn!(session = %session, error = %e, "Control request flush failed");
        }

        match self.post_route(session, stops, options).await {
            Ok(status) => status,
            Err(e) => {
                warn!(session = %session, error = %e, "Route request failed");
                e.into()
            }
        }
    }

    fn stop_guidance(&self) {
        self.enqueue_control(PATH_STOP_GUIDANCE);
    }

    fn clear_destinations(&self) {
        self.enqueue_control(PATH_CLEAR_DESTINATIONS);
    }
}
