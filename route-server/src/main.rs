use std::sync::Arc;

use route_server::config::ServerConfig;
use route_server::gateway::{HttpGateway, MockGateway, RoutingGateway};
use route_server::session::{BroadcastSink, Coordinator};
use route_server::web::{AppState, create_router};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env()?;

    // Create gateway
    let gateway: Arc<dyn RoutingGateway> = match config.gateway.clone() {
        Some(gateway_config) => {
            if gateway_config.api_key.is_empty() {
                warn!("ROUTE_GATEWAY_API_KEY not set. Gateway calls will likely be rejected.");
            }
            info!(url = %gateway_config.base_url, "Using remote routing engine");
            Arc::new(HttpGateway::new(gateway_config)?)
        }
        None => {
            warn!("ROUTE_GATEWAY_URL not set. Running against the mock routing engine.");
            Arc::new(MockGateway::new())
        }
    };

    let permissions = Arc::new(config.permission.provider());
    info!(mode = ?config.permission, "Location permission configured");

    let events = BroadcastSink::new(config.event_capacity);
    let coordinator = Coordinator::spawn(
        gateway,
        permissions,
        Arc::new(events.clone()),
        config.coordinator.clone(),
    );

    let app = create_router(AppState::new(coordinator, events));

    let addr = config.addr;
    info!(%addr, "Navigation server listening");
    info!("  GET  /health                  - Health check");
    info!("  POST /navigation/start        - Start guidance through stops");
    info!("  POST /navigation/stop         - Stop the current session");
    info!("  POST /navigation/end/:id      - Report guidance ended");
    info!("  GET  /navigation/session      - Current session snapshot");
    info!("  GET  /navigation/events       - Session event stream");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
