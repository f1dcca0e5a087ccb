//! Server configuration loaded from the environment.

use std::net::SocketAddr;

use thiserror::Error;

use crate::gateway::{GatewayConfig, RouteOptions, TravelMode};
use crate::permission::StaticPermissions;
use crate::session::CoordinatorConfig;

/// Environment variable naming the routing engine base URL.
pub const ENV_GATEWAY_URL: &str = "ROUTE_GATEWAY_URL";

/// Environment variable holding the routing engine API key.
pub const ENV_GATEWAY_API_KEY: &str = "ROUTE_GATEWAY_API_KEY";

/// Environment variable with the listen address.
pub const ENV_SERVER_ADDR: &str = "ROUTE_SERVER_ADDR";

/// Environment variable selecting the location permission mode.
pub const ENV_LOCATION_PERMISSION: &str = "ROUTE_LOCATION_PERMISSION";

/// Environment variable selecting the travel mode for every route.
pub const ENV_TRAVEL_MODE: &str = "ROUTE_TRAVEL_MODE";

/// Environment variable bounding the coordinator's command queue.
pub const ENV_COMMAND_CAPACITY: &str = "ROUTE_COMMAND_CAPACITY";

/// Errors from reading the server configuration.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid listen address {value:?}")]
    InvalidAddr { value: String },

    #[error("invalid location permission mode {value:?}")]
    InvalidPermission { value: String },

    #[error("invalid travel mode {value:?}")]
    InvalidTravelMode { value: String },

    #[error("invalid command queue capacity {value:?}")]
    InvalidCapacity { value: String },
}

fn parse_travel_mode(value: &str) -> Result<TravelMode, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "driving" => Ok(TravelMode::Driving),
        "cycling" => Ok(TravelMode::Cycling),
        "walking" => Ok(TravelMode::Walking),
        "two_wheeler" | "two-wheeler" => Ok(TravelMode::TwoWheeler),
        _ => Err(ConfigError::InvalidTravelMode {
            value: value.to_string(),
        }),
    }
}

/// How the server answers location permission questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PermissionMode {
    #[default]
    Granted,
    Denied,
    /// Not held until the coordinator asks, then granted.
    OnRequest,
}

impl PermissionMode {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "granted" => Ok(PermissionMode::Granted),
            "denied" => Ok(PermissionMode::Denied),
            "on_request" | "on-request" => Ok(PermissionMode::OnRequest),
            _ => Err(ConfigError::InvalidPermission {
                value: value.to_string(),
            }),
        }
    }

    /// Build the permission provider for this mode.
    pub fn provider(self) -> StaticPermissions {
        match self {
            PermissionMode::Granted => StaticPermissions::granted(),
            PermissionMode::Denied => StaticPermissions::denied(),
            PermissionMode::OnRequest => StaticPermissions::on_request(),
        }
    }
}

/// Configuration for the navigation server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on.
    pub addr: SocketAddr,

    /// Remote routing engine; `None` runs against the in-process mock.
    pub gateway: Option<GatewayConfig>,

    pub permission: PermissionMode,

    /// Events buffered per event stream subscriber.
    pub event_capacity: usize,

    pub coordinator: CoordinatorConfig,
}

impl ServerConfig {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, treating empty values as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut config = Self::default();

        if let Some(value) = get(ENV_SERVER_ADDR) {
            config.addr = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidAddr { value })?;
        }

        if let Some(url) = get(ENV_GATEWAY_URL) {
            let api_key = get(ENV_GATEWAY_API_KEY).unwrap_or_default();
            config.gateway = Some(GatewayConfig::new(api_key).with_base_url(url.trim()));
        }

        if let Some(value) = get(ENV_LOCATION_PERMISSION) {
            config.permission = PermissionMode::parse(&value)?;
        }

        if let Some(value) = get(ENV_TRAVEL_MODE) {
            let options = RouteOptions {
                travel_mode: parse_travel_mode(&value)?,
                ..config.coordinator.route_options
            };
            config.coordinator = config.coordinator.with_route_options(options);
        }

        if let Some(value) = get(ENV_COMMAND_CAPACITY) {
            let capacity = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidCapacity { value })?;
            config.coordinator = config.coordinator.with_command_capacity(capacity);
        }

        Ok(config)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            gateway: None,
            permission: PermissionMode::Granted,
            event_capacity: 64,
            coordinator: CoordinatorConfig::default(),
        }
    }
}
