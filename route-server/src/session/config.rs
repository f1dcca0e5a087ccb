//! Coordinator configuration.

use crate::gateway::RouteOptions;

/// Default number of commands that may wait for the coordinator.
const DEFAULT_COMMAND_CAPACITY: usize = 8;

/// Configuration for the session coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Maximum queued commands. Further `start`/`stop` calls are rejected
    /// with `SessionBusy` until the coordinator catches up.
    pub command_capacity: usize,

    /// Options sent with every route request.
    pub route_options: RouteOptions,
}

impl CoordinatorConfig {
    /// Set the command queue capacity (at least 1).
    pub fn with_command_capacity(mut self, capacity: usize) -> Self {
        self.command_capacity = capacity.max(1);
        self
    }

    /// Set the route options.
    pub fn with_route_options(mut self, options: RouteOptions) -> Self {
        self.route_options = options;
        self
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            command_capacity: DEFAULT_COMMAND_CAPACITY,
            route_options: RouteOptions::default(),
        }
    }
}
