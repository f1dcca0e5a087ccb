//! Location permission provider.
//!
//! The host platform owns the actual permission prompt. The coordinator
//! only asks whether permission is held and, if not, requests it and waits
//! for the answer.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

/// Source of location permission.
#[async_trait]
pub trait PermissionProvider: Send + Sync {
    /// Whether location permission is currently granted.
    fn has_location_permission(&self) -> bool;

    /// Ask for location permission. Resolves to true if granted.
    async fn request_location_permission(&self) -> bool;
}

/// Permission provider with a fixed answer.
///
/// Used by hosts that settle permission before the coordinator runs, such
/// as a server process configured from its environment. A request grants
/// permission only if `grant_on_request` is set.
#[derive(Debug)]
pub struct StaticPermissions {
    granted: AtomicBool,
    grant_on_request: bool,
}

impl StaticPermissions {
    /// Permission already granted.
    pub fn granted() -> Self {
        Self {
            granted: AtomicBool::new(true),
            grant_on_request: true,
        }
    }

    /// Permission not held and every request denied.
    pub fn denied() -> Self {
        Self {
            granted: AtomicBool::new(false),
            grant_on_request: false,
        }
    }

    /// Permission not held, but granted when requested.
    pub fn on_request() -> Self {
        Self {
            granted: AtomicBool::new(false),
            grant_on_request: true,
        }
    }
}

#[async_trait]
impl PermissionProvider for StaticPermissions {
    fn has_location_permission(&self) -> bool {
        self.granted.load(Ordering::SeqCst)
    }

    async fn request_location_permission(&self) -> bool {
        if self.grant_on_request {
            self.granted.store(true, Ordering::SeqCst);
        }
        self.has_location_permission()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn granted_stays_granted() {
        let p = StaticPermissions::granted();
        assert!(p.has_location_permission());
        assert!(p.request_location_permission().await);
    }

    #[tokio::test]
    async fn denied_never_grants() {
        let p = StaticPermissions::denied();
        assert!(!p.has_location_permission());
        assert!(!p.request_location_permission().await);
        assert!(!p.has_location_permission());
    }

    #[tokio::test]
    async fn on_request_grants_after_asking() {
        let p = StaticPermissions::on_request();
        assert!(!p.has_location_permission());
        assert!(p.request_location_permission().await);
        assert!(p.has_location_permission());
    }
}
