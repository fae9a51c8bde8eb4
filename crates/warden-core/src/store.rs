//! Bounded access to the registries from async code.
//!
//! Registry implementations are synchronous. Each call runs on tokio's
//! blocking pool under a deadline, so a stalled store surfaces as
//! [`StoreError::Timeout`] instead of hanging the request. A timed-out call
//! is abandoned, not cancelled; its write may still land, and the next
//! cycle for that site re-drives the full state.

use crate::error::StoreError;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;
use warden_registry::{ModuleRegistry, SiteRegistry};

/// Shared handles to both registries plus the per-call deadline.
#[derive(Clone)]
pub struct Stores {
    sites: Arc<dyn SiteRegistry>,
    modules: Arc<dyn ModuleRegistry>,
    timeout: Duration,
}

impl Stores {
    /// Wraps the registries with a per-call deadline.
    pub fn new(
        sites: Arc<dyn SiteRegistry>,
        modules: Arc<dyn ModuleRegistry>,
        timeout: Duration,
    ) -> Self {
        Self {
            sites,
            modules,
            timeout,
        }
    }

    /// Uses one object for both registries.
    pub fn shared<R>(registry: Arc<R>, timeout: Duration) -> Self
    where
        R: SiteRegistry + ModuleRegistry + 'static,
    {
        let sites: Arc<dyn SiteRegistry> = registry.clone();
        let modules: Arc<dyn ModuleRegistry> = registry;
        Self::new(sites, modules, timeout)
    }

    /// The per-call deadline.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs `f` against the site registry.
    pub async fn sites<T, F>(&self, operation: &'static str, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&dyn SiteRegistry) -> warden_registry::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sites = Arc::clone(&self.sites);
        self.run(operation, move || f(sites.as_ref())).await
    }

    /// Runs `f` against the module registry.
    pub async fn modules<T, F>(&self, operation: &'static str, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&dyn ModuleRegistry) -> warden_registry::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let modules = Arc::clone(&self.modules);
        self.run(operation, move || f(modules.as_ref())).await
    }

    /// Runs `f` against both registries in one blocking call.
    pub async fn both<T, F>(&self, operation: &'static str, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&dyn SiteRegistry, &dyn ModuleRegistry) -> warden_registry::Result<T>
            + Send
            + 'static,
        T: Send + 'static,
    {
        let sites = Arc::clone(&self.sites);
        let modules = Arc::clone(&self.modules);
        self.run(operation, move || f(sites.as_ref(), modules.as_ref()))
            .await
    }

    async fn run<T, F>(&self, operation: &'static str, f: F) -> Result<T, StoreError>
    where
        F: FnOnce() -> warden_registry::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        match tokio::time::timeout(self.timeout, tokio::task::spawn_blocking(f)).await {
            Ok(Ok(result)) => result.map_err(|e| {
                error!(operation, error = %e, "Registry call failed");
                StoreError::Registry(e)
            }),
            Ok(Err(join)) => {
                error!(operation, error = %join, "Registry worker failed");
                Err(StoreError::Worker(join.to_string()))
            }
            Err(_) => {
                error!(operation, timeout_ms = self.timeout.as_millis() as u64, "Registry call timed out");
                Err(StoreError::Timeout { operation })
            }
        }
    }
}

impl std::fmt::Debug for Stores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stores")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
