//! The Warden server facade.
//!
//! [`Warden`] wires the key pair, registries, authenticator, orchestrator
//! and registrar together from one [`WardenConfig`]. The HTTP layer and the
//! CLI talk only to this type.

use crate::auth::Authenticator;
use crate::config::WardenConfig;
use crate::error::{CoreError, IngestError, RegistrationError};
use crate::notify::{BroadcastNotifier, DashboardUpdate};
use crate::reconcile::{IngestOutcome, Reconciler};
use crate::registration::Registrar;
use crate::store::Stores;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;
use warden_codec::{KeyPair, PayloadCodec};
use warden_registry::{ModuleRegistry, Site, SiteRegistry, SledRegistry};

/// The assembled monitoring server.
///
/// Cheap to clone; clones share registries, keys and the update channel.
///
/// # Example
///
/// ```rust,no_run
/// use warden_core::{Warden, WardenConfig};
///
/// # async fn run() -> Result<(), warden_core::CoreError> {
/// let warden = Warden::open(WardenConfig::default())?;
/// println!("public key: {}", warden.public_key_base64());
///
/// let body = b"...encrypted report...";
/// match warden.ingest(body, chrono::Utc::now()).await {
///     Ok(outcome) => println!("{} modules", outcome.modules),
///     Err(_) => println!("Bad Request"),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Warden {
    config: WardenConfig,
    codec: Arc<PayloadCodec>,
    reconciler: Reconciler,
    registrar: Registrar,
    notifier: Arc<BroadcastNotifier>,
}

impl Warden {
    /// Opens the key file and sled database named in `config`, creating
    /// either if missing.
    pub fn open(config: WardenConfig) -> Result<Self, CoreError> {
        let (keys, created) = KeyPair::load_or_generate(&config.keys.secret_key_path)?;
        if created {
            info!(path = %config.keys.secret_key_path.display(), "Generated server key pair");
        }
        let registry = Arc::new(SledRegistry::open(&config.storage.db_path)?);
        info!(path = %config.storage.db_path.display(), "Registry opened");
        Ok(Self::with_registry(config, PayloadCodec::new(keys), registry))
    }

    /// Assembles a server over an existing codec and registry.
    pub fn with_registry<R>(config: WardenConfig, codec: PayloadCodec, registry: Arc<R>) -> Self
    where
        R: SiteRegistry + ModuleRegistry + 'static,
    {
        let codec = Arc::new(codec);
        let stores = Stores::shared(registry, config.ingest.store_timeout());
        let notifier = Arc::new(BroadcastNotifier::default());
        let auth = Authenticator::new(codec.clone(), config.ingest.freshness_window_secs);
        let reconciler = Reconciler::new(
            auth,
            stores.clone(),
            notifier.clone(),
            config.ingest.notify_timeout(),
        );
        let registrar = Registrar::new(codec.clone(), stores);

        Self {
            config,
            codec,
            reconciler,
            registrar,
            notifier,
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &WardenConfig {
        &self.config
    }

    /// The payload codec holding the server key pair.
    pub fn codec(&self) -> &PayloadCodec {
        &self.codec
    }

    /// Server public key for the bootstrap endpoint.
    pub fn public_key_base64(&self) -> String {
        self.codec.public_key_base64()
    }

    /// The ingestion orchestrator.
    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// The registration handler.
    pub fn registrar(&self) -> &Registrar {
        &self.registrar
    }

    /// Subscribes to dashboard updates.
    pub fn subscribe(&self) -> broadcast::Receiver<DashboardUpdate> {
        self.notifier.subscribe()
    }

    /// Runs one ingestion cycle.
    pub async fn ingest(&self, body: &[u8], now: DateTime<Utc>) -> Result<IngestOutcome, IngestError> {
        self.reconciler.ingest(body, now).await
    }

    /// Registers a site from a sealed token.
    pub async fn register(&self, sealed: &[u8]) -> Result<Site, RegistrationError> {
        self.registrar.register(sealed).await
    }
}

impl std::fmt::Debug for Warden {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Warden")
            .field("config", &self.config)
            .field("reconciler", &self.reconciler)
            .finish_non_exhaustive()
    }
}
