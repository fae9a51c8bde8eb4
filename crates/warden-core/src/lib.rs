//! # Warden Core
//!
//! Secure report ingestion and module version reconciliation for a fleet
//! monitoring server. Remote sites push encrypted status reports; the core
//! authenticates them, merges them into a cross-site module registry and
//! classifies every installed module as current, outdated or
//! security-critical.
//!
//! ## Threat Coverage
//!
//! | Layer | Component | Threats Blocked |
//! |-------|-----------|-----------------|
//! | Transport | Payload codec | Forged or tampered reports |
//! | Freshness | Authenticator | Replay of captured reports |
//! | Identity | Authenticator | Unregistered senders, site impersonation |
//! | Oracle | HTTP boundary | Learning which gate failed |
//! | Consistency | Registry transactions | Lost updates between concurrent cycles |
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          WARDEN CORE                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │   encrypted body                                                │
//! │        │                                                        │
//! │        ▼                                                        │
//! │  ┌─────────────┐   (Site, Report)   ┌──────────────────────┐    │
//! │  │Authenticator│──────────────────▶ │     Reconciler       │    │
//! │  │ 5 gates     │                    │ merge → classify →   │    │
//! │  └──────┬──────┘                    │ persist → notify     │    │
//! │         │ find_by_url               └───┬──────────┬───────┘    │
//! │         ▼                               ▼          ▼            │
//! │  ┌──────────────────────────────────────────┐  ┌──────────┐     │
//! │  │ Stores (deadline-bounded registry calls) │  │ Notifier │     │
//! │  └──────────────────────────────────────────┘  └──────────┘     │
//! │                                                                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use warden_core::{Warden, WardenConfig};
//!
//! let warden = Warden::open(WardenConfig::default())?;
//!
//! // Inbound report: success or one generic rejection.
//! match warden.ingest(&body, chrono::Utc::now()).await {
//!     Ok(_) => respond(200, "OK"),
//!     Err(_) => respond(400, "Bad Request"),
//! }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod notify;
pub mod reconcile;
pub mod refresh;
pub mod registration;
pub mod report;
pub mod store;
pub mod transport;
pub mod view;
pub mod warden;

#[cfg(test)]
mod tests;

pub use auth::Authenticator;
pub use config::WardenConfig;
pub use error::{
    AuthError, CoreError, IngestError, NotifyError, RegistrationError, StoreError, TransportError,
};
pub use notify::{BroadcastNotifier, DashboardUpdate, Notifier};
pub use reconcile::{CyclePhase, IngestOutcome, Reconciler, Releases, SiteSettings};
pub use refresh::{RefreshFailure, RefreshSummary};
pub use registration::{Registrar, RegistrationToken};
pub use report::Report;
pub use store::Stores;
pub use transport::{HttpTransport, ReportTransport};
pub use view::{SiteDetail, SiteSummary};
pub use warden::Warden;

/// Result type for administrative operations.
pub type Result<T> = std::result::Result<T, CoreError>;
