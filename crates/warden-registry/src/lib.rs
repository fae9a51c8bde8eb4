//! # Warden Registry - Site and Module Document Store
//!
//! Persistent registries for the monitoring server: one document per
//! monitored site and one per software module, cross-referenced by site
//! id. Backed by sled with transactional writes so concurrent report
//! ingestion never loses updates to a shared module document.
//!
//! ## Purpose
//!
//! 1. **Site registry** - sites keyed by id with a unique URL index,
//!    holding core version, installed modules, libraries and issues.
//! 2. **Module registry** - upstream releases per branch plus the list of
//!    sites running each module.
//! 3. **Derived state** - helpers for pending updates, staleness and core
//!    version status computed from stored documents.
//!
//! ## Threat Model
//!
//! | Threat | Description | Defense |
//! |--------|-------------|---------|
//! | Lost update | Two cycles rewrite the same module | sled transactions |
//! | URL hijack | Second registration claims a monitored URL | Unique URL index |
//! | Token disclosure | Shared secret leaks through logs | Redacted `Debug` |
//! | Timing oracle | Token compared byte by byte | `subtle` constant-time eq |
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                      SledRegistry                          │
//! │  ┌────────────────────┐        ┌────────────────────────┐  │
//! │  │   SiteRegistry     │        │    ModuleRegistry      │  │
//! │  │ find_by_url / id   │        │ find_by_project_name   │  │
//! │  │ upsert / delete    │        │ upsert_releases/usage  │  │
//! │  └─────────┬──────────┘        └───────────┬────────────┘  │
//! │            ▼                               ▼               │
//! │  ┌──────────────────────────────────────────────────────┐  │
//! │  │ Storage: sites │ site_urls │ modules  (sled trees)   │  │
//! │  └──────────────────────────────────────────────────────┘  │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use warden_registry::{ModuleRegistry, Site, SiteRegistry, SiteUsage, SledRegistry};
//!
//! let registry = SledRegistry::temporary().unwrap();
//! let site = Site::new("https://example.org", "shared-token", None);
//! SiteRegistry::upsert(&registry, &site).unwrap();
//!
//! registry
//!     .upsert_usage("views", &SiteUsage::for_site(&site, "8.x-1.0"))
//!     .unwrap();
//!
//! let found = registry.find_by_url("https://example.org").unwrap().unwrap();
//! assert!(found.token_matches("shared-token"));
//! ```
//!
//! ## References
//!
//! - Sled: <https://sled.rs/>
//! - subtle: <https://docs.rs/subtle>

pub mod models;
pub mod registry;
pub mod storage;

#[cfg(test)]
mod tests;

pub use models::{
    CoreVersion, Library, Module, ModuleUsage, RegistryError, Result, Site, SiteId, SiteKind,
    SiteSort, SiteUsage, DEFAULT_SITE_TYPE,
};
pub use registry::{ModuleRegistry, SiteRegistry, SledRegistry};
pub use storage::Storage;
