//! # Registry Interfaces
//!
//! The site and module registries the reconciler depends on, expressed as
//! traits so the orchestrator can run against the sled-backed
//! [`SledRegistry`] in production and against in-memory doubles in tests.
//!
//! ```text
//!        ┌──────────────┐      ┌────────────────┐
//!        │ SiteRegistry │      │ ModuleRegistry │
//!        └──────┬───────┘      └───────┬────────┘
//!               └──────────┬───────────┘
//!                          ▼
//!                  ┌──────────────┐
//!                  │ SledRegistry │──▶ Storage (sled)
//!                  └──────────────┘
//! ```
//!
//! Both traits are synchronous. Async callers run them on a blocking pool
//! under a timeout.

use crate::models::{Module, RegistryError, Result, Site, SiteId, SiteSort, SiteUsage};
use crate::storage::Storage;
use std::cell::Cell;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;
use warden_versions::CandidateVersions;

/// Lookup and persistence of site documents.
pub trait SiteRegistry: Send + Sync {
    /// Finds a site by exact registration URL.
    fn find_by_url(&self, url: &str) -> Result<Option<Site>>;

    /// Finds a site by id.
    fn find_by_id(&self, id: &SiteId) -> Result<Option<Site>>;

    /// Inserts or replaces a site. Fails with `UrlTaken` if another site
    /// holds the URL.
    fn upsert(&self, site: &Site) -> Result<()>;

    /// Atomically applies `mutate` to the stored site. Skips the write when
    /// `mutate` returns `false`. Returns the resulting site, or `None` if it
    /// does not exist; a missing site is never recreated.
    fn update(&self, id: &SiteId, mutate: &dyn Fn(&mut Site) -> bool) -> Result<Option<Site>>;

    /// Deletes a site, returning it if it existed.
    fn delete(&self, id: &SiteId) -> Result<Option<Site>>;

    /// All sites in the requested order.
    fn list_all(&self, sort: SiteSort) -> Result<Vec<Site>>;

    /// True if some site holds `url`.
    fn url_exists(&self, url: &str) -> Result<bool>;
}

/// Lookup and persistence of module documents.
pub trait ModuleRegistry: Send + Sync {
    /// Finds a module by project name.
    fn find_by_project_name(&self, project_name: &str) -> Result<Option<Module>>;

    /// Merges upstream releases into a module, creating it if needed.
    fn upsert_releases(
        &self,
        project_name: &str,
        releases: &BTreeMap<String, CandidateVersions>,
    ) -> Result<Module>;

    /// Records that a site runs a module, creating the module if needed.
    fn upsert_usage(&self, project_name: &str, usage: &SiteUsage) -> Result<Module>;

    /// Drops a site's usage entry. Returns whether one existed.
    fn remove_usage(&self, project_name: &str, site_id: &SiteId) -> Result<bool>;

    /// All modules ordered by project name.
    fn list_modules(&self) -> Result<Vec<Module>>;

    /// Makes preceding writes durable.
    fn persist(&self) -> Result<()>;
}

/// Sled-backed implementation of both registries.
#[derive(Debug, Clone)]
pub struct SledRegistry {
    storage: Storage,
}

impl SledRegistry {
    /// Opens or creates the registry database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            storage: Storage::open(path)?,
        })
    }

    /// A temporary registry for tests.
    pub fn temporary() -> Result<Self> {
        Ok(Self {
            storage: Storage::temporary()?,
        })
    }

    /// Underlying storage.
    pub fn storage(&self) -> &Storage {
        &self.storage
    }
}

impl SiteRegistry for SledRegistry {
    fn find_by_url(&self, url: &str) -> Result<Option<Site>> {
        self.storage.load_site_by_url(url)
    }

    fn find_by_id(&self, id: &SiteId) -> Result<Option<Site>> {
        self.storage.load_site(id)
    }

    fn upsert(&self, site: &Site) -> Result<()> {
        self.storage.save_site(site)
    }

    fn update(&self, id: &SiteId, mutate: &dyn Fn(&mut Site) -> bool) -> Result<Option<Site>> {
        self.storage.update_site(id, mutate)
    }

    fn delete(&self, id: &SiteId) -> Result<Option<Site>> {
        self.storage.remove_site(id)
    }

    fn list_all(&self, sort: SiteSort) -> Result<Vec<Site>> {
        let mut sites = self.storage.list_sites()?;
        sort.apply(&mut sites);
        Ok(sites)
    }

    fn url_exists(&self, url: &str) -> Result<bool> {
        self.storage.url_exists(url)
    }
}

impl ModuleRegistry for SledRegistry {
    fn find_by_project_name(&self, project_name: &str) -> Result<Option<Module>> {
        self.storage.load_module(project_name)
    }

    fn upsert_releases(
        &self,
        project_name: &str,
        releases: &BTreeMap<String, CandidateVersions>,
    ) -> Result<Module> {
        let module = self
            .storage
            .update_module(project_name, true, |m| m.merge_releases(releases))?;
        module.ok_or_else(|| RegistryError::NotFound(project_name.to_string()))
    }

    fn upsert_usage(&self, project_name: &str, usage: &SiteUsage) -> Result<Module> {
        let module = self.storage.update_module(project_name, true, |m| {
            if m.usage_for(&usage.site_id) == Some(usage) {
                return false;
            }
            m.upsert_usage(usage.clone());
            true
        })?;
        module.ok_or_else(|| RegistryError::NotFound(project_name.to_string()))
    }

    fn remove_usage(&self, project_name: &str, site_id: &SiteId) -> Result<bool> {
        let hit = Cell::new(false);
        self.storage.update_module(project_name, false, |m| {
            hit.set(m.remove_usage(site_id));
            hit.get()
        })?;
        let removed = hit.get();
        if removed {
            debug!(project = project_name, site = %site_id, "Removed module usage");
        }
        Ok(removed)
    }

    fn list_modules(&self) -> Result<Vec<Module>> {
        self.storage.list_modules()
    }

    fn persist(&self) -> Result<()> {
        self.storage.flush()?;
        Ok(())
    }
}
