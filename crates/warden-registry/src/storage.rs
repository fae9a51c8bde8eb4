//! # Persistent Storage Layer
//!
//! Sled-backed document storage for sites and modules. Every write that
//! must stay consistent across keys runs inside a sled transaction, so
//! concurrent ingestion cycles touching the same entity serialize instead
//! of losing updates.
//!
//! ## Storage Structure
//!
//! | Tree | Key | Value | Purpose |
//! |------|-----|-------|---------|
//! | `sites` | site id | JSON [`Site`] | Site documents |
//! | `site_urls` | site url | site id | URL uniqueness index |
//! | `modules` | project name | JSON [`Module`] | Module documents |
//!
//! ## Consistency
//!
//! - Site writes update `sites` and `site_urls` in one multi-tree
//!   transaction. A URL already indexed to another id aborts the write
//!   with [`RegistryError::UrlTaken`].
//! - [`Storage::update_site`] is a read-modify-write over the same two
//!   trees. It applies a change to the stored document, never to a stale
//!   copy, and never recreates a deleted site.
//! - Module writes are read-modify-write transactions on `modules`. Sled
//!   retries the closure on conflict, so the mutation must be repeatable.
//!
//! ## Security Notes
//!
//! - Site documents hold shared tokens in plaintext; keep the database on
//!   storage readable only by the service account.
//!
//! ## References
//!
//! - Sled documentation: <https://sled.rs/>
//! - Sled transactions: <https://docs.rs/sled/0.34/sled/transaction/>

use crate::models::{Module, RegistryError, Result, Site, SiteId};
use sled::transaction::{ConflictableTransactionError, TransactionalTree};
use sled::Transactional;
use std::path::Path;

/// Tree name for site documents.
const SITE_TREE: &str = "sites";

/// Tree name for the URL → id index.
const URL_TREE: &str = "site_urls";

/// Tree name for module documents.
const MODULE_TREE: &str = "modules";

type TxResult<T> = std::result::Result<T, ConflictableTransactionError<RegistryError>>;

fn abort<E: Into<RegistryError>>(err: E) -> ConflictableTransactionError<RegistryError> {
    ConflictableTransactionError::Abort(err.into())
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> TxResult<T> {
    serde_json::from_slice(bytes).map_err(abort)
}

/// Wrapper around a Sled database holding registry documents.
///
/// Cloning is cheap; clones share the underlying database.
#[derive(Clone)]
pub struct Storage {
    db: sled::Db,
    sites: sled::Tree,
    urls: sled::Tree,
    modules: sled::Tree,
}

impl Storage {
    /// Opens or creates a storage database at the given path.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::Database` if the path is unusable or the
    /// database is corrupted.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_db(sled::open(path)?)
    }

    /// Creates a temporary storage for testing, removed on drop.
    pub fn temporary() -> Result<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: sled::Db) -> Result<Self> {
        let sites = db.open_tree(SITE_TREE)?;
        let urls = db.open_tree(URL_TREE)?;
        let modules = db.open_tree(MODULE_TREE)?;
        Ok(Storage {
            db,
            sites,
            urls,
            modules,
        })
    }

    // =========================================================================
    // Sites
    // =========================================================================

    /// Loads a site by id.
    pub fn load_site(&self, id: &SiteId) -> Result<Option<Site>> {
        match self.sites.get(id.as_str().as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Loads a site by its exact registration URL.
    pub fn load_site_by_url(&self, url: &str) -> Result<Option<Site>> {
        let id = match self.urls.get(url.as_bytes())? {
            Some(id) => id,
            None => return Ok(None),
        };
        match self.sites.get(&id)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// True if some site holds `url`.
    pub fn url_exists(&self, url: &str) -> Result<bool> {
        Ok(self.urls.contains_key(url.as_bytes())?)
    }

    /// Inserts or replaces a site document.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::UrlTaken` if another site holds the URL.
    pub fn save_site(&self, site: &Site) -> Result<()> {
        let key = site.id.as_str().as_bytes();
        let url = site.url.as_bytes();
        let doc = serde_json::to_vec(site)?;

        (&self.sites, &self.urls).transaction(
            |(sites, urls): &(TransactionalTree, TransactionalTree)| -> TxResult<()> {
                if let Some(owner) = urls.get(url)? {
                    if owner.as_ref() != key {
                        return Err(abort(RegistryError::UrlTaken(site.url.clone())));
                    }
                }
                if let Some(previous) = sites.get(key)? {
                    let previous: Site = decode(&previous)?;
                    if previous.url != site.url {
                        urls.remove(previous.url.as_bytes())?;
                    }
                }
                sites.insert(key, doc.as_slice())?;
                urls.insert(url, key)?;
                Ok(())
            },
        )?;
        Ok(())
    }

    /// Atomically reads, mutates and writes back one site document.
    ///
    /// A missing site is never recreated. The write is skipped when
    /// `mutate` returns `false`. A changed URL moves the index entry and
    /// aborts with `UrlTaken` if another site holds it. Returns the
    /// resulting document, or `None` if the site does not exist.
    ///
    /// `mutate` may run more than once under contention and must not change
    /// the id.
    pub fn update_site<F>(&self, id: &SiteId, mutate: F) -> Result<Option<Site>>
    where
        F: Fn(&mut Site) -> bool,
    {
        let key = id.as_str().as_bytes();

        let result = (&self.sites, &self.urls).transaction(
            |(sites, urls): &(TransactionalTree, TransactionalTree)| -> TxResult<Option<Site>> {
                let Some(bytes) = sites.get(key)? else {
                    return Ok(None);
                };
                let mut site: Site = decode(&bytes)?;
                let previous_url = site.url.clone();
                if !mutate(&mut site) {
                    return Ok(Some(site));
                }

                if site.url != previous_url {
                    if let Some(owner) = urls.get(site.url.as_bytes())? {
                        if owner.as_ref() != key {
                            return Err(abort(RegistryError::UrlTaken(site.url.clone())));
                        }
                    }
                    urls.remove(previous_url.as_bytes())?;
                    urls.insert(site.url.as_bytes(), key)?;
                }
                let doc = serde_json::to_vec(&site).map_err(abort)?;
                sites.insert(key, doc)?;
                Ok(Some(site))
            },
        )?;
        Ok(result)
    }

    /// Removes a site and its URL index entry, returning the removed site.
    pub fn remove_site(&self, id: &SiteId) -> Result<Option<Site>> {
        let key = id.as_str().as_bytes();

        let removed = (&self.sites, &self.urls).transaction(
            |(sites, urls): &(TransactionalTree, TransactionalTree)| -> TxResult<Option<Site>> {
                let Some(bytes) = sites.remove(key)? else {
                    return Ok(None);
                };
                let site: Site = decode(&bytes)?;
                urls.remove(site.url.as_bytes())?;
                Ok(Some(site))
            },
        )?;
        Ok(removed)
    }

    /// All site documents in key order.
    pub fn list_sites(&self) -> Result<Vec<Site>> {
        let mut sites = Vec::with_capacity(self.sites.len());
        for entry in self.sites.iter() {
            let (_, bytes) = entry?;
            sites.push(serde_json::from_slice(&bytes)?);
        }
        Ok(sites)
    }

    /// Number of stored sites.
    pub fn site_count(&self) -> usize {
        self.sites.len()
    }

    // =========================================================================
    // Modules
    // =========================================================================

    /// Loads a module by project name.
    pub fn load_module(&self, project_name: &str) -> Result<Option<Module>> {
        match self.modules.get(project_name.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Atomically reads, mutates and writes back one module document.
    ///
    /// A missing module is created empty when `create_missing` is set and
    /// skipped otherwise. The write is skipped when `mutate` returns
    /// `false`. Returns the resulting document, if one exists.
    ///
    /// `mutate` may run more than once under contention.
    pub fn update_module<F>(
        &self,
        project_name: &str,
        create_missing: bool,
        mutate: F,
    ) -> Result<Option<Module>>
    where
        F: Fn(&mut Module) -> bool,
    {
        let key = project_name.as_bytes();

        let result = self
            .modules
            .transaction(|tx| -> TxResult<Option<Module>> {
                let mut module = match tx.get(key)? {
                    Some(bytes) => decode::<Module>(&bytes)?,
                    None if create_missing => Module::new(project_name),
                    None => return Ok(None),
                };
                if mutate(&mut module) {
                    let doc = serde_json::to_vec(&module).map_err(abort)?;
                    tx.insert(key, doc)?;
                }
                Ok(Some(module))
            })?;
        Ok(result)
    }

    /// All module documents ordered by project name.
    pub fn list_modules(&self) -> Result<Vec<Module>> {
        let mut modules = Vec::with_capacity(self.modules.len());
        for entry in self.modules.iter() {
            let (_, bytes) = entry?;
            modules.push(serde_json::from_slice(&bytes)?);
        }
        Ok(modules)
    }

    /// Number of stored modules.
    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    /// Flushes pending writes to disk, returning the bytes flushed.
    pub fn flush(&self) -> Result<usize> {
        Ok(self.db.flush()?)
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("sites", &self.site_count())
            .field("modules", &self.module_count())
            .finish()
    }
}
