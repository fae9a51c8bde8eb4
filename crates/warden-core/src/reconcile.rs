//! # Reconciliation Orchestrator
//!
//! Drives one ingestion cycle from encrypted bytes to persisted, classified
//! site state, and applies administrative changes that touch the same
//! documents.
//!
//! ## Cycle
//!
//! ```text
//!  Authenticating ──AuthError──▶ Rejected
//!        │
//!        ▼
//!     Merging ──▶ Classifying ──▶ Persisting ──▶ Notifying ──▶ Done
//! ```
//!
//! - **Merging** copies identity, core version, libraries and issues from
//!   the report into the site, rebuilds its module map (keeping earlier
//!   `latest_version`/`is_security` annotations, re-deriving
//!   `is_unsupported` at once) and gathers release data per module from the
//!   registry snapshot overlaid with what the report carries.
//! - **Classifying** re-runs classification for the modules just reported.
//! - **Persisting** applies the report-owned fields onto the stored site
//!   in one atomic read-modify-write, then writes release updates and usage
//!   entries for every reported module and removes usage entries for
//!   modules the site stopped reporting. Token, URL and auth settings are
//!   taken from the stored document, never from the copy read at
//!   authentication. Each document write is atomic; the set is not. A crash
//!   in between leaves the usage index stale until the site's next report.
//! - **Notifying** emits a dashboard update. Its failure is logged only.
//!
//! The last-contact stamp and the default site type are applied only when
//! the cycle reaches Persisting.
//!
//! ## Concurrency
//!
//! Cycles for different sites run fully in parallel. Two cycles touching
//! the same module serialize inside the store's per-document transaction.
//! Every registry call runs under the [`Stores`] deadline. A cycle dropped
//! before Persisting leaves nothing behind; the next report re-drives it.
//!
//! A site deleted while a cycle is in flight stays deleted. The site write
//! never recreates a missing document, and usage entries written for a site
//! that vanished meanwhile are removed again before the cycle returns, so
//! the cycle ends as an unknown-site rejection.

use crate::auth::Authenticator;
use crate::error::{AuthError, CoreError, IngestError, StoreError};
use crate::notify::{emit_bounded, DashboardUpdate, Notifier};
use crate::report::Report;
use crate::store::Stores;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::cell::Cell;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, info_span, warn, Instrument, Span};
use warden_registry::{Module, ModuleUsage, Site, SiteId, SiteUsage};
use warden_versions::{
    candidates_for, classify, is_unsupported, release_line, CandidateVersions, VersionInfo,
};

/// Release map of one module, keyed by branch.
pub type Releases = BTreeMap<String, CandidateVersions>;

/// States of one ingestion cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    /// Running the authentication gates.
    Authenticating,
    /// Folding the report into site state.
    Merging,
    /// Deriving latest versions and flags.
    Classifying,
    /// Writing documents.
    Persisting,
    /// Emitting the dashboard update.
    Notifying,
    /// Cycle complete.
    Done,
    /// An authentication gate failed.
    Rejected,
}

/// Result of an accepted report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutcome {
    /// The reporting site.
    pub site_id: SiteId,
    /// Its registration URL.
    pub url: String,
    /// Number of modules the report listed.
    pub modules: usize,
    /// Modules with no comparable upstream version.
    pub gaps: Vec<String>,
    /// Modules the site stopped reporting.
    pub removed: Vec<String>,
    /// Whether the dashboard update was delivered.
    pub notified: bool,
    /// Final phase, always [`CyclePhase::Done`].
    pub phase: CyclePhase,
}

/// Administrative edit of a site. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct SiteSettings {
    /// New display name.
    pub name: Option<String>,
    /// New registration URL.
    pub url: Option<String>,
    /// New shared token. The only way a token changes.
    pub token: Option<String>,
    /// Basic-auth user; an empty string clears it.
    pub auth_user: Option<String>,
    /// Basic-auth password; an empty string clears it.
    pub auth_pass: Option<String>,
    /// New-site flag.
    pub is_new: Option<bool>,
}

impl SiteSettings {
    fn apply_to(&self, site: &mut Site) {
        if let Some(name) = &self.name {
            site.name = name.clone();
        }
        if let Some(url) = &self.url {
            site.url = url.clone();
        }
        if let Some(token) = &self.token {
            site.set_token(token.clone());
        }
        if let Some(user) = &self.auth_user {
            site.auth_user = Some(user.clone()).filter(|u| !u.is_empty());
        }
        if let Some(pass) = &self.auth_pass {
            site.set_auth_pass(Some(pass.clone()));
        }
        if let Some(is_new) = self.is_new {
            site.is_new = is_new;
        }
    }
}

/// What Merging hands to the later phases.
#[derive(Debug, Default)]
struct Merged {
    /// Effective releases per reported module.
    releases: BTreeMap<String, Releases>,
    /// Release data carried by the report itself, to be stored.
    reported: BTreeMap<String, Releases>,
    /// Modules no longer reported.
    removed: Vec<String>,
}

/// Ingestion orchestrator.
#[derive(Clone)]
pub struct Reconciler {
    auth: Authenticator,
    stores: Stores,
    notifier: Arc<dyn Notifier>,
    notify_timeout: Duration,
}

impl Reconciler {
    /// Creates an orchestrator.
    pub fn new(
        auth: Authenticator,
        stores: Stores,
        notifier: Arc<dyn Notifier>,
        notify_timeout: Duration,
    ) -> Self {
        Self {
            auth,
            stores,
            notifier,
            notify_timeout,
        }
    }

    /// Bounded registry access.
    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub(crate) async fn notify(&self, site: Site, was_deleted: bool) -> bool {
        let update = DashboardUpdate { site, was_deleted };
        emit_bounded(self.notifier.as_ref(), update, self.notify_timeout).await
    }

    // =========================================================================
    // Ingestion
    // =========================================================================

    /// Runs one full cycle for an encrypted report received at `now`.
    ///
    /// # Errors
    ///
    /// `IngestError::Auth` when a gate rejects the report, with the reason
    /// kept for logging; `IngestError::Store` when a registry call fails or
    /// times out.
    pub async fn ingest(&self, body: &[u8], now: DateTime<Utc>) -> Result<IngestOutcome, IngestError> {
        let span = info_span!("ingest", url = tracing::field::Empty);
        self.cycle(body, now).instrument(span).await
    }

    async fn cycle(&self, body: &[u8], now: DateTime<Utc>) -> Result<IngestOutcome, IngestError> {
        debug!(phase = ?CyclePhase::Authenticating, "Cycle started");
        let (mut site, report) = match self.authenticate(body, now).await {
            Ok(accepted) => accepted,
            Err(IngestError::Auth(reason)) => {
                warn!(phase = ?CyclePhase::Rejected, gate = reason.gate(), reason = %reason, "Report rejected");
                return Err(IngestError::Auth(reason));
            }
            Err(e) => return Err(e),
        };

        debug!(phase = ?CyclePhase::Merging, site = %site.id);
        let merged = self.merge(&mut site, &report).await?;

        debug!(phase = ?CyclePhase::Classifying);
        let gaps = classify_site(&mut site, &merged.releases);

        debug!(phase = ?CyclePhase::Persisting);
        site.mark_contacted(now);
        if site.ensure_default_type() {
            debug!(site_type = ?site.site_type, "Assigned default site type");
        }
        let site = self.persist(&site, &report, &merged).await?;

        debug!(phase = ?CyclePhase::Notifying);
        let notified = self.notify(site.clone(), false).await;

        info!(
            site = %site.id,
            modules = site.modules.len(),
            gaps = gaps.len(),
            removed = merged.removed.len(),
            "Report accepted"
        );

        Ok(IngestOutcome {
            site_id: site.id.clone(),
            url: site.url.clone(),
            modules: site.modules.len(),
            gaps,
            removed: merged.removed,
            notified,
            phase: CyclePhase::Done,
        })
    }

    async fn authenticate(&self, body: &[u8], now: DateTime<Utc>) -> Result<(Site, Report), IngestError> {
        let report = self.auth.open(body, now)?;
        Span::current().record("url", report.url.as_str());

        let url = report.url.clone();
        let found = self
            .stores
            .sites("find_by_url", move |sites| sites.find_by_url(&url))
            .await?;
        let site = self.auth.verify(found, &report)?;
        Ok((site, report))
    }

    async fn merge(&self, site: &mut Site, report: &Report) -> Result<Merged, IngestError> {
        if let Some(name) = report.site_name.as_deref().filter(|n| !n.trim().is_empty()) {
            site.name = name.to_string();
        }
        if let Some(version) = report.core_version(&site.kind()) {
            site.set_core_version(version);
        }
        site.set_libraries(&report.library);
        if let Some(critical) = report.critical_issue {
            site.has_critical_issue = critical;
        }
        site.add_additional_issues(report.additional_issues.iter().cloned());

        let mut merged = Merged::default();
        if !site.kind().reconciles_modules() {
            return Ok(merged);
        }

        let names: Vec<String> = report.modules().map(|(name, _, _)| name.to_string()).collect();
        let snapshot = self
            .stores
            .modules("find_by_project_name", move |modules| {
                let mut found = BTreeMap::new();
                for name in names {
                    if let Some(module) = modules.find_by_project_name(&name)? {
                        found.insert(name, module);
                    }
                }
                Ok(found)
            })
            .await?;

        let mut previous = std::mem::take(&mut site.modules);
        for (name, entry, version) in report.modules() {
            let mut releases = snapshot
                .get(name)
                .map(|m: &Module| m.releases.clone())
                .unwrap_or_default();
            if !entry.latest_version.is_empty() {
                releases.extend(entry.latest_version.clone());
                merged
                    .reported
                    .insert(name.to_string(), entry.latest_version.clone());
            }

            let mut usage = match previous.remove(name) {
                Some(mut kept) => {
                    kept.version = version.to_string();
                    kept
                }
                None => ModuleUsage::new(name, version),
            };
            usage.is_unsupported = Some(is_unsupported(candidates_for(&releases, version), version));

            site.modules.insert(name.to_string(), usage);
            merged.releases.insert(name.to_string(), releases);
        }
        merged.removed = previous.into_keys().collect();
        Ok(merged)
    }

    async fn persist(&self, site: &Site, report: &Report, merged: &Merged) -> Result<Site, IngestError> {
        let reported = merged.reported.clone();
        let removed = merged.removed.clone();
        let issues = report.additional_issues.clone();
        let working = site.clone();

        let stored = self
            .stores
            .both("persist_cycle", move |sites, modules| {
                let id = working.id.clone();
                let Some(stored) = sites.update(&id, &|current| {
                    carry_reported(current, &working, &issues);
                    true
                })?
                else {
                    return Ok(None);
                };

                for (name, releases) in &reported {
                    modules.upsert_releases(name, releases)?;
                }
                for usage in stored.modules.values() {
                    modules.upsert_usage(&usage.name, &SiteUsage::for_site(&stored, usage.version.clone()))?;
                }
                for name in &removed {
                    modules.remove_usage(name, &id)?;
                }

                // A delete that landed after the site write pruned the
                // index before these entries existed.
                if sites.find_by_id(&id)?.is_none() {
                    for name in stored.modules.keys() {
                        modules.remove_usage(name, &id)?;
                    }
                    modules.persist()?;
                    return Ok(None);
                }
                modules.persist()?;
                Ok(Some(stored))
            })
            .await?;

        stored.ok_or_else(|| {
            warn!(site = %site.id, "Site deleted during cycle");
            IngestError::Auth(AuthError::UnknownSite {
                url: site.url.clone(),
            })
        })
    }

    // =========================================================================
    // Administration
    // =========================================================================

    /// Deletes a site and prunes it from every module's usage index.
    pub async fn delete_site(&self, id: &SiteId) -> Result<Option<Site>, CoreError> {
        let id = id.clone();
        let deleted = self
            .stores
            .both("delete_site", move |sites, modules| {
                let Some(site) = sites.delete(&id)? else {
                    return Ok(None);
                };
                let mut pruned = 0usize;
                for module in modules.list_modules()? {
                    if module.usage_for(&id).is_some()
                        && modules.remove_usage(&module.project_name, &id)?
                    {
                        pruned += 1;
                    }
                }
                modules.persist()?;
                Ok(Some((site, pruned)))
            })
            .await?;

        let Some((site, pruned)) = deleted else {
            return Ok(None);
        };
        info!(site = %site.id, url = %site.url, pruned, "Site deleted");
        self.notify(site.clone(), true).await;
        Ok(Some(site))
    }

    /// Applies an administrative edit. Re-checks URL uniqueness and
    /// refreshes the site's entries in the usage index when its name or URL
    /// changed.
    pub async fn update_site_settings(&self, id: &SiteId, mut settings: SiteSettings) -> Result<Site, CoreError> {
        if let Some(url) = settings.url.as_mut() {
            *url = url.trim().to_string();
            if url.is_empty() {
                return Err(CoreError::Invalid("url must not be empty".into()));
            }
        }
        if settings.token.as_deref().is_some_and(str::is_empty) {
            return Err(CoreError::Invalid("token must not be empty".into()));
        }

        let relabel = settings.name.is_some() || settings.url.is_some();
        let rotates_token = settings.token.is_some();
        let target = id.clone();
        let site = self
            .stores
            .both("update_site", move |sites, modules| {
                let Some(site) = sites.update(&target, &|site| {
                    settings.apply_to(site);
                    true
                })?
                else {
                    return Ok(None);
                };
                if relabel {
                    for usage in site.modules.values() {
                        modules.upsert_usage(&usage.name, &SiteUsage::for_site(&site, usage.version.clone()))?;
                    }
                }
                modules.persist()?;
                Ok(Some(site))
            })
            .await?
            .ok_or_else(|| CoreError::SiteNotFound(id.to_string()))?;

        if rotates_token {
            info!(site = %site.id, "Site token changed");
        }
        self.notify(site.clone(), false).await;
        Ok(site)
    }

    /// Applies `mutate` to the stored site. Returns the site only when it
    /// exists and `mutate` changed it.
    async fn update_site<F>(&self, id: &SiteId, mutate: F) -> Result<Option<Site>, StoreError>
    where
        F: Fn(&mut Site) -> bool + Send + 'static,
    {
        let id = id.clone();
        self.stores
            .sites("update", move |sites| {
                let changed = Cell::new(false);
                let site = sites.update(&id, &|site| {
                    changed.set(mutate(site));
                    changed.get()
                })?;
                Ok(site.filter(|_| changed.get()))
            })
            .await
    }

    // =========================================================================
    // Upstream release propagation
    // =========================================================================

    /// Stores new upstream releases for a module and reclassifies it on
    /// every site in its usage index. Returns the number of sites changed.
    pub async fn apply_module_releases(&self, project: &str, releases: Releases) -> Result<usize, CoreError> {
        let name = project.to_string();
        let module = self
            .stores
            .modules("upsert_releases", move |modules| {
                let module = modules.upsert_releases(&name, &releases)?;
                modules.persist()?;
                Ok(module)
            })
            .await?;

        let mut touched = 0;
        for usage in &module.sites {
            let name = project.to_string();
            let releases = module.releases.clone();
            let updated = self
                .update_site(&usage.site_id, move |site| {
                    let Some(entry) = site.modules.get_mut(&name) else {
                        return false;
                    };
                    let before = entry.clone();
                    let classification = classify(&entry.version, &releases);
                    entry.apply(&classification);
                    *entry != before
                })
                .await?;
            let Some(site) = updated else {
                continue;
            };

            if let Some(entry) = site.modules.get(project).filter(|e| e.latest_version.is_none()) {
                warn!(project, site = %site.id, version = %entry.version, "No comparable upstream version");
            }
            touched += 1;
            self.notify(site, false).await;
        }

        info!(project, sites = touched, "Module releases applied");
        Ok(touched)
    }

    /// Records the latest core release for a release line on every site
    /// running that line. Returns the number of sites changed.
    pub async fn apply_core_release(&self, branch: &str, latest: VersionInfo) -> Result<usize, CoreError> {
        let sites = self
            .stores
            .sites("list_all", |sites| sites.list_all(Default::default()))
            .await?;
        let line = release_line(branch).to_string();

        let mut touched = 0;
        for site in sites {
            if !runs_line(&site, &line) {
                continue;
            }
            let line = line.clone();
            let latest = latest.clone();
            let updated = self
                .update_site(&site.id, move |site| {
                    if !runs_line(site, &line)
                        || (site.core.latest.as_deref() == Some(latest.version.as_str())
                            && site.core.is_security == latest.is_security)
                    {
                        return false;
                    }
                    site.set_latest_core_version(latest.version.clone(), latest.is_security);
                    true
                })
                .await?;
            let Some(site) = updated else {
                continue;
            };
            touched += 1;
            self.notify(site, false).await;
        }

        info!(branch, version = %latest.version, sites = touched, "Core release applied");
        Ok(touched)
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("auth", &self.auth)
            .field("stores", &self.stores)
            .field("notify_timeout", &self.notify_timeout)
            .finish_non_exhaustive()
    }
}

fn runs_line(site: &Site, line: &str) -> bool {
    !site.core.current.is_empty() && release_line(&site.core.current) == line
}

/// Copies what a report owns from the working copy onto the stored site.
/// Token, URL, auth settings, `is_new` and the latest core release stay as
/// stored.
fn carry_reported(current: &mut Site, working: &Site, issues: &[Value]) {
    current.name = working.name.clone();
    current.core.current = working.core.current.clone();
    current.core.release = working.core.release.clone();
    current.libraries = working.libraries.clone();
    current.has_critical_issue = working.has_critical_issue;
    current.add_additional_issues(issues.iter().cloned());
    current.modules = working.modules.clone();
    current.last_successful_request = working.last_successful_request;
    current.ensure_default_type();
}

/// Classifies every module on `site` against `releases`, returning the
/// names that could not be classified.
fn classify_site(site: &mut Site, releases: &BTreeMap<String, Releases>) -> Vec<String> {
    let empty = Releases::new();
    let mut gaps = Vec::new();
    for (name, usage) in site.modules.iter_mut() {
        let classification = classify(&usage.version, releases.get(name).unwrap_or(&empty));
        if classification.is_gap() {
            warn!(module = %name, version = %usage.version, "No comparable upstream version");
            gaps.push(name.clone());
        }
        usage.apply(&classification);
    }
    gaps
}

#[cfg(test)]
mod tests {
    use super::*;

    fn releases(branch: &str, info: VersionInfo) -> Releases {
        let mut map = Releases::new();
        map.insert(branch.to_string(), CandidateVersions::recommended(info));
        map
    }

    #[test]
    fn test_classify_site_reports_gaps() {
        let mut site = Site::new("https://a.example", "t", None);
        site.modules
            .insert("views".into(), ModuleUsage::new("views", "8.x-1.0"));
        site.modules
            .insert("orphan".into(), ModuleUsage::new("orphan", "8.x-1.0"));

        let mut all = BTreeMap::new();
        all.insert("views".to_string(), releases("8.x", VersionInfo::security("8.x-1.2")));

        let gaps = classify_site(&mut site, &all);
        assert_eq!(gaps, vec!["orphan".to_string()]);
        assert_eq!(
            site.modules["views"].latest_version.as_deref(),
            Some("8.x-1.2")
        );
        assert_eq!(site.modules["views"].is_security, Some(true));
        assert_eq!(site.modules["orphan"].is_unsupported, Some(true));
    }

    #[test]
    fn test_dev_install_never_security() {
        let mut site = Site::new("https://a.example", "t", None);
        site.modules
            .insert("views".into(), ModuleUsage::new("views", "8.x-1.x-dev"));
        let mut all = BTreeMap::new();
        all.insert("views".to_string(), releases("8.x", VersionInfo::security("8.x-1.2")));

        classify_site(&mut site, &all);
        assert_eq!(site.modules["views"].is_security, Some(false));
    }
}
