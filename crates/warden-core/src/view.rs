//! Read models for the dashboard and site pages.

use crate::error::CoreError;
use crate::reconcile::Reconciler;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use warden_registry::{Library, ModuleUsage, Site, SiteId, SiteSort};

/// One row of the site listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteSummary {
    /// Site id.
    pub id: SiteId,
    /// Display name.
    pub name: String,
    /// Registration URL.
    pub url: String,
    /// Registered but not yet reviewed by an administrator.
    pub is_new: bool,
    /// Last accepted report.
    pub last_request: Option<DateTime<Utc>>,
    /// Contacted before, but not within the staleness threshold.
    pub not_updated: bool,
    /// The site flagged a critical issue in its last report.
    pub has_critical_issue: bool,
    /// Core is behind a security release.
    pub core_needs_security_update: bool,
    /// Modules behind a security release.
    pub security_updates: usize,
    /// Modules behind a regular release.
    pub regular_updates: usize,
}

impl SiteSummary {
    /// Builds the row for `site` as of `now`.
    pub fn from_site(site: &Site, now: DateTime<Utc>, stale_after: Duration) -> Self {
        let counts = site.update_counts();
        Self {
            id: site.id.clone(),
            name: site.name.clone(),
            url: site.url.clone(),
            is_new: site.is_new,
            last_request: site.last_successful_request,
            not_updated: site.has_not_updated_recently(now, stale_after),
            has_critical_issue: site.has_critical_issue,
            core_needs_security_update: site.core_needs_security_update(),
            security_updates: counts.security,
            regular_updates: counts.regular,
        }
    }

    /// True if anything on the site needs attention.
    pub fn needs_attention(&self) -> bool {
        self.has_critical_issue
            || self.core_needs_security_update
            || self.security_updates > 0
            || self.not_updated
    }
}

/// Everything shown for a single site.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteDetail {
    /// Site id.
    pub id: SiteId,
    /// Display name.
    pub name: String,
    /// Registration URL.
    pub url: String,
    /// Software type, if assigned.
    pub site_type: Option<String>,
    /// Installed core version.
    pub core_version: String,
    /// Latest known core release for the installed line.
    pub latest_core_version: Option<String>,
    /// Installed core is older than the latest release.
    pub has_older_core_version: bool,
    /// Core is behind a security release.
    pub core_needs_security_update: bool,
    /// Severity ordered: security first, then by name.
    pub modules_requiring_updates: Vec<ModuleUsage>,
    /// Modules behind a security release.
    pub security_updates: usize,
    /// Modules behind a regular release.
    pub regular_updates: usize,
    /// Every reported module, by name.
    pub modules: Vec<ModuleUsage>,
    /// Libraries by category.
    pub libraries: BTreeMap<String, Vec<Library>>,
    /// The site flagged a critical issue in its last report.
    pub has_critical_issue: bool,
    /// Issue records the site has reported.
    pub additional_issues: Vec<serde_json::Value>,
    /// Last accepted report.
    pub last_request: Option<DateTime<Utc>>,
}

impl From<&Site> for SiteDetail {
    fn from(site: &Site) -> Self {
        let pending: Vec<ModuleUsage> = site
            .modules_requiring_updates()
            .into_iter()
            .cloned()
            .collect();
        let counts = site.update_counts();
        Self {
            id: site.id.clone(),
            name: site.name.clone(),
            url: site.url.clone(),
            site_type: site.site_type.clone(),
            core_version: site.core.current.clone(),
            latest_core_version: site.core.latest.clone(),
            has_older_core_version: site.has_older_core_version(),
            core_needs_security_update: site.core_needs_security_update(),
            modules_requiring_updates: pending,
            security_updates: counts.security,
            regular_updates: counts.regular,
            modules: site.modules.values().cloned().collect(),
            libraries: site.libraries.clone(),
            has_critical_issue: site.has_critical_issue,
            additional_issues: site.additional_issues.clone(),
            last_request: site.last_successful_request,
        }
    }
}

impl Reconciler {
    /// All sites as listing rows, sorted by name.
    pub async fn list_site_summaries(
        &self,
        now: DateTime<Utc>,
        stale_after: Duration,
    ) -> Result<Vec<SiteSummary>, CoreError> {
        let sites = self
            .stores()
            .sites("list_all", |sites| sites.list_all(SiteSort::NameAsc))
            .await?;
        Ok(sites
            .iter()
            .map(|site| SiteSummary::from_site(site, now, stale_after))
            .collect())
    }

    /// Detail view for one site.
    pub async fn site_detail(&self, id: &SiteId) -> Result<SiteDetail, CoreError> {
        let lookup = id.clone();
        let site = self
            .stores()
            .sites("find_by_id", move |sites| sites.find_by_id(&lookup))
            .await?
            .ok_or_else(|| CoreError::SiteNotFound(id.to_string()))?;
        Ok(SiteDetail::from(&site))
    }
}
