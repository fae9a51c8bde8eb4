//! # Registry Data Model
//!
//! Documents stored by the registries. A [`Site`] is one monitored
//! installation and owns its per-module usage records; a [`Module`] is one
//! software component shared by every site that runs it, holding upstream
//! release information and a non-owning index of the sites using it.
//!
//! ```text
//!   Site ──owns──▶ modules: name → ModuleUsage      (installed + derived)
//!     ▲
//!     │ site_id (back-reference, never dereferenced for lifecycle)
//!     │
//!   Module ──owns──▶ sites: [SiteUsage]              (one per site)
//!          ──owns──▶ releases: branch → CandidateVersions
//! ```
//!
//! ## Invariants
//!
//! - A site URL is unique across the registry (enforced by storage).
//! - A site's token changes only through an explicit administrative edit.
//! - A module holds at most one [`SiteUsage`] per site; re-reporting
//!   updates it in place.
//!
//! ## Security Notes
//!
//! `Debug` on [`Site`] redacts the shared token and the basic-auth
//! password so they never reach logs.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use subtle::ConstantTimeEq;
use thiserror::Error;
use warden_versions::{
    compare_versions, major_branch, modules_requiring_updates, CandidateVersions, Classification,
    Classified, UpdateCounts,
};

/// Site type assigned when none was supplied at registration.
pub const DEFAULT_SITE_TYPE: &str = "drupal";

/// Server-assigned site identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteId(String);

impl SiteId {
    /// Allocates a fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SiteId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SiteId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Software family of a site; selects which `core` entry of a report
/// describes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteKind {
    /// A Drupal installation.
    Drupal,
    /// Any other declared type, kept verbatim.
    Other(String),
}

impl SiteKind {
    /// Key of this kind's entry in a report's `core` map.
    pub fn core_key(&self) -> &str {
        match self {
            SiteKind::Drupal => DEFAULT_SITE_TYPE,
            SiteKind::Other(name) => name,
        }
    }

    /// Whether sites of this kind take part in module reconciliation.
    ///
    /// Every registered kind currently does.
    pub fn reconciles_modules(&self) -> bool {
        true
    }
}

/// Core software version record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreVersion {
    /// Installed core version.
    pub current: String,
    /// Release branch of `current`.
    pub release: String,
    /// Latest known upstream version for the branch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest: Option<String>,
    /// Whether `latest` is a security release.
    #[serde(default)]
    pub is_security: bool,
}

/// One third-party library installed on a site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Library {
    /// Library name.
    pub name: String,
    /// Installed version.
    pub version: String,
}

/// A module as installed on one site.
///
/// `version` is what the site reported. The other fields are derived by
/// classification and may lag until the next pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleUsage {
    /// Module project name.
    pub name: String,
    /// Installed version, as reported.
    pub version: String,
    /// Latest relevant upstream version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_version: Option<String>,
    /// Whether `latest_version` is a security release for this install.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_security: Option<bool>,
    /// Whether the installed branch is no longer tracked upstream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_unsupported: Option<bool>,
}

impl ModuleUsage {
    /// A freshly reported module with no derived state.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            latest_version: None,
            is_security: None,
            is_unsupported: None,
        }
    }

    /// Writes a classification result back into the record.
    ///
    /// A classification gap clears the latest version and security flag,
    /// marking the module unclassifiable until upstream data appears.
    pub fn apply(&mut self, classification: &Classification) {
        self.latest_version = classification
            .latest
            .as_ref()
            .map(|chosen| chosen.info.version.clone());
        self.is_security = classification.is_security;
        self.is_unsupported = Some(classification.is_unsupported);
    }

    /// True once a latest version has been assigned.
    pub fn is_classified(&self) -> bool {
        self.latest_version.is_some()
    }
}

impl Classified for ModuleUsage {
    fn name(&self) -> &str {
        &self.name
    }

    fn installed_version(&self) -> &str {
        &self.version
    }

    fn latest_version(&self) -> Option<&str> {
        self.latest_version.as_deref()
    }

    fn security_flag(&self) -> Option<bool> {
        self.is_security
    }
}

/// One monitored installation.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    /// Server-assigned identifier.
    pub id: SiteId,
    /// Display name, refreshed from every report.
    pub name: String,
    /// Registration URL, unique across sites.
    pub url: String,
    token: String,
    /// Declared software type, `None` until assigned.
    #[serde(default)]
    pub site_type: Option<String>,
    /// Set on registration, cleared by an administrator.
    #[serde(default)]
    pub is_new: bool,
    /// Core software version.
    #[serde(default)]
    pub core: CoreVersion,
    /// Installed modules keyed (and ordered) by name.
    #[serde(default)]
    pub modules: BTreeMap<String, ModuleUsage>,
    /// Third-party libraries keyed by category.
    #[serde(default)]
    pub libraries: BTreeMap<String, Vec<Library>>,
    /// Whether the site reports a critical issue.
    #[serde(default)]
    pub has_critical_issue: bool,
    /// Free-form issue records supplied by the site.
    #[serde(default)]
    pub additional_issues: Vec<serde_json::Value>,
    /// Time of the last accepted report.
    #[serde(default)]
    pub last_successful_request: Option<DateTime<Utc>>,
    /// Basic-auth user for outbound polling.
    #[serde(default)]
    pub auth_user: Option<String>,
    #[serde(default)]
    auth_pass: Option<String>,
}

impl Site {
    /// Creates a newly registered site.
    ///
    /// The display name starts as the URL until the first report names it.
    pub fn new(url: impl Into<String>, token: impl Into<String>, site_type: Option<String>) -> Self {
        let url = url.into();
        Self {
            id: SiteId::generate(),
            name: url.clone(),
            url,
            token: token.into(),
            site_type: site_type.filter(|t| !t.trim().is_empty()),
            is_new: true,
            core: CoreVersion::default(),
            modules: BTreeMap::new(),
            libraries: BTreeMap::new(),
            has_critical_issue: false,
            additional_issues: Vec::new(),
            last_successful_request: None,
            auth_user: None,
            auth_pass: None,
        }
    }

    /// Compares a presented token with the stored one in constant time.
    pub fn token_matches(&self, presented: &str) -> bool {
        !self.token.is_empty() && bool::from(self.token.as_bytes().ct_eq(presented.as_bytes()))
    }

    /// The stored shared secret.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Replaces the shared secret. Administrative edits only.
    pub fn set_token(&mut self, token: impl Into<String>) {
        self.token = token.into();
    }

    /// Basic-auth password for outbound polling.
    pub fn auth_pass(&self) -> Option<&str> {
        self.auth_pass.as_deref()
    }

    /// Sets or clears the basic-auth password.
    pub fn set_auth_pass(&mut self, pass: Option<String>) {
        self.auth_pass = pass.filter(|p| !p.is_empty());
    }

    /// The site's software family.
    pub fn kind(&self) -> SiteKind {
        match self.site_type.as_deref() {
            None => SiteKind::Drupal,
            Some(t) if t.eq_ignore_ascii_case(DEFAULT_SITE_TYPE) => SiteKind::Drupal,
            Some(t) => SiteKind::Other(t.to_string()),
        }
    }

    /// Assigns the default type if none is set. Returns whether it did.
    pub fn ensure_default_type(&mut self) -> bool {
        if self.site_type.as_deref().is_some_and(|t| !t.is_empty()) {
            return false;
        }
        self.site_type = Some(DEFAULT_SITE_TYPE.to_string());
        true
    }

    /// Records the installed core version and derives its branch.
    pub fn set_core_version(&mut self, version: &str) {
        self.core.release = major_branch(version).to_string();
        self.core.current = version.to_string();
    }

    /// Records the latest upstream core release for the site's branch.
    pub fn set_latest_core_version(&mut self, latest: impl Into<String>, is_security: bool) {
        self.core.latest = Some(latest.into());
        self.core.is_security = is_security;
    }

    /// True if the installed core is older than the latest known release.
    pub fn has_older_core_version(&self) -> bool {
        self.core.latest.as_deref().is_some_and(|latest| {
            compare_versions(&self.core.current, latest) == std::cmp::Ordering::Less
        })
    }

    /// True if core is behind a security release.
    pub fn core_needs_security_update(&self) -> bool {
        self.has_older_core_version() && self.core.is_security
    }

    /// Replaces library inventory from `category → name → version`.
    pub fn set_libraries(&mut self, data: &BTreeMap<String, BTreeMap<String, String>>) {
        self.libraries = data
            .iter()
            .map(|(category, entries)| {
                let list = entries
                    .iter()
                    .map(|(name, version)| Library {
                        name: name.clone(),
                        version: version.clone(),
                    })
                    .collect();
                (category.clone(), list)
            })
            .collect();
    }

    /// Appends issue records reported by the site, skipping any already
    /// recorded.
    pub fn add_additional_issues(&mut self, issues: impl IntoIterator<Item = serde_json::Value>) {
        for issue in issues {
            if !self.additional_issues.contains(&issue) {
                self.additional_issues.push(issue);
            }
        }
    }

    /// Stamps a successful contact.
    pub fn mark_contacted(&mut self, now: DateTime<Utc>) {
        self.last_successful_request = Some(now);
    }

    /// True if the site has been contacted before but not within
    /// `stale_after`. Never-contacted sites are not reported as stale.
    pub fn has_not_updated_recently(&self, now: DateTime<Utc>, stale_after: Duration) -> bool {
        self.last_successful_request
            .is_some_and(|last| now.signed_duration_since(last) > stale_after)
    }

    /// Modules needing an update, security first then by name.
    pub fn modules_requiring_updates(&self) -> Vec<&ModuleUsage> {
        modules_requiring_updates(self.modules.values())
    }

    /// Pending update counts per severity.
    pub fn update_counts(&self) -> UpdateCounts {
        UpdateCounts::tally(&self.modules_requiring_updates())
    }
}

impl fmt::Debug for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Site")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .field("site_type", &self.site_type)
            .field("core", &self.core)
            .field("modules", &self.modules.len())
            .field("last_successful_request", &self.last_successful_request)
            .finish_non_exhaustive()
    }
}

/// Back-reference from a module to a site running it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteUsage {
    /// Site identifier.
    pub site_id: SiteId,
    /// Site display name at last report.
    pub site_name: String,
    /// Site URL at last report.
    pub site_url: String,
    /// Installed version at last report.
    pub version: String,
}

impl SiteUsage {
    /// Builds the usage entry for `site` running `version`.
    pub fn for_site(site: &Site, version: impl Into<String>) -> Self {
        Self {
            site_id: site.id.clone(),
            site_name: site.name.clone(),
            site_url: site.url.clone(),
            version: version.into(),
        }
    }
}

/// A software component known across the fleet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    /// Unique project name.
    pub project_name: String,
    /// Upstream releases keyed by release branch.
    #[serde(default)]
    pub releases: BTreeMap<String, CandidateVersions>,
    /// Sites running this module.
    #[serde(default)]
    pub sites: Vec<SiteUsage>,
}

impl Module {
    /// An empty module record.
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into(),
            releases: BTreeMap::new(),
            sites: Vec::new(),
        }
    }

    /// The usage entry for `site_id`, if any.
    pub fn usage_for(&self, site_id: &SiteId) -> Option<&SiteUsage> {
        self.sites.iter().find(|u| &u.site_id == site_id)
    }

    /// Inserts or updates the usage entry for `usage.site_id`.
    ///
    /// Returns `true` if a new entry was appended.
    pub fn upsert_usage(&mut self, usage: SiteUsage) -> bool {
        match self.sites.iter_mut().find(|u| u.site_id == usage.site_id) {
            Some(existing) => {
                *existing = usage;
                false
            }
            None => {
                self.sites.push(usage);
                true
            }
        }
    }

    /// Drops the usage entry for `site_id`. Returns whether one existed.
    pub fn remove_usage(&mut self, site_id: &SiteId) -> bool {
        let before = self.sites.len();
        self.sites.retain(|u| &u.site_id != site_id);
        self.sites.len() != before
    }

    /// Merges upstream releases branch by branch; incoming branches replace
    /// stored ones, others are kept. Returns whether anything changed.
    pub fn merge_releases(&mut self, releases: &BTreeMap<String, CandidateVersions>) -> bool {
        let mut changed = false;
        for (branch, candidates) in releases {
            if self.releases.get(branch) != Some(candidates) {
                self.releases.insert(branch.clone(), candidates.clone());
                changed = true;
            }
        }
        changed
    }

    /// Sites running exactly `version`.
    pub fn sites_running(&self, version: &str) -> Vec<&SiteUsage> {
        self.sites.iter().filter(|u| u.version == version).collect()
    }
}

/// Ordering for site listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteSort {
    /// Display name, A→Z.
    #[default]
    NameAsc,
    /// Display name, Z→A.
    NameDesc,
    /// URL, A→Z.
    UrlAsc,
    /// Most recently contacted first; never-contacted last.
    LastContactDesc,
}

impl SiteSort {
    /// Sorts `sites` in place. Ties fall back to the site id.
    pub fn apply(self, sites: &mut [Site]) {
        match self {
            SiteSort::NameAsc => sites.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id))),
            SiteSort::NameDesc => sites.sort_by(|a, b| b.name.cmp(&a.name).then(a.id.cmp(&b.id))),
            SiteSort::UrlAsc => sites.sort_by(|a, b| a.url.cmp(&b.url)),
            SiteSort::LastContactDesc => sites.sort_by(|a, b| {
                b.last_successful_request
                    .cmp(&a.last_successful_request)
                    .then(a.id.cmp(&b.id))
            }),
        }
    }
}

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Failed to open or use the database.
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    /// Failed to serialize or deserialize a document.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The requested document was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Another site already holds this URL.
    #[error("Site URL already registered: {0}")]
    UrlTaken(String),
}

impl From<sled::transaction::TransactionError<RegistryError>> for RegistryError {
    fn from(err: sled::transaction::TransactionError<RegistryError>) -> Self {
        match err {
            sled::transaction::TransactionError::Abort(inner) => inner,
            sled::transaction::TransactionError::Storage(e) => RegistryError::Database(e),
        }
    }
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
