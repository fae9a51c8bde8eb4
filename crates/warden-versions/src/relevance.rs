//! # Relevant Version Selection
//!
//! Given what a site has installed and what upstream advertises for that
//! release branch, decide which upstream version the site should be
//! compared against and whether the install is still supported.
//!
//! ## Selection Rules
//!
//! `recommended` is the default. `other` replaces it when it is more
//! relevant to the install, judged in this order:
//!
//! 1. A candidate on the installed branch beats one that is not.
//! 2. Then a candidate in the installed point series (`1.x` for `1.3`)
//!    beats one that is not.
//! 3. Then the strictly newer candidate under [`compare_versions`] wins.
//!    An exact tie keeps `recommended`.
//!
//! With no candidates at all the module is unclassifiable; callers record a
//! gap and carry on.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::branch::{compare_versions, is_dev_release, major_branch, Version};
use crate::release::{BranchKind, CandidateVersions, RelevantVersion, VersionInfo};

/// Chooses the upstream version an installed version should track.
///
/// Returns `None` when neither candidate exists.
///
/// ```rust
/// use warden_versions::{relevant_latest_version, BranchKind, CandidateVersions, VersionInfo};
///
/// let candidates = CandidateVersions::recommended(VersionInfo::new("9.x-1.0"))
///     .with_other(VersionInfo::new("8.x-1.3"));
/// let chosen = relevant_latest_version("8.x-1.0", &candidates).unwrap();
/// assert_eq!(chosen.info.version, "8.x-1.3");
/// assert_eq!(chosen.kind, BranchKind::Other);
/// ```
pub fn relevant_latest_version(
    installed: &str,
    candidates: &CandidateVersions,
) -> Option<RelevantVersion> {
    let pick = |info: &VersionInfo, kind| RelevantVersion {
        info: info.clone(),
        kind,
    };

    match (&candidates.recommended, &candidates.other) {
        (None, None) => None,
        (Some(rec), None) => Some(pick(rec, BranchKind::Recommended)),
        (None, Some(other)) => Some(pick(other, BranchKind::Other)),
        (Some(rec), Some(other)) => {
            if other_is_more_relevant(installed, &rec.version, &other.version) {
                Some(pick(other, BranchKind::Other))
            } else {
                Some(pick(rec, BranchKind::Recommended))
            }
        }
    }
}

/// How closely a candidate matches the install: (same branch, same series).
fn affinity(installed: &Version<'_>, candidate: &str) -> (bool, bool) {
    let candidate = Version::parse(candidate);
    (
        candidate.branch() == installed.branch(),
        !installed.series().is_empty() && candidate.series() == installed.series(),
    )
}

fn other_is_more_relevant(installed: &str, recommended: &str, other: &str) -> bool {
    let installed = Version::parse(installed);
    let rec = affinity(&installed, recommended);
    let oth = affinity(&installed, other);
    if rec != oth {
        return oth > rec;
    }
    compare_versions(other, recommended) == Ordering::Greater
}

/// True when upstream no longer tracks the installed release branch.
///
/// `candidates` is the entry for the installed branch, if any. The install
/// is unsupported when there is no entry, or when neither candidate sits on
/// the installed branch.
pub fn is_unsupported(candidates: Option<&CandidateVersions>, installed: &str) -> bool {
    let Some(candidates) = candidates else {
        return true;
    };
    let branch = major_branch(installed);
    let on_branch = |info: &Option<VersionInfo>| {
        info.as_ref()
            .is_some_and(|i| major_branch(&i.version) == branch)
    };
    !(on_branch(&candidates.recommended) || on_branch(&candidates.other))
}

/// Looks up the candidates for the installed version's branch.
pub fn candidates_for<'a>(
    releases: &'a BTreeMap<String, CandidateVersions>,
    installed: &str,
) -> Option<&'a CandidateVersions> {
    releases.get(major_branch(installed))
}

/// Whether the chosen upstream version makes this install a security
/// concern. Development snapshots never are.
pub fn is_security_relevant(installed: &str, chosen: &VersionInfo) -> bool {
    chosen.is_security && !is_dev_release(installed)
}

/// Full classification of one installed module against upstream releases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// The version to compare against, `None` when unclassifiable.
    pub latest: Option<RelevantVersion>,
    /// Security relevance of `latest`, `None` when unclassifiable.
    pub is_security: Option<bool>,
    /// Whether the installed branch has dropped out of upstream tracking.
    pub is_unsupported: bool,
}

impl Classification {
    /// True when no upstream version could be chosen.
    pub fn is_gap(&self) -> bool {
        self.latest.is_none()
    }
}

/// Classifies `installed` against a module's branch → candidates map.
pub fn classify(installed: &str, releases: &BTreeMap<String, CandidateVersions>) -> Classification {
    let candidates = candidates_for(releases, installed);
    let latest = candidates.and_then(|c| relevant_latest_version(installed, c));
    let is_security = latest
        .as_ref()
        .map(|chosen| is_security_relevant(installed, &chosen.info));

    Classification {
        latest,
        is_security,
        is_unsupported: is_unsupported(candidates, installed),
    }
}
