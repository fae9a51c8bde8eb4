//! # Update Listings
//!
//! Turns classified modules into the ordered "requires update" list shown
//! to administrators. Security updates come first; within each bucket
//! modules are ordered by name so the output is reproducible.

use crate::branch::is_dev_release;

/// Read access to a module's classification state.
///
/// Implemented by the registry's per-site module record; kept as a trait so
/// this crate stays free of storage types.
pub trait Classified {
    /// Module project name.
    fn name(&self) -> &str;

    /// Version the site reports as installed.
    fn installed_version(&self) -> &str;

    /// Upstream version it was last compared against.
    fn latest_version(&self) -> Option<&str>;

    /// Stored security flag from the last classification.
    fn security_flag(&self) -> Option<bool>;

    /// Effective security relevance. A development snapshot is never a
    /// security update, whatever the stored flag says.
    fn is_security_update(&self) -> bool {
        self.security_flag().unwrap_or(false) && !is_dev_release(self.installed_version())
    }
}

fn normalize(version: &str) -> String {
    version.trim().to_ascii_lowercase()
}

/// True if the installed version equals the latest relevant version.
///
/// Comparison is string-exact after trimming and case-folding. A module
/// without a latest version is not considered up to date.
pub fn is_latest_version<M: Classified + ?Sized>(module: &M) -> bool {
    module
        .latest_version()
        .is_some_and(|latest| normalize(latest) == normalize(module.installed_version()))
}

/// Modules needing attention: classified, with a non-empty installed
/// version, and not already on the latest version.
///
/// Ordered security-first, then by name ascending.
pub fn modules_requiring_updates<'a, M, I>(modules: I) -> Vec<&'a M>
where
    M: Classified + 'a,
    I: IntoIterator<Item = &'a M>,
{
    let mut pending: Vec<&M> = modules
        .into_iter()
        .filter(|m| m.latest_version().is_some())
        .filter(|m| !m.installed_version().trim().is_empty())
        .filter(|m| !is_latest_version(*m))
        .collect();

    pending.sort_by(|a, b| {
        b.is_security_update()
            .cmp(&a.is_security_update())
            .then_with(|| a.name().cmp(b.name()))
    });
    pending
}

/// Counts of pending updates per severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateCounts {
    /// Pending security updates.
    pub security: usize,
    /// Pending non-security updates.
    pub regular: usize,
}

impl UpdateCounts {
    /// Tallies an already filtered list.
    pub fn tally<M: Classified>(pending: &[&M]) -> Self {
        let security = pending.iter().filter(|m| m.is_security_update()).count();
        Self {
            security,
            regular: pending.len() - security,
        }
    }
}
