//! # Branch Extraction and Version Ordering
//!
//! Version strings follow a two-part scheme, `<branch>-<point>`:
//!
//! ```text
//!   8.x-1.3-beta2
//!   └┬┘ └────┬──┘
//!  branch   point  (series 1, numbers [1, 3], stage beta 2)
//! ```
//!
//! The branch names the platform release line the component targets; the
//! point is the component's own release within that line. A string without
//! a `-` is treated as all branch (core versions such as `8.9.1` look like
//! this). Nothing here ever fails: malformed input degrades to a coarser
//! comparison instead of aborting ingestion.
//!
//! ## Ordering
//!
//! [`compare_versions`] is a total order with these tie-break rules, applied
//! in sequence until one decides:
//!
//! | Step | Compares | Notes |
//! |------|----------|-------|
//! | 1 | Branch numeric series | `8.x` → `[8]`, `8.9.1` → `[8, 9, 1]` |
//! | 2 | Branch text | only reached when the series tie (e.g. both empty) |
//! | 3 | Point numeric series | `1.10` > `1.9`; a longer series wins a shared prefix |
//! | 4 | Point stage | `dev` < unknown < `alpha` < `beta` < `rc` < stable |
//! | 5 | Stage number | `beta2` > `beta1` |
//! | 6 | Raw bytes | keeps the order total for otherwise-equal strings |
//!
//! This is deliberately not semantic versioning: `x` placeholders, dev
//! snapshots and missing separators all have defined positions above.

use std::cmp::Ordering;

/// Separator between branch and point.
pub const BRANCH_SEPARATOR: char = '-';

/// Token marking a development snapshot (`8.x-1.x-dev`).
pub const DEV_MARKER: &str = "dev";

/// Returns the `<branch>` segment of a version string.
///
/// Strings with no separator are returned whole.
///
/// ```rust
/// use warden_versions::major_branch;
///
/// assert_eq!(major_branch("8.x-1.3"), "8.x");
/// assert_eq!(major_branch("8.9.1"), "8.9.1");
/// ```
pub fn major_branch(version: &str) -> &str {
    let version = version.trim();
    match version.split_once(BRANCH_SEPARATOR) {
        Some((branch, _)) => branch,
        None => version,
    }
}

/// Returns the leading numeric component of the branch (`8.x-1.0` → `8`,
/// `8.9.1` → `8`), or the whole branch when it does not start with a number.
///
/// Used to match a core install against a release line regardless of how
/// many point components the installed string carries.
pub fn release_line(version: &str) -> &str {
    let branch = major_branch(version);
    let head = branch.split('.').next().unwrap_or(branch);
    if !head.is_empty() && head.bytes().all(|b| b.is_ascii_digit()) {
        head
    } else {
        branch
    }
}

/// True if the version is a development snapshot.
///
/// The marker must be a whole `-`-separated token, case-insensitive, so
/// `8.x-1.x-dev` matches while `8.x-1.0-devel` and `devtools-1.0` do not.
pub fn is_dev_release(version: &str) -> bool {
    version
        .trim()
        .split(BRANCH_SEPARATOR)
        .any(|token| token.eq_ignore_ascii_case(DEV_MARKER))
}

/// Pre-release stage of a point release, in ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    /// Development snapshot.
    Dev,
    /// Qualifier we do not recognize.
    Unknown,
    /// Alpha pre-release.
    Alpha(u64),
    /// Beta pre-release.
    Beta(u64),
    /// Release candidate.
    Rc(u64),
    /// Full release.
    Stable,
}

impl Stage {
    fn parse(qualifier: Option<&str>) -> Self {
        let Some(q) = qualifier else {
            return Stage::Stable;
        };
        let q = q.to_ascii_lowercase();
        if q == DEV_MARKER || q.ends_with("-dev") {
            return Stage::Dev;
        }
        let numbered = |prefix: &str| -> Option<u64> {
            let rest = q.strip_prefix(prefix)?;
            if rest.is_empty() {
                return Some(0);
            }
            rest.parse().ok()
        };
        if let Some(n) = numbered("alpha") {
            Stage::Alpha(n)
        } else if let Some(n) = numbered("beta") {
            Stage::Beta(n)
        } else if let Some(n) = numbered("rc") {
            Stage::Rc(n)
        } else {
            Stage::Unknown
        }
    }
}

/// A version string split into comparable parts. Borrows the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version<'a> {
    raw: &'a str,
    branch: &'a str,
    point: &'a str,
}

impl<'a> Version<'a> {
    /// Splits `raw` at the first separator.
    pub fn parse(raw: &'a str) -> Self {
        let raw = raw.trim();
        let (branch, point) = raw.split_once(BRANCH_SEPARATOR).unwrap_or((raw, ""));
        Self { raw, branch, point }
    }

    /// The `<branch>` segment.
    pub fn branch(&self) -> &'a str {
        self.branch
    }

    /// The `<point>` segment, empty when there is no separator.
    pub fn point(&self) -> &'a str {
        self.point
    }

    /// The point's release series, i.e. its first dotted component
    /// (`1.3` → `1`). Empty when there is no point.
    pub fn series(&self) -> &'a str {
        let numbers = self.point.split(BRANCH_SEPARATOR).next().unwrap_or("");
        numbers.split('.').next().unwrap_or("")
    }

    fn branch_numbers(&self) -> Vec<u64> {
        numeric_series(self.branch)
    }

    fn point_numbers(&self) -> Vec<u64> {
        numeric_series(self.point.split(BRANCH_SEPARATOR).next().unwrap_or(""))
    }

    fn stage(&self) -> Stage {
        Stage::parse(self.point.split_once(BRANCH_SEPARATOR).map(|(_, q)| q))
    }
}

/// Leading dot-separated numeric components; stops at the first
/// non-numeric one (`8.x` → `[8]`, `1.10.2` → `[1, 10, 2]`).
fn numeric_series(segment: &str) -> Vec<u64> {
    segment
        .split('.')
        .map_while(|part| part.parse::<u64>().ok())
        .collect()
}

/// Total branch-then-point ordering over version strings.
///
/// See the module documentation for the tie-break table.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let (va, vb) = (Version::parse(a), Version::parse(b));

    va.branch_numbers()
        .cmp(&vb.branch_numbers())
        .then_with(|| va.branch.cmp(vb.branch))
        .then_with(|| va.point_numbers().cmp(&vb.point_numbers()))
        .then_with(|| va.stage().cmp(&vb.stage()))
        .then_with(|| va.raw.cmp(vb.raw))
}
