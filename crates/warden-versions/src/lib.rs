//! # Warden Versions - Release Classification
//!
//! Pure, deterministic functions that decide whether an installed component
//! is current, outdated, a security concern, or off a supported release
//! branch. No I/O; everything here is safe to call from any thread.
//!
//! ## Components
//!
//! | Function | Purpose |
//! |----------|---------|
//! | [`major_branch`] | `<branch>` segment of `<branch>-<point>` |
//! | [`is_dev_release`] | Development snapshot detection |
//! | [`compare_versions`] | Branch-then-point total order |
//! | [`relevant_latest_version`] | Pick `recommended` or `other` for an install |
//! | [`is_unsupported`] | Install branch dropped by upstream |
//! | [`classify`] | All of the above for one module |
//! | [`modules_requiring_updates`] | Severity-ordered update list |
//!
//! ## Quick Start
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use warden_versions::{classify, CandidateVersions, VersionInfo};
//!
//! let mut releases = BTreeMap::new();
//! releases.insert(
//!     "8.x".to_string(),
//!     CandidateVersions::recommended(VersionInfo::security("8.x-1.2")),
//! );
//!
//! let result = classify("8.x-1.0", &releases);
//! assert_eq!(result.latest.unwrap().info.version, "8.x-1.2");
//! assert_eq!(result.is_security, Some(true));
//! assert!(!result.is_unsupported);
//! ```

mod branch;
mod relevance;
mod release;
mod severity;

pub use branch::{
    compare_versions, is_dev_release, major_branch, release_line, Stage, Version,
    BRANCH_SEPARATOR, DEV_MARKER,
};
pub use relevance::{
    candidates_for, classify, is_security_relevant, is_unsupported, relevant_latest_version,
    Classification,
};
pub use release::{BranchKind, CandidateVersions, RelevantVersion, VersionInfo};
pub use severity::{is_latest_version, modules_requiring_updates, Classified, UpdateCounts};
