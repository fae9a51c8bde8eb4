//! Upstream release records.
//!
//! These are the shapes in which release information arrives in site
//! reports and is stored on registry modules. Field names follow the report
//! wire format (`isSecurity`).

use serde::{Deserialize, Serialize};

/// One upstream version and whether it is a security release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    /// Version string, e.g. `8.x-1.3`.
    pub version: String,

    /// Whether upgrading to this version fixes a security advisory.
    #[serde(default)]
    pub is_security: bool,
}

impl VersionInfo {
    /// A non-security release.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            is_security: false,
        }
    }

    /// A security release.
    pub fn security(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            is_security: true,
        }
    }
}

/// The two upstream tracks a release branch may advertise.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateVersions {
    /// The maintainers' recommended release.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended: Option<VersionInfo>,

    /// An alternate maintained release line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other: Option<VersionInfo>,
}

impl CandidateVersions {
    /// Candidates with only a recommended release.
    pub fn recommended(info: VersionInfo) -> Self {
        Self {
            recommended: Some(info),
            other: None,
        }
    }

    /// Adds an alternate release.
    pub fn with_other(mut self, info: VersionInfo) -> Self {
        self.other = Some(info);
        self
    }

    /// True when neither track carries a version.
    pub fn is_empty(&self) -> bool {
        self.recommended.is_none() && self.other.is_none()
    }
}

/// Which track a chosen version came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchKind {
    /// The recommended track.
    Recommended,
    /// The alternate track.
    Other,
}

/// Result of choosing the most relevant upstream version for an install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelevantVersion {
    /// The chosen upstream version.
    pub info: VersionInfo,
    /// The track it came from.
    pub kind: BranchKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_wire_format() {
        let json = r#"{"recommended":{"version":"8.x-1.2","isSecurity":true}}"#;
        let parsed: CandidateVersions = serde_json::from_str(json).unwrap();
        assert_eq!(parsed, CandidateVersions::recommended(VersionInfo::security("8.x-1.2")));
        assert_eq!(serde_json::to_string(&parsed).unwrap(), json);
    }

    #[test]
    fn test_missing_security_flag_defaults_false() {
        let parsed: VersionInfo = serde_json::from_str(r#"{"version":"1.0"}"#).unwrap();
        assert!(!parsed.is_security);
    }

    #[test]
    fn test_empty_candidates() {
        assert!(CandidateVersions::default().is_empty());
        assert!(!CandidateVersions::recommended(VersionInfo::new("1")).is_empty());
    }
}
