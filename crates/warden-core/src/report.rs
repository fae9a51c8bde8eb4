//! # Site Reports
//!
//! The structured payload a monitored site submits each cycle, and the
//! two-stage parse the authenticator runs over decrypted plaintext.
//!
//! ```text
//! plaintext ──▶ JSON object? ──▶ has core + url? ──▶ typed Report
//!                    │                 │                  │
//!                    └──── MalformedReport ◀──────────────┘
//! ```
//!
//! Fields that later gates judge (`time`, `key`) are parsed leniently: a
//! value of the wrong shape becomes `None` so the freshness and token gates,
//! not the parser, reject it.
//!
//! Inventory fields are lenient too. Sites serialize an empty collection as
//! `[]` where a map is expected, and send flags as `0`/`1`. Any non-object
//! inventory is read as empty and entries of the wrong shape are skipped.

use crate::error::AuthError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;
use warden_registry::SiteKind;
use warden_versions::CandidateVersions;

/// One core software entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CoreEntry {
    /// Installed core version.
    pub version: String,
}

/// One reported module.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct ContribEntry {
    /// Installed version; entries without one are skipped.
    #[serde(default, deserialize_with = "lenient_string")]
    pub version: Option<String>,

    /// Upstream releases as seen by the site, keyed by branch.
    #[serde(default, rename = "latestVersion", deserialize_with = "release_map")]
    pub latest_version: BTreeMap<String, CandidateVersions>,
}

/// A decoded status report.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Report {
    /// Claimed site URL.
    pub url: String,

    /// Presented shared secret.
    #[serde(default, deserialize_with = "lenient_string")]
    pub key: Option<String>,

    /// Report timestamp, unix seconds.
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub time: Option<i64>,

    /// Site display name.
    #[serde(default, deserialize_with = "lenient_string")]
    pub site_name: Option<String>,

    /// Core software entries keyed by software name.
    #[serde(deserialize_with = "lenient_map")]
    pub core: BTreeMap<String, CoreEntry>,

    /// Installed modules keyed by name.
    #[serde(default, deserialize_with = "lenient_map")]
    pub contrib: BTreeMap<String, ContribEntry>,

    /// Libraries as category → name → version.
    #[serde(default, deserialize_with = "library_map")]
    pub library: BTreeMap<String, BTreeMap<String, String>>,

    /// Free-form issue records.
    #[serde(default, deserialize_with = "issue_list")]
    pub additional_issues: Vec<Value>,

    /// Critical issue flag, sent as a boolean or as `0`/`1`.
    #[serde(default, deserialize_with = "lenient_flag")]
    pub critical_issue: Option<bool>,
}

impl Report {
    /// Parses decrypted plaintext.
    ///
    /// # Errors
    ///
    /// `AuthError::MalformedReport` if the plaintext is not a JSON object,
    /// lacks `core` or `url`, or has fields of the wrong shape.
    pub fn parse(plaintext: &[u8]) -> Result<Self, AuthError> {
        let value: Value = serde_json::from_slice(plaintext).map_err(|e| malformed(e.to_string()))?;
        let object = value
            .as_object()
            .ok_or_else(|| malformed("report is not an object"))?;

        for field in ["core", "url"] {
            match object.get(field) {
                None | Some(Value::Null) => {
                    return Err(malformed(format!("missing field `{}`", field)))
                }
                _ => {}
            }
        }
        if object
            .get("url")
            .and_then(Value::as_str)
            .map_or(true, |u| u.trim().is_empty())
        {
            return Err(malformed("`url` must be a non-empty string"));
        }

        serde_json::from_value(value).map_err(|e| malformed(e.to_string()))
    }

    /// Installed core version for a site of `kind`.
    ///
    /// Falls back to the first entry in key order when the kind's own key
    /// is absent.
    pub fn core_version(&self, kind: &SiteKind) -> Option<&str> {
        self.core
            .get(kind.core_key())
            .or_else(|| self.core.values().next())
            .map(|entry| entry.version.as_str())
    }

    /// Modules that carry an installed version.
    pub fn modules(&self) -> impl Iterator<Item = (&str, &ContribEntry, &str)> {
        self.contrib.iter().filter_map(|(name, entry)| {
            entry
                .version
                .as_deref()
                .filter(|v| !v.trim().is_empty())
                .map(|v| (name.as_str(), entry, v))
        })
    }
}

fn malformed(reason: impl Into<String>) -> AuthError {
    AuthError::MalformedReport {
        reason: reason.into(),
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

fn lenient_timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_flag<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Bool(b) => Some(b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim() {
            "1" | "true" => Some(true),
            "" | "0" | "false" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

/// Sites may send an empty list where a map is expected.
fn lenient_map<'de, D, T>(d: D) -> Result<BTreeMap<String, T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(match Value::deserialize(d)? {
        Value::Object(map) => map
            .into_iter()
            .filter_map(|(key, value)| serde_json::from_value(value).ok().map(|v| (key, v)))
            .collect(),
        _ => BTreeMap::new(),
    })
}

fn release_map<'de, D: Deserializer<'de>>(
    d: D,
) -> Result<BTreeMap<String, CandidateVersions>, D::Error> {
    lenient_map(d)
}

fn library_map<'de, D: Deserializer<'de>>(
    d: D,
) -> Result<BTreeMap<String, BTreeMap<String, String>>, D::Error> {
    let Value::Object(categories) = Value::deserialize(d)? else {
        return Ok(BTreeMap::new());
    };
    Ok(categories
        .into_iter()
        .filter_map(|(category, entries)| match entries {
            Value::Object(entries) => Some((category, entries)),
            _ => None,
        })
        .map(|(category, entries)| {
            let versions = entries
                .into_iter()
                .filter_map(|(name, version)| match version {
                    Value::String(v) => Some((name, v)),
                    Value::Number(n) => Some((name, n.to_string())),
                    _ => None,
                })
                .collect();
            (category, versions)
        })
        .collect())
}

fn issue_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Value>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Null => Vec::new(),
        Value::Array(items) => items,
        Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
        other => vec![other],
    })
}
