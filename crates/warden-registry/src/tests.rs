//! # Registry Integration Tests
//!
//! Exercise the sled-backed registry through its trait interfaces.
//!
//! ## Test Categories
//!
//! 1. **Sites**: lookup, URL uniqueness, listing order
//! 2. **Modules**: release merges, usage index maintenance
//! 3. **Derived State**: pending updates computed from stored documents

use crate::models::{ModuleUsage, RegistryError, Site, SiteSort, SiteUsage};
use crate::registry::{ModuleRegistry, SiteRegistry, SledRegistry};
use std::collections::BTreeMap;
use warden_versions::{classify, CandidateVersions, VersionInfo};

// =============================================================================
// Helper Functions
// =============================================================================

fn registry() -> SledRegistry {
    SledRegistry::temporary().unwrap()
}

fn named_site(url: &str, name: &str) -> Site {
    let mut site = Site::new(url, "token", None);
    site.name = name.to_string();
    site
}

fn releases(branch: &str, info: VersionInfo) -> BTreeMap<String, CandidateVersions> {
    let mut map = BTreeMap::new();
    map.insert(branch.to_string(), CandidateVersions::recommended(info));
    map
}

// =============================================================================
// Sites
// =============================================================================

#[test]
fn test_site_lookup_by_url_and_id() {
    let reg = registry();
    let site = named_site("https://a.example", "Alpha");
    SiteRegistry::upsert(&reg, &site).unwrap();

    assert_eq!(reg.find_by_url("https://a.example").unwrap().unwrap().name, "Alpha");
    assert_eq!(reg.find_by_id(&site.id).unwrap().unwrap().url, "https://a.example");
    assert!(reg.find_by_url("https://a.example/").unwrap().is_none());
}

#[test]
fn test_second_site_cannot_claim_url() {
    let reg = registry();
    SiteRegistry::upsert(&reg, &named_site("https://a.example", "A")).unwrap();
    let err = SiteRegistry::upsert(&reg, &named_site("https://a.example", "B")).unwrap_err();
    assert!(matches!(err, RegistryError::UrlTaken(url) if url == "https://a.example"));
}

#[test]
fn test_list_all_sorted_by_name() {
    let reg = registry();
    for (url, name) in [
        ("https://c.example", "Charlie"),
        ("https://a.example", "alpha"),
        ("https://b.example", "Bravo"),
    ] {
        SiteRegistry::upsert(&reg, &named_site(url, name)).unwrap();
    }
    let names: Vec<_> = reg
        .list_all(SiteSort::NameAsc)
        .unwrap()
        .into_iter()
        .map(|s| s.name)
        .collect();
    assert_eq!(names, vec!["Bravo", "Charlie", "alpha"]);
}

#[test]
fn test_delete_site() {
    let reg = registry();
    let site = named_site("https://a.example", "A");
    SiteRegistry::upsert(&reg, &site).unwrap();
    assert!(reg.delete(&site.id).unwrap().is_some());
    assert!(!reg.url_exists("https://a.example").unwrap());
}

// =============================================================================
// Modules
// =============================================================================

#[test]
fn test_releases_merge_by_branch() {
    let reg = registry();
    reg.upsert_releases("views", &releases("8.x", VersionInfo::new("8.x-1.1")))
        .unwrap();
    let module = reg
        .upsert_releases("views", &releases("7.x", VersionInfo::new("7.x-3.2")))
        .unwrap();
    assert_eq!(module.releases.len(), 2);

    let module = reg
        .upsert_releases("views", &releases("8.x", VersionInfo::security("8.x-1.2")))
        .unwrap();
    assert_eq!(
        module.releases["8.x"].recommended.as_ref().unwrap().version,
        "8.x-1.2"
    );
}

#[test]
fn test_usage_index_one_entry_per_site() {
    let reg = registry();
    let site = named_site("https://a.example", "A");
    reg.upsert_usage("views", &SiteUsage::for_site(&site, "8.x-1.0"))
        .unwrap();
    let module = reg
        .upsert_usage("views", &SiteUsage::for_site(&site, "8.x-1.1"))
        .unwrap();
    assert_eq!(module.sites.len(), 1);
    assert_eq!(module.sites[0].version, "8.x-1.1");
}

#[test]
fn test_remove_usage_missing_module() {
    let reg = registry();
    let site = named_site("https://a.example", "A");
    assert!(!reg.remove_usage("views", &site.id).unwrap());
    assert!(reg.find_by_project_name("views").unwrap().is_none());
}

#[test]
fn test_remove_usage_keeps_other_sites() {
    let reg = registry();
    let a = named_site("https://a.example", "A");
    let b = named_site("https://b.example", "B");
    reg.upsert_usage("views", &SiteUsage::for_site(&a, "8.x-1.0")).unwrap();
    reg.upsert_usage("views", &SiteUsage::for_site(&b, "8.x-1.0")).unwrap();

    assert!(reg.remove_usage("views", &a.id).unwrap());
    let module = reg.find_by_project_name("views").unwrap().unwrap();
    assert_eq!(module.sites.len(), 1);
    assert_eq!(module.sites[0].site_id, b.id);
}

// =============================================================================
// Derived State
// =============================================================================

#[test]
fn test_pending_updates_from_stored_site() {
    let reg = registry();
    let mut site = named_site("https://a.example", "A");

    let views_releases = releases("8.x", VersionInfo::security("8.x-1.2"));
    let ctools_releases = releases("8.x", VersionInfo::new("8.x-3.4"));

    for (name, version, rel) in [
        ("views", "8.x-1.0", &views_releases),
        ("ctools", "8.x-3.0", &ctools_releases),
        ("token", "8.x-1.9", &releases("8.x", VersionInfo::new("8.x-1.9"))),
    ] {
        let mut usage = ModuleUsage::new(name, version);
        usage.apply(&classify(version, rel));
        site.modules.insert(name.to_string(), usage);
    }
    SiteRegistry::upsert(&reg, &site).unwrap();

    let stored = reg.find_by_id(&site.id).unwrap().unwrap();
    let pending: Vec<_> = stored
        .modules_requiring_updates()
        .into_iter()
        .map(|m| m.name.as_str())
        .collect();
    assert_eq!(pending, vec!["views", "ctools"]);

    let counts = stored.update_counts();
    assert_eq!(counts.security, 1);
    assert_eq!(counts.regular, 1);
}
