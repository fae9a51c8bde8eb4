//! # Orchestrator Tests Against Instrumented Collaborators
//!
//! These tests swap the registries and notifier for doubles that count
//! calls, stall, or fail, to check properties the sled-backed path cannot
//! show on its own.
//!
//! ## Test Categories
//!
//! 1. **Gate Ordering**: cheap gates before lookup, lookup before token
//! 2. **Deadlines**: a stalled store surfaces as a timeout
//! 3. **Notification**: delivery failure never rolls back state
//! 4. **Refresh**: per-site failure isolation
//! 5. **Concurrent Edits**: deletes and token changes that land while a
//!    cycle is in flight survive it

use crate::auth::Authenticator;
use crate::error::{AuthError, IngestError, NotifyError, StoreError, TransportError};
use crate::notify::{DashboardUpdate, Notifier};
use crate::reconcile::Reconciler;
use crate::store::Stores;
use crate::transport::ReportTransport;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use warden_codec::{KeyPair, PayloadCodec};
use warden_registry::{
    Module, ModuleRegistry, Result as RegistryResult, Site, SiteId, SiteRegistry, SiteSort,
    SiteUsage, SledRegistry,
};
use warden_versions::{CandidateVersions, VersionInfo};

// =============================================================================
// Test Doubles
// =============================================================================

type LookupHook = Box<dyn FnOnce(&SledRegistry, &Site) + Send>;

/// Delegates to a temporary sled registry, counting lookups and optionally
/// stalling them. An armed hook runs once, right after a URL lookup finds a
/// site, to stand in for an administrator acting mid-cycle.
struct Instrumented {
    inner: SledRegistry,
    lookups: AtomicUsize,
    stall: Duration,
    after_lookup: Mutex<Option<LookupHook>>,
}

impl Instrumented {
    fn new(stall: Duration) -> Self {
        Self {
            inner: SledRegistry::temporary().unwrap(),
            lookups: AtomicUsize::new(0),
            stall,
            after_lookup: Mutex::new(None),
        }
    }

    fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    fn arm<F>(&self, hook: F)
    where
        F: FnOnce(&SledRegistry, &Site) + Send + 'static,
    {
        *self.after_lookup.lock().unwrap() = Some(Box::new(hook));
    }
}

impl SiteRegistry for Instrumented {
    fn find_by_url(&self, url: &str) -> RegistryResult<Option<Site>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if !self.stall.is_zero() {
            std::thread::sleep(self.stall);
        }
        let found = self.inner.find_by_url(url)?;
        if let Some(site) = &found {
            if let Some(hook) = self.after_lookup.lock().unwrap().take() {
                hook(&self.inner, site);
            }
        }
        Ok(found)
    }

    fn find_by_id(&self, id: &SiteId) -> RegistryResult<Option<Site>> {
        self.inner.find_by_id(id)
    }

    fn upsert(&self, site: &Site) -> RegistryResult<()> {
        SiteRegistry::upsert(&self.inner, site)
    }

    fn update(&self, id: &SiteId, mutate: &dyn Fn(&mut Site) -> bool) -> RegistryResult<Option<Site>> {
        self.inner.update(id, mutate)
    }

    fn delete(&self, id: &SiteId) -> RegistryResult<Option<Site>> {
        self.inner.delete(id)
    }

    fn list_all(&self, sort: SiteSort) -> RegistryResult<Vec<Site>> {
        self.inner.list_all(sort)
    }

    fn url_exists(&self, url: &str) -> RegistryResult<bool> {
        self.inner.url_exists(url)
    }
}

impl ModuleRegistry for Instrumented {
    fn find_by_project_name(&self, name: &str) -> RegistryResult<Option<Module>> {
        self.inner.find_by_project_name(name)
    }

    fn upsert_releases(
        &self,
        name: &str,
        releases: &BTreeMap<String, CandidateVersions>,
    ) -> RegistryResult<Module> {
        self.inner.upsert_releases(name, releases)
    }

    fn upsert_usage(&self, name: &str, usage: &SiteUsage) -> RegistryResult<Module> {
        self.inner.upsert_usage(name, usage)
    }

    fn remove_usage(&self, name: &str, site_id: &SiteId) -> RegistryResult<bool> {
        self.inner.remove_usage(name, site_id)
    }

    fn list_modules(&self) -> RegistryResult<Vec<Module>> {
        self.inner.list_modules()
    }

    fn persist(&self) -> RegistryResult<()> {
        self.inner.persist()
    }
}

struct FailingNotifier {
    calls: AtomicUsize,
}

#[async_trait]
impl Notifier for FailingNotifier {
    async fn emit(&self, _update: DashboardUpdate) -> Result<(), NotifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(NotifyError::Closed)
    }
}

/// Serves sealed reports for known URLs and fails for the rest.
struct ScriptedTransport {
    bodies: BTreeMap<String, Vec<u8>>,
}

#[async_trait]
impl ReportTransport for ScriptedTransport {
    async fn fetch_report(&self, site: &Site) -> Result<Vec<u8>, TransportError> {
        self.bodies
            .get(&site.url)
            .cloned()
            .ok_or_else(|| TransportError::Status {
                url: site.url.clone(),
                status: 503,
            })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

struct Harness {
    codec: Arc<PayloadCodec>,
    registry: Arc<Instrumented>,
    notifier: Arc<FailingNotifier>,
    reconciler: Reconciler,
}

fn harness(stall: Duration, store_timeout: Duration) -> Harness {
    let codec = Arc::new(PayloadCodec::new(KeyPair::generate()));
    let registry = Arc::new(Instrumented::new(stall));
    let notifier = Arc::new(FailingNotifier {
        calls: AtomicUsize::new(0),
    });
    let reconciler = Reconciler::new(
        Authenticator::new(codec.clone(), 20),
        Stores::shared(registry.clone(), store_timeout),
        notifier.clone(),
        Duration::from_millis(100),
    );
    Harness {
        codec,
        registry,
        notifier,
        reconciler,
    }
}

fn default_harness() -> Harness {
    harness(Duration::ZERO, Duration::from_secs(5))
}

fn register(h: &Harness, url: &str, token: &str) -> Site {
    let site = Site::new(url, token, None);
    SiteRegistry::upsert(h.registry.as_ref(), &site).unwrap();
    site
}

fn sealed_report(h: &Harness, url: &str, key: &str, time: i64) -> Vec<u8> {
    let report = json!({
        "url": url,
        "key": key,
        "time": time,
        "site_name": "Example",
        "core": {"drupal": {"version": "8.9.1"}},
        "contrib": {
            "views": {
                "version": "8.x-1.0",
                "latestVersion": {"8.x": {"recommended": {"version": "8.x-1.2", "isSecurity": true}}}
            }
        }
    });
    h.codec
        .encrypt(report.to_string().as_bytes())
        .unwrap()
        .into_bytes()
}

// =============================================================================
// Gate Ordering
// =============================================================================

#[tokio::test]
async fn test_cheap_gates_run_before_lookup() {
    let h = default_harness();
    let now = Utc::now();

    let err = h.reconciler.ingest(b"not a ciphertext", now).await.unwrap_err();
    assert!(matches!(err, IngestError::Auth(AuthError::MalformedCiphertext)));

    let stale = sealed_report(&h, "https://a.example", "k", now.timestamp() - 21);
    let err = h.reconciler.ingest(&stale, now).await.unwrap_err();
    assert!(matches!(err, IngestError::Auth(AuthError::ReplaySuspected { .. })));

    let no_url = h.codec.encrypt(br#"{"core": {}}"#).unwrap().into_bytes();
    let err = h.reconciler.ingest(&no_url, now).await.unwrap_err();
    assert!(matches!(err, IngestError::Auth(AuthError::MalformedReport { .. })));

    assert_eq!(h.registry.lookups(), 0);
}

#[tokio::test]
async fn test_unknown_url_never_reaches_token_check() {
    let h = default_harness();
    register(&h, "https://a.example", "s3cret");
    let now = Utc::now();

    // Right token, wrong URL: identity fails first.
    let body = sealed_report(&h, "https://b.example", "s3cret", now.timestamp());
    let err = h.reconciler.ingest(&body, now).await.unwrap_err();
    assert!(matches!(
        err,
        IngestError::Auth(AuthError::UnknownSite { ref url }) if url == "https://b.example"
    ));
    assert_eq!(h.registry.lookups(), 1);

    let body = sealed_report(&h, "https://a.example", "guess", now.timestamp());
    let err = h.reconciler.ingest(&body, now).await.unwrap_err();
    assert!(matches!(err, IngestError::Auth(AuthError::TokenMismatch { .. })));
    assert_eq!(h.registry.lookups(), 2);
}

// =============================================================================
// Deadlines
// =============================================================================

#[tokio::test]
async fn test_stalled_lookup_times_out() {
    let h = harness(Duration::from_millis(500), Duration::from_millis(50));
    register(&h, "https://a.example", "s3cret");
    let now = Utc::now();

    let body = sealed_report(&h, "https://a.example", "s3cret", now.timestamp());
    let err = h.reconciler.ingest(&body, now).await.unwrap_err();
    assert!(matches!(
        err,
        IngestError::Store(StoreError::Timeout {
            operation: "find_by_url"
        })
    ));
    assert!(!err.is_rejection());
}

// =============================================================================
// Notification
// =============================================================================

#[tokio::test]
async fn test_failed_notification_keeps_state() {
    let h = default_harness();
    let site = register(&h, "https://a.example", "s3cret");
    let now = Utc::now();

    let body = sealed_report(&h, "https://a.example", "s3cret", now.timestamp());
    let outcome = h.reconciler.ingest(&body, now).await.unwrap();
    assert!(!outcome.notified);
    assert_eq!(h.notifier.calls.load(Ordering::SeqCst), 1);

    let stored = h.registry.find_by_id(&site.id).unwrap().unwrap();
    assert_eq!(stored.name, "Example");
    assert_eq!(stored.last_successful_request, Some(now));
    assert_eq!(stored.modules["views"].latest_version.as_deref(), Some("8.x-1.2"));
}

// =============================================================================
// Refresh
// =============================================================================

#[tokio::test]
async fn test_refresh_isolates_transport_failures() {
    let h = default_harness();
    let up = register(&h, "https://up.example", "s3cret");
    let down = register(&h, "https://down.example", "s3cret");
    let also_up = register(&h, "https://zz-up.example", "other");

    let now = Utc::now().timestamp();
    let mut bodies = BTreeMap::new();
    bodies.insert(up.url.clone(), sealed_report(&h, &up.url, "s3cret", now));
    bodies.insert(also_up.url.clone(), sealed_report(&h, &also_up.url, "other", now));
    let transport = ScriptedTransport { bodies };

    let summary = h.reconciler.refresh_all(&transport).await.unwrap();
    assert_eq!(summary.attempted(), 3);
    assert_eq!(summary.refreshed.len(), 2);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].site_id, down.id);
    assert!(summary.failed[0].error.contains("503"));
}

// =============================================================================
// Concurrent Edits
// =============================================================================

/// Removes a site and its usage entries the way an administrator's delete
/// does.
fn delete_with_usage(registry: &SledRegistry, id: &SiteId) {
    registry.delete(id).unwrap();
    for module in registry.list_modules().unwrap() {
        registry.remove_usage(&module.project_name, id).unwrap();
    }
}

#[tokio::test]
async fn test_delete_during_cycle_stays_deleted() {
    let h = default_harness();
    let site = register(&h, "https://a.example", "s3cret");
    let now = Utc::now();

    let body = sealed_report(&h, "https://a.example", "s3cret", now.timestamp());
    h.reconciler.ingest(&body, now).await.unwrap();

    let id = site.id.clone();
    h.registry.arm(move |inner, _| delete_with_usage(inner, &id));
    let body = sealed_report(&h, "https://a.example", "s3cret", now.timestamp());
    let err = h.reconciler.ingest(&body, now).await.unwrap_err();
    assert!(matches!(err, IngestError::Auth(AuthError::UnknownSite { .. })));

    assert!(h.registry.find_by_id(&site.id).unwrap().is_none());
    assert!(!h.registry.url_exists("https://a.example").unwrap());
    let views = h.registry.find_by_project_name("views").unwrap().unwrap();
    assert!(views.usage_for(&site.id).is_none());
}

#[tokio::test]
async fn test_token_change_during_cycle_survives() {
    let h = default_harness();
    let site = register(&h, "https://a.example", "s3cret");
    let now = Utc::now();

    h.registry.arm(|inner, found| {
        inner
            .update(&found.id, &|s| {
                s.set_token("rotated");
                s.auth_user = Some("admin".into());
                true
            })
            .unwrap();
    });
    let body = sealed_report(&h, "https://a.example", "s3cret", now.timestamp());
    h.reconciler.ingest(&body, now).await.unwrap();

    let stored = h.registry.find_by_id(&site.id).unwrap().unwrap();
    assert!(stored.token_matches("rotated"));
    assert_eq!(stored.auth_user.as_deref(), Some("admin"));
    assert_eq!(stored.name, "Example");
    assert_eq!(stored.last_successful_request, Some(now));

    let body = sealed_report(&h, "https://a.example", "s3cret", now.timestamp());
    let err = h.reconciler.ingest(&body, now).await.unwrap_err();
    assert!(matches!(err, IngestError::Auth(AuthError::TokenMismatch { .. })));
}

#[tokio::test]
async fn test_release_propagation_skips_deleted_site() {
    let h = default_harness();
    let site = register(&h, "https://a.example", "s3cret");
    let now = Utc::now();
    let body = sealed_report(&h, "https://a.example", "s3cret", now.timestamp());
    h.reconciler.ingest(&body, now).await.unwrap();

    // Site gone, usage entry left behind.
    h.registry.inner.delete(&site.id).unwrap();

    let mut releases = BTreeMap::new();
    releases.insert(
        "8.x".to_string(),
        CandidateVersions::recommended(VersionInfo::security("8.x-1.9")),
    );
    let touched = h
        .reconciler
        .apply_module_releases("views", releases)
        .await
        .unwrap();
    assert_eq!(touched, 0);
    assert!(h.registry.find_by_id(&site.id).unwrap().is_none());

    let touched = h
        .reconciler
        .apply_core_release("8.x", VersionInfo::security("8.9.14"))
        .await
        .unwrap();
    assert_eq!(touched, 0);
    assert!(h.registry.find_by_id(&site.id).unwrap().is_none());
}
