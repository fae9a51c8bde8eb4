//! # Update Authenticator
//!
//! Validates an inbound report through five ordered gates. Any failure
//! aborts the cycle with one [`AuthError`].
//!
//! ```text
//!  body ─▶ [1 decrypt] ─▶ [2 parse] ─▶ [3 freshness] ─▶ [4 identity] ─▶ [5 token] ─▶ (Site, Report)
//!              │              │              │                │              │
//!     MalformedCiphertext  Malformed     ReplaySuspected   UnknownSite   TokenMismatch
//!                          Report
//! ```
//!
//! ## Threat Model
//!
//! | Threat | Gate | Defense |
//! |--------|------|---------|
//! | Forged report | 1 | AEAD under the server key |
//! | Garbage input | 2 | Structural checks before any lookup |
//! | Replay of captured report | 3 | `now - w <= time <= now + w` |
//! | Unregistered sender | 4 | Exact URL lookup |
//! | Site impersonation | 5 | Constant-time token comparison |
//! | Token probing | 4 before 5 | No token comparison without a known URL |
//!
//! Gates 1-3 are pure and run in [`Authenticator::open`]. Gates 4-5 need
//! the site registry; the orchestrator performs the lookup under a
//! deadline and hands the result to [`Authenticator::verify`].

use crate::error::AuthError;
use crate::report::Report;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use warden_codec::PayloadCodec;
use warden_registry::Site;

/// Default freshness window in seconds.
pub const DEFAULT_FRESHNESS_WINDOW_SECS: u64 = 20;

/// Report authenticator.
#[derive(Clone)]
pub struct Authenticator {
    codec: Arc<PayloadCodec>,
    window_secs: u64,
}

impl Authenticator {
    /// Creates an authenticator with the given freshness window.
    pub fn new(codec: Arc<PayloadCodec>, window_secs: u64) -> Self {
        Self { codec, window_secs }
    }

    /// The freshness window in seconds.
    pub fn window_secs(&self) -> u64 {
        self.window_secs
    }

    /// Runs gates 1-3: decrypt, parse, freshness.
    pub fn open(&self, body: &[u8], now: DateTime<Utc>) -> Result<Report, AuthError> {
        let plaintext = self
            .codec
            .decrypt(body)
            .map_err(|_| AuthError::MalformedCiphertext)?;
        let report = Report::parse(&plaintext)?;
        self.check_freshness(&report, now)?;
        Ok(report)
    }

    /// Gate 3 alone.
    pub fn check_freshness(&self, report: &Report, now: DateTime<Utc>) -> Result<(), AuthError> {
        match report.time {
            Some(time) if now.timestamp().abs_diff(time) <= self.window_secs => Ok(()),
            _ => Err(AuthError::ReplaySuspected {
                url: report.url.clone(),
            }),
        }
    }

    /// Runs gates 4-5 against the result of the URL lookup.
    pub fn verify(&self, found: Option<Site>, report: &Report) -> Result<Site, AuthError> {
        let site = found.ok_or_else(|| AuthError::UnknownSite {
            url: report.url.clone(),
        })?;
        match report.key.as_deref() {
            Some(key) if site.token_matches(key) => Ok(site),
            _ => Err(AuthError::TokenMismatch {
                url: report.url.clone(),
            }),
        }
    }
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("window_secs", &self.window_secs)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use warden_codec::KeyPair;

    fn setup() -> (Authenticator, Arc<PayloadCodec>) {
        let codec = Arc::new(PayloadCodec::new(KeyPair::generate()));
        (
            Authenticator::new(codec.clone(), DEFAULT_FRESHNESS_WINDOW_SECS),
            codec,
        )
    }

    fn body(codec: &PayloadCodec, time: i64, key: &str) -> Vec<u8> {
        let plaintext = json!({
            "url": "https://a.example",
            "key": key,
            "time": time,
            "core": {"drupal": {"version": "8.9.1"}}
        });
        codec
            .encrypt(plaintext.to_string().as_bytes())
            .unwrap()
            .into_bytes()
    }

    #[test]
    fn test_window_is_inclusive() {
        let (auth, codec) = setup();
        let now = Utc::now();
        let t = now.timestamp();

        for offset in [-20, -1, 0, 1, 20] {
            assert!(auth.open(&body(&codec, t + offset, "k"), now).is_ok(), "offset {offset}");
        }
        for offset in [-21, 21, -3600] {
            assert!(
                matches!(
                    auth.open(&body(&codec, t + offset, "k"), now),
                    Err(AuthError::ReplaySuspected { ref url }) if url == "https://a.example"
                ),
                "offset {offset}"
            );
        }
    }

    #[test]
    fn test_extreme_timestamp_does_not_overflow() {
        let (auth, codec) = setup();
        let err = auth.open(&body(&codec, i64::MIN, "k"), Utc::now()).unwrap_err();
        assert!(matches!(err, AuthError::ReplaySuspected { .. }));
    }

    #[test]
    fn test_garbage_body() {
        let (auth, _) = setup();
        assert_eq!(
            auth.open(b"garbage", Utc::now()).unwrap_err(),
            AuthError::MalformedCiphertext
        );
    }

    #[test]
    fn test_verify_unknown_site_before_token() {
        let (auth, codec) = setup();
        let now = Utc::now();
        let report = auth.open(&body(&codec, now.timestamp(), "wrong"), now).unwrap();
        assert!(matches!(
            auth.verify(None, &report),
            Err(AuthError::UnknownSite { .. })
        ));
    }

    #[test]
    fn test_verify_token() {
        let (auth, codec) = setup();
        let now = Utc::now();
        let site = Site::new("https://a.example", "s3cret", None);

        let good = auth.open(&body(&codec, now.timestamp(), "s3cret"), now).unwrap();
        assert!(auth.verify(Some(site.clone()), &good).is_ok());

        let bad = auth.open(&body(&codec, now.timestamp(), "guess"), now).unwrap();
        assert!(matches!(
            auth.verify(Some(site), &bad),
            Err(AuthError::TokenMismatch { .. })
        ));
    }
}
