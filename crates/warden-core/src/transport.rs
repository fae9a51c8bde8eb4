//! Outbound site polling.
//!
//! The batch refresh asks each site for a fresh report. The transport only
//! fetches the encrypted body; the report then goes through the same
//! ingestion cycle as a pushed one.

use crate::config::RefreshConfig;
use crate::error::TransportError;
use async_trait::async_trait;
use tracing::debug;
use warden_registry::Site;

/// Fetches a site's encrypted report.
#[async_trait]
pub trait ReportTransport: Send + Sync {
    /// Requests the current report from `site`.
    async fn fetch_report(&self, site: &Site) -> Result<Vec<u8>, TransportError>;
}

/// reqwest-backed transport: `POST <site url><report path>`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    report_path: String,
}

impl HttpTransport {
    /// Builds a client with the configured timeout.
    pub fn new(config: &RefreshConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("warden/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(TransportError::Client)?;
        Ok(Self {
            client,
            report_path: config.report_path.clone(),
        })
    }

    /// The URL polled for `site`.
    pub fn report_url(&self, site: &Site) -> String {
        report_url(&site.url, &self.report_path)
    }
}

fn report_url(site_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        site_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[async_trait]
impl ReportTransport for HttpTransport {
    async fn fetch_report(&self, site: &Site) -> Result<Vec<u8>, TransportError> {
        let url = self.report_url(site);
        debug!(url = %url, "Polling site");

        let mut request = self.client.post(&url);
        if let Some(user) = site.auth_user.as_deref().filter(|u| !u.is_empty()) {
            request = request.basic_auth(user, site.auth_pass());
        }

        let http_err = |source| TransportError::Http {
            url: url.clone(),
            source,
        };
        let response = request.send().await.map_err(http_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url: url.clone(),
                status: status.as_u16(),
            });
        }
        let body = response.bytes().await.map_err(http_err)?;
        Ok(body.to_vec())
    }
}
