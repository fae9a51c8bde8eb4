//! Batch refresh.
//!
//! Polls every registered site through a [`ReportTransport`] and runs each
//! returned report through the ingestion cycle. A failing site is logged
//! and recorded; the pass always continues with the next one. Retry policy
//! belongs to whatever schedules the pass.

use crate::error::CoreError;
use crate::reconcile::{IngestOutcome, Reconciler};
use crate::transport::ReportTransport;
use chrono::Utc;
use tracing::{error, info, info_span, Instrument};
use warden_registry::{Site, SiteId, SiteSort};

/// One site that could not be refreshed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshFailure {
    /// Site identifier.
    pub site_id: SiteId,
    /// Site URL.
    pub url: String,
    /// Rendered error.
    pub error: String,
}

/// Outcome of a batch refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    /// Sites refreshed successfully.
    pub refreshed: Vec<SiteId>,
    /// Sites that failed, in pass order.
    pub failed: Vec<RefreshFailure>,
}

impl RefreshSummary {
    /// Total sites attempted.
    pub fn attempted(&self) -> usize {
        self.refreshed.len() + self.failed.len()
    }
}

impl Reconciler {
    /// Polls one site and ingests its report.
    pub async fn refresh_site(
        &self,
        transport: &dyn ReportTransport,
        site: &Site,
    ) -> Result<IngestOutcome, CoreError> {
        let body = transport.fetch_report(site).await?;
        Ok(self.ingest(&body, Utc::now()).await?)
    }

    /// Refreshes every registered site, isolating failures per site.
    ///
    /// # Errors
    ///
    /// Only when the site list itself cannot be read.
    pub async fn refresh_all(&self, transport: &dyn ReportTransport) -> Result<RefreshSummary, CoreError> {
        let sites = self
            .stores()
            .sites("list_all", |sites| sites.list_all(SiteSort::NameAsc))
            .await?;
        info!(sites = sites.len(), "Refresh pass started");

        let mut summary = RefreshSummary::default();
        for site in &sites {
            let span = info_span!("refresh", url = %site.url);
            match self.refresh_site(transport, site).instrument(span).await {
                Ok(_) => summary.refreshed.push(site.id.clone()),
                Err(e) => {
                    error!(site = %site.id, url = %site.url, error = %e, "Unable to refresh site");
                    summary.failed.push(RefreshFailure {
                        site_id: site.id.clone(),
                        url: site.url.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            refreshed = summary.refreshed.len(),
            failed = summary.failed.len(),
            "Refresh pass finished"
        );
        Ok(summary)
    }
}
