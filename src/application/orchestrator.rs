//! Sequential batch scraping
//!
//! [`ScrapeOrchestrator::run_batch`] walks a URL list in order: fetch,
//! extract, report, pause. A single URL failing never stops the batch; only
//! cancellation or an internal fault does.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::application::progress_tracker::ProgressTracker;
use crate::domain::{ArticleRecord, HarvestError, HarvestResult};
use crate::infrastructure::parsing::ArticleExtractor;
use crate::infrastructure::http_client::PageFetcher;

/// Error message recorded on a job stopped through its cancellation token
pub const CANCELLED_MESSAGE: &str = "cancelled";

#[derive(Clone)]
pub struct ScrapeOrchestrator {
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<ArticleExtractor>,
    tracker: ProgressTracker,
}

impl ScrapeOrchestrator {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        extractor: Arc<ArticleExtractor>,
        tracker: ProgressTracker,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            tracker,
        }
    }

    pub const fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    /// Scrape `urls` for `job_id`, pausing `delay` between consecutive URLs.
    ///
    /// The job must already be registered with the tracker. Returns the
    /// records extracted from successful fetches, in input order.
    pub async fn run_batch(
        &self,
        urls: &[String],
        delay: Duration,
        job_id: &str,
        cancellation: &CancellationToken,
    ) -> HarvestResult<Vec<ArticleRecord>> {
        info!("🚀 Batch {} started: {} URL(s), delay {:?}", job_id, urls.len(), delay);
        let mut records = Vec::new();

        for (index, url) in urls.iter().enumerate() {
            if cancellation.is_cancelled() {
                warn!("🛑 Batch {} cancelled after {}/{} URL(s)", job_id, index, urls.len());
                return Err(HarvestError::fatal(job_id, CANCELLED_MESSAGE));
            }

            self.tracker.set_current_url(job_id, url).await;
            let outcome = self.fetcher.fetch(url).await;

            let record = match outcome.body_text() {
                Some(body) if outcome.is_success() => Some(self.extract(job_id, url, body).await?),
                _ => {
                    if let Some(failure) = outcome.failure() {
                        warn!("❌ {}", failure);
                    }
                    None
                }
            };

            let success = record.is_some();
            self.tracker.update_progress(job_id, success, Some(url)).await;
            if let Some(record) = record {
                debug!("✅ Extracted '{}' from {}", record.title, url);
                records.push(record);
            }

            if index + 1 < urls.len() && !delay.is_zero() {
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = cancellation.cancelled() => {}
                }
            }
        }

        info!(
            "🏁 Batch {} finished: {} of {} URL(s) extracted",
            job_id,
            records.len(),
            urls.len()
        );
        Ok(records)
    }

    /// Parse on the blocking pool so the parsed document never lives across
    /// an await point. A panicking parser is reported as a fatal batch error.
    async fn extract(&self, job_id: &str, url: &str, body: String) -> HarvestResult<ArticleRecord> {
        let extractor = Arc::clone(&self.extractor);
        let page_url = url.to_string();

        tokio::task::spawn_blocking(move || extractor.extract(&body, &page_url))
            .await
            .map_err(|join_error| {
                error!("💥 Extraction task for {} failed: {}", url, join_error);
                HarvestError::fatal(job_id, format!("extraction of {url} failed: {join_error}"))
            })
    }
}

impl std::fmt::Debug for ScrapeOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScrapeOrchestrator")
            .field("tracker", &self.tracker)
            .finish_non_exhaustive()
    }
}
