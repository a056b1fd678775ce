//! Job control surface
//!
//! `ScrapeService` is what a CLI or HTTP router talks to: it starts batch
//! jobs in the background, answers progress queries and runs searches over
//! the stored corpus.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::application::orchestrator::ScrapeOrchestrator;
use crate::application::progress_tracker::ProgressTracker;
use crate::domain::{HarvestError, HarvestResult, ProgressSnapshot, RecordStore};
use crate::infrastructure::config::{AppConfig, JobsConfig};
use crate::infrastructure::http_client::{ArticleFetcher, PageFetcher};
use crate::infrastructure::parsing::{ArticleExtractor, ArticleSelectors, Platform};
use crate::infrastructure::record_store::CsvRecordStore;
use crate::infrastructure::search::{ArticleSearch, ScoredArticle};

/// Reply to a start request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartedJob {
    /// `None` when every submitted URL was skipped
    pub job_id: Option<String>,
    pub total: u64,
    pub skipped: u64,
}

struct RunningJob {
    cancellation: CancellationToken,
    /// Fires once the background task has returned or unwound
    done: CancellationToken,
}

#[derive(Clone)]
pub struct ScrapeService {
    jobs_config: JobsConfig,
    default_top_k: usize,
    orchestrator: ScrapeOrchestrator,
    tracker: ProgressTracker,
    store: Arc<dyn RecordStore>,
    search: ArticleSearch,
    running: Arc<Mutex<HashMap<String, RunningJob>>>,
}

impl ScrapeService {
    pub fn new(
        config: &AppConfig,
        fetcher: Arc<dyn PageFetcher>,
        extractor: Arc<ArticleExtractor>,
        store: Arc<dyn RecordStore>,
        tracker: ProgressTracker,
    ) -> Self {
        Self {
            jobs_config: config.jobs.clone(),
            default_top_k: config.search.default_top_k,
            orchestrator: ScrapeOrchestrator::new(fetcher, extractor, tracker.clone()),
            tracker,
            store,
            search: ArticleSearch::new(config.search.clone()),
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Wire the production stack: reqwest fetcher, default selectors and the
    /// CSV store at `config.store.path`.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let fetcher = ArticleFetcher::from_config(&config.scraper)?;
        let extractor =
            ArticleExtractor::with_config(&ArticleSelectors::default(), Platform::from(&config.scraper))?;
        let store = CsvRecordStore::new(config.store.path.clone());

        Ok(Self::new(
            config,
            Arc::new(fetcher),
            Arc::new(extractor),
            Arc::new(store),
            ProgressTracker::new(),
        ))
    }

    pub const fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    /// Requested delay in seconds, or the default, clamped into the
    /// configured bounds
    pub fn effective_delay(&self, requested: Option<f64>) -> Duration {
        let seconds = requested
            .filter(|s| s.is_finite())
            .unwrap_or(self.jobs_config.default_delay_seconds)
            .clamp(self.jobs_config.min_delay_seconds, self.jobs_config.max_delay_seconds);
        Duration::from_secs_f64(seconds)
    }

    /// Start a background job for the URLs not already stored.
    ///
    /// Repeated URLs within `urls` are scraped once and count as skipped.
    pub async fn start(&self, urls: Vec<String>, delay: Option<f64>) -> HarvestResult<StartedJob> {
        let stored = self.store.existing_urls().await?;
        let submitted = urls.len() as u64;

        let mut seen = HashSet::new();
        let pending: Vec<String> = urls
            .into_iter()
            .filter(|url| !stored.contains(url) && seen.insert(url.clone()))
            .collect();

        let total = pending.len() as u64;
        let skipped = submitted - total;
        if pending.is_empty() {
            info!("Nothing to scrape: all {} URL(s) already stored", submitted);
            return Ok(StartedJob {
                job_id: None,
                total: 0,
                skipped,
            });
        }

        let job_id = ProgressTracker::new_job_id();
        let delay = self.effective_delay(delay);
        self.tracker
            .start_job(&job_id, total, &format!("Scraping {total} URL(s)"))
            .await;

        let cancellation = CancellationToken::new();
        let done = CancellationToken::new();
        let mut running = self.running.lock().await;
        tokio::spawn(
            self.clone()
                .run_job(job_id.clone(), pending, delay, cancellation.clone(), done.clone()),
        );
        running.insert(job_id.clone(), RunningJob { cancellation, done });
        drop(running);

        info!("📋 Job {} queued: {} URL(s), {} skipped", job_id, total, skipped);
        Ok(StartedJob {
            job_id: Some(job_id),
            total,
            skipped,
        })
    }

    async fn run_job(
        self,
        job_id: String,
        urls: Vec<String>,
        delay: Duration,
        cancellation: CancellationToken,
        done: CancellationToken,
    ) {
        let _done = done.drop_guard();
        let outcome = match self.orchestrator.run_batch(&urls, delay, &job_id, &cancellation).await {
            Ok(records) => self.store.append(&records).await.map_err(HarvestError::from),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(_) => {
                self.tracker.complete_job(&job_id).await;
            }
            Err(HarvestError::OrchestratorFatal { message, .. }) => {
                error!("❌ Job {} aborted: {}", job_id, message);
                self.tracker.fail_job(&job_id, &message).await;
            }
            Err(e) => {
                error!("❌ Job {} failed: {}", job_id, e);
                self.tracker.fail_job(&job_id, &e.to_string()).await;
            }
        }

        self.running.lock().await.remove(&job_id);
    }

    pub async fn progress(&self, job_id: &str) -> HarvestResult<ProgressSnapshot> {
        self.tracker
            .get_progress(job_id)
            .await
            .ok_or_else(|| HarvestError::tracker_miss(job_id))
    }

    pub async fn list_jobs(&self) -> Vec<ProgressSnapshot> {
        self.tracker.list_jobs().await
    }

    /// Ask a running job to stop before its next URL
    pub async fn cancel(&self, job_id: &str) -> HarvestResult<()> {
        let running = self.running.lock().await;
        match running.get(job_id) {
            Some(job) => {
                warn!("🛑 Cancelling job {}", job_id);
                job.cancellation.cancel();
                Ok(())
            }
            None => Err(HarvestError::tracker_miss(job_id)),
        }
    }

    /// Wait for a job's background task to finish. Returns immediately for
    /// jobs that are unknown or already done. The job stays cancellable
    /// while this waits.
    pub async fn wait(&self, job_id: &str) {
        let done = self.running.lock().await.get(job_id).map(|job| job.done.clone());
        if let Some(done) = done {
            done.cancelled().await;
        }
    }

    /// Number of stored articles
    pub async fn status(&self) -> HarvestResult<usize> {
        Ok(self.store.count().await?)
    }

    pub async fn search(&self, query: &str, top_k: Option<usize>) -> HarvestResult<Vec<ScoredArticle>> {
        let articles = self.store.load_all().await?;
        Ok(self
            .search
            .search(query, &articles, top_k.unwrap_or(self.default_top_k)))
    }

    pub async fn top_clapped(&self, top_k: Option<usize>) -> HarvestResult<Vec<ScoredArticle>> {
        let articles = self.store.load_all().await?;
        Ok(self
            .search
            .top_clapped(&articles, top_k.unwrap_or(self.default_top_k)))
    }

    /// Periodically evict finished jobs older than the retention window
    /// until `shutdown` fires
    pub fn spawn_cleanup_task(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let tracker = self.tracker.clone();
        let retention = Duration::from_secs(self.jobs_config.retention_seconds);
        let period = Duration::from_secs(self.jobs_config.cleanup_interval_seconds.max(1));

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        tracker.cleanup_old_jobs(retention).await;
                    }
                    () = shutdown.cancelled() => break,
                }
            }
        })
    }
}

impl std::fmt::Debug for ScrapeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScrapeService")
            .field("jobs_config", &self.jobs_config)
            .field("orchestrator", &self.orchestrator)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ArticleRecord, JobStatus};
    use crate::infrastructure::http_client::{FetchOutcome, FetchStatus};
    use crate::infrastructure::record_store::InMemoryRecordStore;
    use async_trait::async_trait;
    use rstest::rstest;

    /// Succeeds for every URL containing "ok", 404 otherwise
    struct ByPathFetcher;

    #[async_trait]
    impl PageFetcher for ByPathFetcher {
        async fn fetch(&self, url: &str) -> FetchOutcome {
            let success = url.contains("ok");
            FetchOutcome {
                url: url.to_string(),
                status: if success {
                    FetchStatus::Success
                } else {
                    FetchStatus::HttpError { code: 404 }
                },
                body: success.then(|| format!("<h1>Story at {url}</h1>").into_bytes()),
                attempts: 1,
                message: None,
            }
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl RecordStore for BrokenStore {
        async fn exists(&self, _url: &str) -> Result<bool> {
            Ok(false)
        }
        async fn existing_urls(&self) -> Result<HashSet<String>> {
            Ok(HashSet::new())
        }
        async fn append(&self, _records: &[ArticleRecord]) -> Result<bool> {
            Err(anyhow::anyhow!("disk full"))
        }
        async fn load_all(&self) -> Result<Vec<ArticleRecord>> {
            Ok(Vec::new())
        }
        async fn count(&self) -> Result<usize> {
            Ok(0)
        }
    }

    fn service_with(store: Arc<dyn RecordStore>) -> ScrapeService {
        ScrapeService::new(
            &AppConfig::default(),
            Arc::new(ByPathFetcher),
            Arc::new(ArticleExtractor::new().unwrap()),
            store,
            ProgressTracker::new(),
        )
    }

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|u| (*u).to_string()).collect()
    }

    #[rstest]
    #[case(None, 1.0)]
    #[case(Some(0.0), 0.1)]
    #[case(Some(2.5), 2.5)]
    #[case(Some(60.0), 10.0)]
    #[case(Some(f64::NAN), 1.0)]
    fn test_delay_is_clamped(#[case] requested: Option<f64>, #[case] expected: f64) {
        let service = service_with(Arc::new(InMemoryRecordStore::new()));
        assert_eq!(service.effective_delay(requested), Duration::from_secs_f64(expected));
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_runs_to_completion_and_persists_records() {
        let store = Arc::new(InMemoryRecordStore::new());
        let service = service_with(store.clone());

        let started = service
            .start(urls(&["https://a.example/ok-1", "https://a.example/missing"]), Some(0.1))
            .await
            .unwrap();
        let job_id = started.job_id.clone().unwrap();
        assert_eq!(started.total, 2);
        assert_eq!(started.skipped, 0);

        service.wait(&job_id).await;

        let snapshot = service.progress(&job_id).await.unwrap();
        assert_eq!(snapshot.status, JobStatus::Completed);
        assert_eq!(snapshot.successful, 1);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(service.status().await.unwrap(), 1);
        assert!(store.exists("https://a.example/ok-1").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stored_and_repeated_urls_are_skipped() {
        let store = Arc::new(InMemoryRecordStore::with_records(vec![ArticleRecord::new(
            "https://a.example/ok-stored",
        )]));
        let service = service_with(store);

        let started = service
            .start(
                urls(&["https://a.example/ok-stored", "https://a.example/ok-new", "https://a.example/ok-new"]),
                None,
            )
            .await
            .unwrap();
        assert_eq!(started.total, 1);
        assert_eq!(started.skipped, 2);

        service.wait(started.job_id.as_deref().unwrap()).await;
        assert_eq!(service.status().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_nothing_left_yields_no_job() {
        let store = Arc::new(InMemoryRecordStore::with_records(vec![ArticleRecord::new("https://a.example/ok")]));
        let service = service_with(store);

        let started = service.start(urls(&["https://a.example/ok"]), None).await.unwrap();
        assert_eq!(
            started,
            StartedJob {
                job_id: None,
                total: 0,
                skipped: 1
            }
        );
        assert!(service.list_jobs().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_failure_fails_the_job() {
        let service = service_with(Arc::new(BrokenStore));

        let started = service.start(urls(&["https://a.example/ok"]), None).await.unwrap();
        let job_id = started.job_id.unwrap();
        service.wait(&job_id).await;

        let snapshot = service.progress(&job_id).await.unwrap();
        assert_eq!(snapshot.status, JobStatus::Failed);
        assert!(snapshot.error.unwrap_or_default().contains("disk full"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_marks_job_failed() {
        let service = service_with(Arc::new(InMemoryRecordStore::new()));
        let started = service
            .start(urls(&["https://a.example/ok-1", "https://a.example/ok-2", "https://a.example/ok-3"]), Some(10.0))
            .await
            .unwrap();
        let job_id = started.job_id.unwrap();

        service.cancel(&job_id).await.unwrap();
        service.wait(&job_id).await;

        let snapshot = service.progress(&job_id).await.unwrap();
        assert_eq!(snapshot.status, JobStatus::Failed);
        assert_eq!(snapshot.error.as_deref(), Some("cancelled"));
        assert_eq!(service.status().await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiting_job_can_still_be_cancelled() {
        let service = service_with(Arc::new(InMemoryRecordStore::new()));
        let started = service
            .start(urls(&["https://a.example/ok-1", "https://a.example/ok-2", "https://a.example/ok-3"]), Some(10.0))
            .await
            .unwrap();
        let job_id = started.job_id.unwrap();

        let waiter = tokio::spawn({
            let service = service.clone();
            let job_id = job_id.clone();
            async move { service.wait(&job_id).await }
        });
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        service.cancel(&job_id).await.unwrap();
        waiter.await.unwrap();

        let snapshot = service.progress(&job_id).await.unwrap();
        assert_eq!(snapshot.status, JobStatus::Failed);
        assert_eq!(snapshot.error.as_deref(), Some("cancelled"));
        assert!(service.cancel(&job_id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_unknown_job_is_a_tracker_miss() {
        let service = service_with(Arc::new(InMemoryRecordStore::new()));

        assert!(service.progress("nope").await.unwrap_err().is_not_found());
        assert!(service.cancel("nope").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_search_and_top_clapped_read_the_store() {
        let store = Arc::new(InMemoryRecordStore::with_records(vec![
            ArticleRecord {
                title: "Rust ownership explained".to_string(),
                claps: 10,
                ..ArticleRecord::new("https://a.example/rust")
            },
            ArticleRecord {
                title: "Cooking pasta".to_string(),
                claps: 5000,
                ..ArticleRecord::new("https://a.example/pasta")
            },
        ]));
        let service = service_with(store);

        let hits = service.search("rust ownership", Some(1)).await.unwrap();
        assert_eq!(hits[0].record.url, "https://a.example/rust");

        let top = service.top_clapped(None).await.unwrap();
        assert_eq!(top[0].record.url, "https://a.example/pasta");
        assert_eq!(top.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_task_evicts_finished_jobs() {
        let mut config = AppConfig::default();
        config.jobs.retention_seconds = 0;
        config.jobs.cleanup_interval_seconds = 60;
        let service = ScrapeService::new(
            &config,
            Arc::new(ByPathFetcher),
            Arc::new(ArticleExtractor::new().unwrap()),
            Arc::new(InMemoryRecordStore::new()),
            ProgressTracker::new(),
        );
        service.tracker().start_job("old", 1, "").await;
        service.tracker().complete_job("old").await;

        let shutdown = CancellationToken::new();
        let cleanup = service.spawn_cleanup_task(shutdown.clone());
        tokio::time::sleep(Duration::from_secs(61)).await;

        assert!(service.progress("old").await.is_err());
        shutdown.cancel();
        cleanup.await.unwrap();
    }
}
