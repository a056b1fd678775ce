//! In-memory job progress tracking
//!
//! One tracker is created when the service starts and handed to everything
//! that reports or reads progress. All mutations go through a single write
//! lock; readers get cloned snapshots so they never observe a half-applied
//! update.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{JobStatus, ProgressSnapshot, ScrapeJob};

#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    jobs: Arc<RwLock<HashMap<String, ScrapeJob>>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh opaque job identifier
    pub fn new_job_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Register a job. An existing job with the same id is replaced.
    pub async fn start_job(&self, job_id: &str, total: u64, description: &str) {
        let mut jobs = self.jobs.write().await;
        if jobs.insert(job_id.to_string(), ScrapeJob::new(job_id, total, description)).is_some() {
            warn!("Job {} restarted, previous state discarded", job_id);
        }
        info!("Started job {}: {} ({} URLs)", job_id, description, total);
    }

    pub async fn set_current_url(&self, job_id: &str, url: &str) -> bool {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(job_id) {
            Some(job) if job.status == JobStatus::Running => {
                job.current_url = Some(url.to_string());
                true
            }
            Some(_) => false,
            None => {
                debug!("set_current_url for unknown job {}", job_id);
                false
            }
        }
    }

    /// Count one processed URL. Returns `false` when the job is unknown,
    /// terminal or already fully accounted for.
    pub async fn update_progress(&self, job_id: &str, success: bool, url: Option<&str>) -> bool {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.get_mut(job_id) else {
            debug!("update_progress for unknown job {}", job_id);
            return false;
        };

        let applied = job.record(success, url, Utc::now());
        if applied {
            debug!(
                "Job {} progress: {}/{} (ok {}, failed {})",
                job_id, job.completed, job.total, job.successful, job.failed
            );
        }
        applied
    }

    pub async fn get_progress(&self, job_id: &str) -> Option<ProgressSnapshot> {
        let jobs = self.jobs.read().await;
        jobs.get(job_id).map(|job| job.snapshot(Utc::now()))
    }

    pub async fn complete_job(&self, job_id: &str) -> bool {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.get_mut(job_id) else {
            return false;
        };
        if job.status.is_terminal() {
            return false;
        }

        job.finish(Utc::now());
        info!(
            "Completed job {}: {} succeeded, {} failed of {}",
            job_id, job.successful, job.failed, job.total
        );
        true
    }

    pub async fn fail_job(&self, job_id: &str, error: &str) -> bool {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.get_mut(job_id) else {
            return false;
        };
        if job.status.is_terminal() {
            return false;
        }

        job.fail(error, Utc::now());
        warn!("Job {} failed: {}", job_id, error);
        true
    }

    pub async fn remove_job(&self, job_id: &str) -> bool {
        self.jobs.write().await.remove(job_id).is_some()
    }

    /// Evict terminal jobs finished at least `max_age` ago. Running jobs are
    /// never evicted.
    pub async fn cleanup_old_jobs(&self, max_age: Duration) -> usize {
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        let now = Utc::now();

        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| !job.expired(now, max_age));
        let evicted = before - jobs.len();

        if evicted > 0 {
            info!("Evicted {} finished job(s)", evicted);
        }
        evicted
    }

    /// Snapshots of every tracked job, oldest first
    pub async fn list_jobs(&self) -> Vec<ProgressSnapshot> {
        let now = Utc::now();
        let jobs = self.jobs.read().await;
        let mut snapshots: Vec<ProgressSnapshot> = jobs.values().map(|job| job.snapshot(now)).collect();
        snapshots.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.job_id.cmp(&b.job_id)));
        snapshots
    }

    pub async fn active_job_count(&self) -> usize {
        self.jobs
            .read()
            .await
            .values()
            .filter(|job| job.status == JobStatus::Running)
            .count()
    }
}
