//! Batch scrape job state
//!
//! [`ScrapeJob`] is owned by the progress tracker; everything else in the
//! crate only sees [`ProgressSnapshot`] copies.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of completed items retained per job
pub const RECENT_COMPLETED_CAPACITY: usize = 20;

/// Lifecycle of a batch job. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Outcome tag recorded for each processed URL
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ItemOutcome {
    Success,
    Failed,
}

impl From<bool> for ItemOutcome {
    fn from(success: bool) -> Self {
        if success { Self::Success } else { Self::Failed }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompletedItem {
    pub url: String,
    pub status: ItemOutcome,
    pub timestamp: DateTime<Utc>,
}

/// Mutable job state held by the tracker
#[derive(Debug, Clone)]
pub struct ScrapeJob {
    pub job_id: String,
    pub description: String,
    pub total: u64,
    pub completed: u64,
    pub successful: u64,
    pub failed: u64,
    pub status: JobStatus,
    pub current_url: Option<String>,
    pub start_time: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub recent_completed: VecDeque<CompletedItem>,
}

impl ScrapeJob {
    pub fn new(job_id: impl Into<String>, total: u64, description: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            description: description.into(),
            total,
            completed: 0,
            successful: 0,
            failed: 0,
            status: JobStatus::Running,
            current_url: None,
            start_time: Utc::now(),
            finished_at: None,
            error: None,
            recent_completed: VecDeque::with_capacity(RECENT_COMPLETED_CAPACITY),
        }
    }

    /// Record one processed URL. Ignored once the job is terminal or every
    /// accepted URL has already been accounted for.
    pub fn record(&mut self, success: bool, url: Option<&str>, at: DateTime<Utc>) -> bool {
        if self.status.is_terminal() || self.completed >= self.total {
            return false;
        }

        self.completed += 1;
        if success {
            self.successful += 1;
        } else {
            self.failed += 1;
        }

        if let Some(url) = url {
            if self.recent_completed.len() == RECENT_COMPLETED_CAPACITY {
                self.recent_completed.pop_front();
            }
            self.recent_completed.push_back(CompletedItem {
                url: url.to_string(),
                status: ItemOutcome::from(success),
                timestamp: at,
            });
        }

        self.current_url = None;
        true
    }

    /// Move to `Completed`, reconciling the counters so that
    /// `completed == total` and `completed == successful + failed`.
    pub fn finish(&mut self, at: DateTime<Utc>) {
        if self.status.is_terminal() {
            return;
        }
        if self.completed < self.total {
            // URLs that never reported are counted as failures
            self.failed += self.total - self.completed;
            self.completed = self.total;
        }
        self.status = JobStatus::Completed;
        self.current_url = None;
        self.finished_at = Some(at);
    }

    pub fn fail(&mut self, error: impl Into<String>, at: DateTime<Utc>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = JobStatus::Failed;
        self.error = Some(error.into());
        self.current_url = None;
        self.finished_at = Some(at);
    }

    /// True when the job has been terminal for at least `max_age`
    pub fn expired(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        match (self.status.is_terminal(), self.finished_at) {
            (true, Some(finished)) => now - finished >= max_age,
            _ => false,
        }
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> ProgressSnapshot {
        #[allow(clippy::cast_precision_loss)]
        let percentage = if self.total == 0 {
            0.0
        } else {
            self.completed as f64 / self.total as f64 * 100.0
        };

        #[allow(clippy::cast_precision_loss)]
        let estimated_seconds_remaining = (self.completed > 0).then(|| {
            let elapsed = (now - self.start_time).num_milliseconds().max(0) as f64 / 1000.0;
            let per_item = elapsed / self.completed as f64;
            per_item * self.total.saturating_sub(self.completed) as f64
        });

        ProgressSnapshot {
            job_id: self.job_id.clone(),
            description: self.description.clone(),
            total: self.total,
            completed: self.completed,
            successful: self.successful,
            failed: self.failed,
            status: self.status,
            percentage,
            estimated_seconds_remaining,
            current_url: self.current_url.clone(),
            start_time: self.start_time,
            finished_at: self.finished_at,
            error: self.error.clone(),
            recent_completed: self.recent_completed.iter().cloned().collect(),
        }
    }
}

/// Point-in-time copy of a job handed to observers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressSnapshot {
    pub job_id: String,
    pub description: String,
    pub total: u64,
    pub completed: u64,
    pub successful: u64,
    pub failed: u64,
    pub status: JobStatus,
    pub percentage: f64,
    pub estimated_seconds_remaining: Option<f64>,
    pub current_url: Option<String>,
    pub start_time: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub recent_completed: Vec<CompletedItem>,
}
