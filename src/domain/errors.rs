//! Error taxonomy for the scraping pipeline
//!
//! Per-URL failures ([`FetchFailure`]) are absorbed into job accounting and
//! never abort a batch. Only [`HarvestError`] crosses component boundaries.

use thiserror::Error;

/// Why a single URL produced no record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    /// HTTP 403 persisted through every attempt
    Blocked,
    /// Timeout, connection reset, DNS and similar
    Transport,
    /// Certificate validation failed, including the relaxed retry
    Tls,
    /// Any other non-200 status
    HttpStatus,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("fetch failed for {url} ({reason:?}) after {attempts} attempt(s): {message}")]
pub struct FetchFailure {
    pub url: String,
    pub reason: FailureReason,
    pub attempts: u32,
    pub message: String,
}

/// Failures that escape per-URL handling
#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("job not found: {job_id}")]
    TrackerMiss { job_id: String },

    #[error("batch {job_id} aborted: {message}")]
    OrchestratorFatal { job_id: String, message: String },

    #[error("record store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl HarvestError {
    pub fn tracker_miss(job_id: &str) -> Self {
        Self::TrackerMiss {
            job_id: job_id.to_string(),
        }
    }

    pub fn fatal(job_id: &str, message: impl Into<String>) -> Self {
        Self::OrchestratorFatal {
            job_id: job_id.to_string(),
            message: message.into(),
        }
    }

    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::TrackerMiss { .. })
    }
}

pub type HarvestResult<T> = Result<T, HarvestError>;
