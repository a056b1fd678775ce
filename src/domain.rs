//! Domain module - articles, jobs and the error taxonomy
//!
//! Plain data types shared by the infrastructure and application layers.

pub mod article;
pub mod errors;
pub mod job;
pub mod repositories;

pub use article::{ArticleRecord, MAX_KEYWORDS};
pub use errors::{FailureReason, FetchFailure, HarvestError, HarvestResult};
pub use job::{
    CompletedItem, ItemOutcome, JobStatus, ProgressSnapshot, RECENT_COMPLETED_CAPACITY, ScrapeJob,
};
pub use repositories::{RecordStore, dedupe_keep_last};
