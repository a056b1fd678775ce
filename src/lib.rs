//! Article Harvester - resilient article scraping with live job progress
//!
//! The crate is layered the usual way: `domain` holds plain data and error
//! types, `infrastructure` talks to the network, the filesystem and
//! configuration, and `application` runs and tracks batch jobs.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::{ProgressTracker, ScrapeOrchestrator, ScrapeService, StartedJob};
pub use domain::{ArticleRecord, HarvestError, HarvestResult, JobStatus, ProgressSnapshot};
pub use infrastructure::AppConfig;
