//! Application layer: job tracking, batch orchestration and the service
//! facade used by the CLI

pub mod orchestrator;
pub mod progress_tracker;
pub mod scrape_service;

pub use orchestrator::{CANCELLED_MESSAGE, ScrapeOrchestrator};
pub use progress_tracker::ProgressTracker;
pub use scrape_service::{ScrapeService, StartedJob};
