//! Infrastructure layer: HTTP fetching, HTML parsing, persistence and search
//!
//! Everything here talks to the outside world or to configuration. The
//! application layer wires these pieces together.

pub mod config;
pub mod http_client;
pub mod logging;
pub mod parsing;
pub mod parsing_error;
pub mod record_store;
pub mod retry_policy;
pub mod search;
pub mod seed_loader;

// Re-export commonly used items
pub use config::{AppConfig, ConfigManager, ScraperConfig, SearchConfig};
pub use http_client::{ArticleFetcher, FetchOutcome, FetchStatus, HttpTransport, PageFetcher, ReqwestTransport};
pub use logging::{get_log_directory, init_logging_with_config};
pub use parsing::{ArticleExtractor, ArticleSelectors, ParsingError, ParsingResult, Platform};
pub use record_store::{CsvRecordStore, InMemoryRecordStore};
pub use retry_policy::{FailureKind, RetryPolicy};
pub use search::{ArticleSearch, ScoredArticle};
pub use seed_loader::load_seed_urls;
