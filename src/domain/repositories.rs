//! Repository traits for the domain layer

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::ArticleRecord;

/// Persistence for extracted articles, keyed by URL
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn exists(&self, url: &str) -> Result<bool>;

    async fn existing_urls(&self) -> Result<HashSet<String>>;

    /// Merge `records` into the store. A record whose URL is already stored
    /// replaces the stored one. Returns `false` when there was nothing to
    /// write.
    async fn append(&self, records: &[ArticleRecord]) -> Result<bool>;

    async fn load_all(&self) -> Result<Vec<ArticleRecord>>;

    async fn count(&self) -> Result<usize>;
}

/// Collapse duplicate URLs, keeping the last occurrence of each in the
/// position of that last occurrence
pub fn dedupe_keep_last(records: Vec<ArticleRecord>) -> Vec<ArticleRecord> {
    let mut seen = HashSet::new();
    let mut kept: Vec<ArticleRecord> = records
        .into_iter()
        .rev()
        .filter(|record| seen.insert(record.url.clone()))
        .collect();
    kept.reverse();
    kept
}
