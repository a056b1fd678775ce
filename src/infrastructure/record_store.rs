//! Record store implementations
//!
//! [`CsvRecordStore`] keeps the corpus in one flat CSV file with list fields
//! joined by `|`. Writers are serialized behind an async mutex and every
//! write replaces the file through a rename. [`InMemoryRecordStore`] backs
//! tests and dry runs.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::domain::ArticleRecord;
use crate::domain::repositories::{RecordStore, dedupe_keep_last};

const LIST_SEPARATOR: char = '|';

/// One row of the flat file
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct CsvRow {
    url: String,
    title: String,
    subtitle: String,
    text: String,
    #[serde(skip_deserializing)]
    num_images: usize,
    image_urls: String,
    #[serde(skip_deserializing)]
    num_external_links: usize,
    external_links: String,
    author_name: String,
    author_url: String,
    claps: String,
    reading_time: String,
    keywords: String,
}

impl From<&ArticleRecord> for CsvRow {
    fn from(record: &ArticleRecord) -> Self {
        let separator = LIST_SEPARATOR.to_string();
        Self {
            url: record.url.clone(),
            title: record.title.clone(),
            subtitle: record.subtitle.clone(),
            text: record.body_text.clone(),
            num_images: record.num_images(),
            image_urls: record.image_urls.join(&separator),
            num_external_links: record.num_external_links(),
            external_links: record.external_link_urls.join(&separator),
            author_name: record.author_name.clone(),
            author_url: record.author_url.clone(),
            claps: record.claps.to_string(),
            reading_time: record.reading_time.clone(),
            keywords: record.keywords.join(&separator),
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(LIST_SEPARATOR)
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Clap counts written by other tools may carry a fractional part
fn parse_claps(value: &str) -> u64 {
    let value = value.trim();
    value
        .parse::<u64>()
        .ok()
        .or_else(|| value.split('.').next().and_then(|whole| whole.parse().ok()))
        .unwrap_or(0)
}

impl From<CsvRow> for ArticleRecord {
    fn from(row: CsvRow) -> Self {
        Self {
            url: row.url.trim().to_string(),
            title: row.title,
            subtitle: row.subtitle,
            body_text: row.text,
            image_urls: split_list(&row.image_urls),
            external_link_urls: split_list(&row.external_links),
            author_name: row.author_name,
            author_url: row.author_url,
            claps: parse_claps(&row.claps),
            reading_time: row.reading_time,
            keywords: split_list(&row.keywords),
        }
    }
}

/// CSV-backed store
#[derive(Debug)]
pub struct CsvRecordStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl CsvRecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_records(&self) -> Result<Vec<ArticleRecord>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read record store {}", self.path.display()));
            }
        };

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(bytes.as_slice());

        let mut records = Vec::new();
        for (index, row) in reader.deserialize::<CsvRow>().enumerate() {
            match row {
                Ok(row) if !row.url.trim().is_empty() => records.push(ArticleRecord::from(row)),
                Ok(_) => debug!("Skipping row {} without a url", index + 1),
                Err(e) => warn!("Skipping unreadable row {} in {}: {}", index + 1, self.path.display(), e),
            }
        }
        Ok(records)
    }

    async fn write_records(&self, records: &[ArticleRecord]) -> Result<()> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for record in records {
            writer
                .serialize(CsvRow::from(record))
                .with_context(|| format!("Failed to encode record {}", record.url))?;
        }
        let bytes = writer.into_inner().context("Failed to flush CSV buffer")?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let mut temp = self.path.clone().into_os_string();
        temp.push(".tmp");
        let temp = PathBuf::from(temp);
        tokio::fs::write(&temp, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", temp.display()))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for CsvRecordStore {
    async fn exists(&self, url: &str) -> Result<bool> {
        Ok(self.read_records().await?.iter().any(|r| r.url == url))
    }

    async fn existing_urls(&self) -> Result<HashSet<String>> {
        Ok(self.read_records().await?.into_iter().map(|r| r.url).collect())
    }

    async fn append(&self, records: &[ArticleRecord]) -> Result<bool> {
        if records.is_empty() {
            return Ok(false);
        }

        let _guard = self.write_lock.lock().await;
        let mut all = self.read_records().await?;
        let before = all.len();
        all.extend(records.iter().cloned());
        let merged = dedupe_keep_last(all);

        self.write_records(&merged).await?;
        info!(
            "Saved {} record(s) to {} ({} before, {} after)",
            records.len(),
            self.path.display(),
            before,
            merged.len()
        );
        Ok(true)
    }

    async fn load_all(&self) -> Result<Vec<ArticleRecord>> {
        self.read_records().await
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.read_records().await?.len())
    }
}

/// Store that lives only as long as the process
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: RwLock<Vec<ArticleRecord>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<ArticleRecord>) -> Self {
        Self {
            records: RwLock::new(dedupe_keep_last(records)),
        }
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn exists(&self, url: &str) -> Result<bool> {
        Ok(self.records.read().await.iter().any(|r| r.url == url))
    }

    async fn existing_urls(&self) -> Result<HashSet<String>> {
        Ok(self.records.read().await.iter().map(|r| r.url.clone()).collect())
    }

    async fn append(&self, records: &[ArticleRecord]) -> Result<bool> {
        if records.is_empty() {
            return Ok(false);
        }

        let mut stored = self.records.write().await;
        let mut all = std::mem::take(&mut *stored);
        all.extend(records.iter().cloned());
        *stored = dedupe_keep_last(all);
        Ok(true)
    }

    async fn load_all(&self) -> Result<Vec<ArticleRecord>> {
        Ok(self.records.read().await.clone())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.read().await.len())
    }
}
