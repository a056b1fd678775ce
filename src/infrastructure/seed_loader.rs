//! Seed URL loading
//!
//! Reads the URLs of a batch from a plain text file (one per line) or from
//! the first column of a CSV file. Anything that is not an absolute
//! `http`/`https` URL is dropped, which also takes care of header rows.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

pub fn is_http_url(candidate: &str) -> bool {
    candidate.starts_with("http://") || candidate.starts_with("https://")
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
}

/// First-column URLs from CSV content
pub fn urls_from_csv(content: &str) -> Vec<String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut urls = Vec::new();
    for (index, row) in reader.records().enumerate() {
        match row {
            Ok(row) => {
                if let Some(url) = row.get(0).map(str::trim).filter(|u| is_http_url(u)) {
                    urls.push(url.to_string());
                }
            }
            Err(e) => warn!("Skipping unreadable seed row {}: {}", index + 1, e),
        }
    }
    urls
}

/// One URL per line
pub fn urls_from_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| is_http_url(line))
        .map(str::to_string)
        .collect()
}

/// Load seed URLs from `path`, choosing the format by extension
pub async fn load_seed_urls(path: &Path) -> Result<Vec<String>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read seed file {}", path.display()))?;

    let urls = if is_csv(path) {
        urls_from_csv(&content)
    } else {
        urls_from_lines(&content)
    };

    info!("Read {} URL(s) from {}", urls.len(), path.display());
    Ok(urls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_csv_keeps_first_column_urls_only() {
        let content = "url,notes\nhttps://a.example/1,first\n  http://b.example/2 ,second\nftp://c.example/3,x\n,empty\n";
        assert_eq!(
            urls_from_csv(content),
            vec!["https://a.example/1", "http://b.example/2"]
        );
    }

    #[test]
    fn test_lines_are_trimmed_and_filtered() {
        let content = "URLs\n https://a.example/1 \n\nnot a url\nhttps://b.example/2\n";
        assert_eq!(
            urls_from_lines(content),
            vec!["https://a.example/1", "https://b.example/2"]
        );
    }

    #[tokio::test]
    async fn test_load_picks_format_by_extension() {
        let dir = TempDir::new().unwrap();
        let csv_path = dir.path().join("seeds.CSV");
        std::fs::write(&csv_path, "link,title\nhttps://a.example/x,A, with comma\n").unwrap();
        let txt_path = dir.path().join("seeds.txt");
        std::fs::write(&txt_path, "https://a.example/y?tags=a,b\n").unwrap();

        assert_eq!(load_seed_urls(&csv_path).await.unwrap(), vec!["https://a.example/x"]);
        assert_eq!(load_seed_urls(&txt_path).await.unwrap(), vec!["https://a.example/y?tags=a,b"]);
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(load_seed_urls(&dir.path().join("absent.txt")).await.is_err());
    }
}
