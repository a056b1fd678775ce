//! Article records produced by the extractor
//!
//! An [`ArticleRecord`] is the structured result of one fetched page. It is
//! keyed by URL; every other field degrades to an empty value when the page
//! does not carry it.

use serde::{Deserialize, Serialize};

/// Maximum number of keywords retained on a record
pub const MAX_KEYWORDS: usize = 15;

/// One scraped article
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub url: String,
    pub title: String,
    pub subtitle: String,
    pub body_text: String,
    /// First-seen order, no duplicates
    pub image_urls: Vec<String>,
    /// First-seen order, no duplicates
    pub external_link_urls: Vec<String>,
    pub author_name: String,
    pub author_url: String,
    pub claps: u64,
    pub reading_time: String,
    /// At most [`MAX_KEYWORDS`] entries, no duplicates
    pub keywords: Vec<String>,
}

impl ArticleRecord {
    /// Create an empty record for `url`
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn num_images(&self) -> usize {
        self.image_urls.len()
    }

    pub fn num_external_links(&self) -> usize {
        self.external_link_urls.len()
    }

    /// Text used for relevance ranking: title, subtitle, the head of the body
    /// and the keywords.
    pub fn search_document(&self, body_chars: usize) -> String {
        let mut parts: Vec<&str> = Vec::with_capacity(4);
        if !self.title.is_empty() {
            parts.push(&self.title);
        }
        if !self.subtitle.is_empty() {
            parts.push(&self.subtitle);
        }
        let body_head = truncate_chars(&self.body_text, body_chars);
        if !body_head.is_empty() {
            parts.push(body_head);
        }
        let keywords = self.keywords.join(" ");
        let mut doc = parts.join(" ");
        if !keywords.is_empty() {
            if !doc.is_empty() {
                doc.push(' ');
            }
            doc.push_str(&keywords);
        }
        doc
    }
}

/// Slice `text` to at most `max_chars` characters without splitting a code point
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_has_empty_defaults() {
        let record = ArticleRecord::new("https://example.com/a");
        assert_eq!(record.url, "https://example.com/a");
        assert!(record.title.is_empty());
        assert_eq!(record.claps, 0);
        assert_eq!(record.num_images(), 0);
        assert_eq!(record.num_external_links(), 0);
    }

    #[test]
    fn test_search_document_truncates_body_on_char_boundary() {
        let mut record = ArticleRecord::new("https://example.com/a");
        record.title = "Rust".to_string();
        record.body_text = "héllo world".to_string();
        record.keywords = vec!["systems".to_string()];

        assert_eq!(record.search_document(3), "Rust hél systems");
    }
}
