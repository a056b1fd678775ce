//! Keyword assembly for extracted articles
//!
//! Explicit keywords (meta tag, then tag links) come first. Frequent body
//! words fill the remaining slots.

use std::collections::HashMap;

use regex::Regex;

use crate::domain::MAX_KEYWORDS;
use crate::infrastructure::parsing_error::{ParsingError, ParsingResult};

/// How many frequent body words are considered as fillers
pub const FREQUENCY_CANDIDATES: usize = 10;

pub const STOP_WORDS: &[&str] = &[
    "that", "this", "with", "from", "have", "will", "your", "they", "what", "when", "where", "which",
    "there", "their", "these", "those", "about", "after", "before", "could", "should", "would",
];

fn push_unique(keywords: &mut Vec<String>, candidate: String) {
    if keywords.len() < MAX_KEYWORDS && !candidate.is_empty() && !keywords.contains(&candidate) {
        keywords.push(candidate);
    }
}

#[derive(Debug, Clone)]
pub struct KeywordExtractor {
    word_token: Regex,
}

impl KeywordExtractor {
    pub fn new() -> ParsingResult<Self> {
        let word_token =
            Regex::new(r"\b[a-z]{4,}\b").map_err(|e| ParsingError::invalid_pattern("word_token", e))?;
        Ok(Self { word_token })
    }

    /// Most frequent lowercase words of four or more letters. Ties keep the
    /// order in which words first appear.
    pub fn frequent_words(&self, text: &str, limit: usize) -> Vec<String> {
        let lower = text.to_lowercase();
        let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
        for (position, word) in self.word_token.find_iter(&lower).map(|m| m.as_str()).enumerate() {
            counts.entry(word).or_insert((0, position)).0 += 1;
        }

        let mut ranked: Vec<(&str, usize, usize)> = counts
            .into_iter()
            .map(|(word, (count, first))| (word, count, first))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

        ranked
            .into_iter()
            .take(limit)
            .map(|(word, _, _)| word.to_string())
            .collect()
    }

    /// Merge explicit keywords with frequency fillers, deduplicated and capped
    pub fn assemble<I, J>(&self, meta: I, tags: J, body_text: &str) -> Vec<String>
    where
        I: IntoIterator<Item = String>,
        J: IntoIterator<Item = String>,
    {
        let mut keywords: Vec<String> = Vec::new();

        for keyword in meta {
            push_unique(&mut keywords, keyword.trim().to_string());
        }
        for tag in tags {
            push_unique(&mut keywords, tag.trim().to_string());
        }
        for word in self.frequent_words(body_text, FREQUENCY_CANDIDATES) {
            if !STOP_WORDS.contains(&word.as_str()) {
                push_unique(&mut keywords, word);
            }
        }

        keywords
    }
}

/// Split a meta keywords value on commas
pub fn split_meta_keywords(content: &str) -> Vec<String> {
    content
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}
