//! Corpus search over stored articles
//!
//! Ranking blends TF-IDF cosine similarity between the query and each
//! article with a popularity score derived from claps. Both weights and the
//! clap cap come from [`SearchConfig`].

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::debug;

use crate::domain::ArticleRecord;
use crate::infrastructure::config::SearchConfig;

const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are", "as", "at",
    "be", "because", "been", "before", "being", "below", "between", "both", "but", "by", "can", "could",
    "did", "do", "does", "doing", "down", "during", "each", "few", "for", "from", "further", "had", "has",
    "have", "having", "he", "her", "here", "hers", "herself", "him", "himself", "his", "how", "i", "if",
    "in", "into", "is", "it", "its", "itself", "just", "me", "more", "most", "my", "myself", "no", "nor",
    "not", "now", "of", "off", "on", "once", "only", "or", "other", "our", "ours", "ourselves", "out",
    "over", "own", "same", "she", "should", "so", "some", "such", "than", "that", "the", "their",
    "theirs", "them", "themselves", "then", "there", "these", "they", "this", "those", "through", "to",
    "too", "under", "until", "up", "very", "was", "we", "were", "what", "when", "where", "which", "while",
    "who", "whom", "why", "will", "with", "would", "you", "your", "yours", "yourself", "yourselves",
];

/// A ranked search hit
#[derive(Debug, Clone, Serialize)]
pub struct ScoredArticle {
    pub record: ArticleRecord,
    pub similarity: f64,
    pub score: f64,
}

type TermVector = HashMap<String, f64>;

#[derive(Debug, Clone)]
pub struct ArticleSearch {
    config: SearchConfig,
    stop_words: HashSet<&'static str>,
}

impl ArticleSearch {
    pub fn new(config: SearchConfig) -> Self {
        Self {
            config,
            stop_words: ENGLISH_STOP_WORDS.iter().copied().collect(),
        }
    }

    pub const fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Unigrams and bigrams of lowercase alphanumeric tokens of two or more
    /// characters, stop words removed before pairing
    fn terms(&self, text: &str) -> Vec<String> {
        let tokens: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.chars().count() >= 2)
            .map(str::to_lowercase)
            .filter(|t| !self.stop_words.contains(t.as_str()))
            .collect();

        let bigrams = tokens.windows(2).map(|pair| format!("{} {}", pair[0], pair[1]));
        tokens.iter().cloned().chain(bigrams).collect()
    }

    /// Smoothed TF-IDF vectors, L2-normalised
    fn vectorize(documents: &[Vec<String>]) -> Vec<TermVector> {
        let mut document_frequency: HashMap<&str, usize> = HashMap::new();
        for terms in documents {
            let unique: HashSet<&str> = terms.iter().map(String::as_str).collect();
            for term in unique {
                *document_frequency.entry(term).or_default() += 1;
            }
        }

        let n = documents.len() as f64;
        documents
            .iter()
            .map(|terms| {
                let mut counts: HashMap<&str, f64> = HashMap::new();
                for term in terms {
                    *counts.entry(term.as_str()).or_default() += 1.0;
                }

                let mut vector: TermVector = counts
                    .into_iter()
                    .map(|(term, tf)| {
                        let df = document_frequency.get(term).copied().unwrap_or(0) as f64;
                        let idf = ((1.0 + n) / (1.0 + df)).ln() + 1.0;
                        (term.to_string(), tf * idf)
                    })
                    .collect();

                let norm = vector.values().map(|w| w * w).sum::<f64>().sqrt();
                if norm > 0.0 {
                    for weight in vector.values_mut() {
                        *weight /= norm;
                    }
                }
                vector
            })
            .collect()
    }

    fn cosine(a: &TermVector, b: &TermVector) -> f64 {
        let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
        small
            .iter()
            .filter_map(|(term, weight)| large.get(term).map(|other| weight * other))
            .sum()
    }

    fn popularity(&self, claps: u64) -> f64 {
        if claps == 0 || self.config.popularity_cap == 0 {
            return 0.0;
        }
        (claps as f64 / self.config.popularity_cap as f64).min(1.0)
    }

    /// Most clapped articles first
    pub fn top_clapped(&self, articles: &[ArticleRecord], top_k: usize) -> Vec<ScoredArticle> {
        let mut sorted: Vec<&ArticleRecord> = articles.iter().collect();
        sorted.sort_by(|a, b| b.claps.cmp(&a.claps));
        sorted
            .into_iter()
            .take(top_k)
            .map(|record| ScoredArticle {
                record: record.clone(),
                similarity: 0.0,
                score: self.config.popularity_weight * self.popularity(record.claps),
            })
            .collect()
    }

    /// Rank `articles` against `query`. A blank query falls back to
    /// [`Self::top_clapped`].
    pub fn search(&self, query: &str, articles: &[ArticleRecord], top_k: usize) -> Vec<ScoredArticle> {
        if articles.is_empty() {
            return Vec::new();
        }
        if query.trim().is_empty() {
            return self.top_clapped(articles, top_k);
        }

        let mut documents = Vec::with_capacity(articles.len() + 1);
        documents.push(self.terms(query));
        documents.extend(
            articles
                .iter()
                .map(|article| self.terms(&article.search_document(self.config.body_chars))),
        );

        let vectors = Self::vectorize(&documents);
        let (query_vector, article_vectors) = vectors.split_at(1);

        let mut scored: Vec<ScoredArticle> = articles
            .iter()
            .zip(article_vectors)
            .map(|(record, vector)| {
                let similarity = Self::cosine(&query_vector[0], vector);
                let score = self.config.similarity_weight * similarity
                    + self.config.popularity_weight * self.popularity(record.claps);
                ScoredArticle {
                    record: record.clone(),
                    similarity,
                    score,
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.record.claps.cmp(&a.record.claps))
        });
        scored.truncate(top_k);

        debug!("Search '{}' ranked {} of {} article(s)", query, scored.len(), articles.len());
        scored
    }

    pub fn search_by_keywords(&self, keywords: &[String], articles: &[ArticleRecord], top_k: usize) -> Vec<ScoredArticle> {
        self.search(&keywords.join(" "), articles, top_k)
    }
}

impl Default for ArticleSearch {
    fn default() -> Self {
        Self::new(SearchConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(url: &str, title: &str, body: &str, claps: u64) -> ArticleRecord {
        ArticleRecord {
            title: title.to_string(),
            body_text: body.to_string(),
            claps,
            ..ArticleRecord::new(url)
        }
    }

    fn corpus() -> Vec<ArticleRecord> {
        vec![
            article("https://a.example/cooking", "Sourdough baking at home", "Flour water and patience for bread.", 9000),
            article("https://a.example/rust", "Async Rust in practice", "Tokio tasks, futures and async runtimes in Rust.", 50),
            article("https://a.example/garden", "Growing tomatoes", "Soil, sun and watering schedules.", 300),
        ]
    }

    #[test]
    fn test_topical_match_beats_popular_article() {
        let search = ArticleSearch::default();
        let results = search.search("async rust tokio", &corpus(), 3);

        assert_eq!(results[0].record.url, "https://a.example/rust");
        assert!(results[0].similarity > 0.0);
    }

    #[test]
    fn test_blank_query_returns_top_clapped() {
        let search = ArticleSearch::default();
        let results = search.search("   ", &corpus(), 2);

        let urls: Vec<_> = results.iter().map(|r| r.record.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a.example/cooking", "https://a.example/garden"]);
    }

    #[test]
    fn test_no_match_falls_back_to_popularity_order() {
        let search = ArticleSearch::default();
        let results = search.search("quantum chromodynamics", &corpus(), 3);

        assert!(results.iter().all(|r| r.similarity.abs() < f64::EPSILON));
        assert_eq!(results[0].record.url, "https://a.example/cooking");
    }

    #[test]
    fn test_popularity_is_capped() {
        let search = ArticleSearch::default();
        assert!((search.popularity(50_000) - 1.0).abs() < f64::EPSILON);
        assert!((search.popularity(5_000) - 0.5).abs() < f64::EPSILON);
        assert!(search.popularity(0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_weights_are_configurable() {
        let search = ArticleSearch::new(SearchConfig {
            similarity_weight: 0.0,
            popularity_weight: 1.0,
            ..SearchConfig::default()
        });
        let results = search.search("async rust tokio", &corpus(), 3);
        assert_eq!(results[0].record.url, "https://a.example/cooking");
    }

    #[test]
    fn test_top_k_limits_results() {
        let search = ArticleSearch::default();
        assert_eq!(search.search("rust", &corpus(), 1).len(), 1);
        assert!(search.search("rust", &[], 5).is_empty());
    }

    #[test]
    fn test_search_by_keywords_joins_terms() {
        let search = ArticleSearch::default();
        let results = search.search_by_keywords(&["tomatoes".to_string(), "soil".to_string()], &corpus(), 1);
        assert_eq!(results[0].record.url, "https://a.example/garden");
    }
}
