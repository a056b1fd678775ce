//! HTML parsing for article pages
//!
//! Selector configuration, ordered fallback strategies and the article
//! parser built from them.

pub mod article_parser;
pub mod config;
pub mod context;
pub mod keywords;
pub mod strategy;

pub use crate::infrastructure::parsing_error::{ParsingError, ParsingResult};
pub use article_parser::ArticleExtractor;
pub use config::{ArticleSelectors, SelectorRule};
pub use context::{ArticleParseContext, Platform};
pub use keywords::KeywordExtractor;
pub use strategy::{Strategy, StrategyChain};

use scraper::Html;

/// Parser that needs page-level context besides the document
pub trait ContextualParser {
    type Output;
    type Context;

    fn parse_with_context(&self, html: &Html, context: &Self::Context) -> Self::Output;
}
