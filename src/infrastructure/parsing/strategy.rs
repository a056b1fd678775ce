//! Ordered fallback strategies
//!
//! A field is extracted by a list of plain functions over the document. They
//! run in order and the first one returning a value wins.

use std::fmt;

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use super::config::SelectorRule;
use crate::infrastructure::parsing_error::{ParsingError, ParsingResult};

pub type Strategy<T> = Box<dyn Fn(&Html) -> Option<T> + Send + Sync>;

pub struct StrategyChain<T> {
    field: &'static str,
    strategies: Vec<Strategy<T>>,
}

impl<T> StrategyChain<T> {
    pub fn new(field: &'static str) -> Self {
        Self {
            field,
            strategies: Vec::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, strategy: impl Fn(&Html) -> Option<T> + Send + Sync + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    pub fn push(&mut self, strategy: Strategy<T>) {
        self.strategies.push(strategy);
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn first_match(&self, html: &Html) -> Option<T> {
        for (index, strategy) in self.strategies.iter().enumerate() {
            if let Some(value) = strategy(html) {
                debug!("Extracted {} using strategy {}", self.field, index);
                return Some(value);
            }
        }

        debug!("Failed to extract {} using {} strategies", self.field, self.strategies.len());
        None
    }
}

impl<T> fmt::Debug for StrategyChain<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyChain")
            .field("field", &self.field)
            .field("strategies", &self.strategies.len())
            .finish()
    }
}

/// Compile one selector, failing loudly
pub fn compile_selector(field: &str, css: &str) -> ParsingResult<Selector> {
    Selector::parse(css).map_err(|e| ParsingError::invalid_selector(field, css, e))
}

/// Compile a selector list, skipping bad entries as long as one survives
pub fn compile_selectors(field: &str, selector_strings: &[String]) -> ParsingResult<Vec<Selector>> {
    let mut selectors = Vec::new();

    for selector_str in selector_strings {
        match Selector::parse(selector_str) {
            Ok(selector) => selectors.push(selector),
            Err(e) => warn!("Failed to compile {} selector '{}': {}", field, selector_str, e),
        }
    }

    if selectors.is_empty() && !selector_strings.is_empty() {
        return Err(ParsingError::NoValidSelectors {
            field: field.to_string(),
            attempted: selector_strings.to_vec(),
        });
    }

    Ok(selectors)
}

/// Element text with whitespace runs collapsed to single spaces
pub fn visible_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}

/// Strategy reading the first element matched by `rule`
pub fn rule_strategy(field: &str, rule: &SelectorRule) -> ParsingResult<Strategy<String>> {
    let selector = compile_selector(field, &rule.css)?;
    let strategy: Strategy<String> = match rule.attr.clone() {
        Some(attr) => Box::new(move |html: &Html| {
            let element = html.select(&selector).next()?;
            non_empty(element.value().attr(&attr)?.trim().to_string())
        }),
        None => Box::new(move |html: &Html| {
            let element = html.select(&selector).next()?;
            non_empty(visible_text(element))
        }),
    };
    Ok(strategy)
}

/// Build a text chain from configured rules, skipping rules that fail to
/// compile as long as one survives
pub fn text_chain(field: &'static str, rules: &[SelectorRule]) -> ParsingResult<StrategyChain<String>> {
    let mut chain = StrategyChain::new(field);
    for rule in rules {
        match rule_strategy(field, rule) {
            Ok(strategy) => chain.push(strategy),
            Err(e) => warn!("Skipping {} rule: {}", field, e),
        }
    }

    if chain.is_empty() && !rules.is_empty() {
        return Err(ParsingError::NoValidSelectors {
            field: field.to_string(),
            attempted: rules.iter().map(|r| r.css.clone()).collect(),
        });
    }

    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_non_empty_strategy_wins() {
        let chain = StrategyChain::<String>::new("value")
            .with(|_: &Html| None)
            .with(|_: &Html| Some("second".to_string()))
            .with(|_: &Html| Some("third".to_string()));

        let html = Html::parse_document("<p></p>");
        assert_eq!(chain.first_match(&html).as_deref(), Some("second"));
        assert_eq!(chain.len(), 3);
    }

    #[test]
    fn test_empty_text_falls_through_to_meta() {
        let rules = vec![SelectorRule::text("h1"), SelectorRule::meta(r#"meta[property="og:title"]"#)];
        let chain = text_chain("title", &rules).unwrap();
        let html = Html::parse_document(
            r#"<html><head><meta property="og:title" content=" From Meta "></head><body><h1>  </h1></body></html>"#,
        );

        assert_eq!(chain.first_match(&html).as_deref(), Some("From Meta"));
    }

    #[test]
    fn test_bad_rules_are_skipped() {
        let rules = vec![SelectorRule::text("h1[[["), SelectorRule::text("h1")];
        let chain = text_chain("title", &rules).unwrap();
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_all_bad_rules_is_an_error() {
        let rules = vec![SelectorRule::text("h1[[[")];
        assert!(matches!(
            text_chain("title", &rules),
            Err(ParsingError::NoValidSelectors { .. })
        ));
    }

    #[test]
    fn test_visible_text_collapses_whitespace() {
        let html = Html::parse_fragment("<p>  Hello\n   <b>brave</b>   world </p>");
        let selector = Selector::parse("p").unwrap();
        let element = html.select(&selector).next().unwrap();
        assert_eq!(visible_text(element), "Hello brave world");
    }
}
