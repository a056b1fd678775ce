//! Parsing error types
//!
//! Extraction itself never fails: a missing field is an empty value. These
//! errors only come from building an extractor out of bad selector or
//! pattern configuration.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParsingError {
    #[error("Invalid CSS selector for {field}: {selector} - {reason}")]
    InvalidSelector {
        field: String,
        selector: String,
        reason: String,
    },

    #[error("No valid selectors compiled for {field} from {} attempts", attempted.len())]
    NoValidSelectors { field: String, attempted: Vec<String> },

    #[error("Invalid pattern '{name}': {reason}")]
    InvalidPattern { name: String, reason: String },
}

impl ParsingError {
    pub fn invalid_selector(field: &str, selector: &str, reason: impl ToString) -> Self {
        Self::InvalidSelector {
            field: field.to_string(),
            selector: selector.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_pattern(name: &str, reason: impl ToString) -> Self {
        Self::InvalidPattern {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type ParsingResult<T> = Result<T, ParsingError>;
