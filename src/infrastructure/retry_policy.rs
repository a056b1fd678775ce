//! Retry policy for page fetches
//!
//! A small table keyed by failure kind. Each rule names how many failures of
//! that kind a fetch tolerates and how long to wait after each, plus what to
//! change about the request first. One ceiling caps attempts across kinds.
//! The fetcher consults the table instead of branching on error types itself.

use std::collections::HashMap;
use std::time::Duration;

use crate::infrastructure::config::ScraperConfig;

/// Failure kinds that may be retried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// HTTP 403 from an anti-bot layer
    Blocked,
    /// Timeout, connection reset and other network errors
    Transport,
    /// Certificate or handshake failure
    Tls,
}

/// Change applied to the request before retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMutation {
    None,
    /// Move to the next referer in the rotation list
    RotateReferer,
    /// Disable certificate validation for the remaining attempts
    RelaxTls,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryRule {
    /// Failures of this kind tolerated before giving up
    pub max_attempts: u32,
    /// Wait after the n-th failure of this kind is `n * backoff_step`
    pub backoff_step: Duration,
    pub mutation: RequestMutation,
}

impl RetryRule {
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        self.backoff_step * attempt
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    Retry {
        wait: Duration,
        mutation: RequestMutation,
    },
    GiveUp,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Hard ceiling across every kind
    max_attempts: u32,
    rules: HashMap<FailureKind, RetryRule>,
}

impl RetryPolicy {
    pub fn from_config(config: &ScraperConfig) -> Self {
        let mut rules = HashMap::new();
        rules.insert(
            FailureKind::Blocked,
            RetryRule {
                max_attempts: config.max_attempts,
                backoff_step: Duration::from_secs(config.blocked_backoff_seconds),
                mutation: RequestMutation::RotateReferer,
            },
        );
        rules.insert(
            FailureKind::Transport,
            RetryRule {
                max_attempts: config.max_attempts,
                backoff_step: Duration::from_secs(config.transport_backoff_seconds),
                mutation: RequestMutation::None,
            },
        );
        rules.insert(
            FailureKind::Tls,
            RetryRule {
                max_attempts: if config.insecure_tls_fallback { 2 } else { 1 },
                backoff_step: Duration::ZERO,
                mutation: RequestMutation::RelaxTls,
            },
        );

        Self {
            max_attempts: config.max_attempts,
            rules,
        }
    }

    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn rule(&self, kind: FailureKind) -> Option<&RetryRule> {
        self.rules.get(&kind)
    }

    /// Decide what follows a failed attempt.
    ///
    /// `kind_failures` counts the failures of `kind` so far, including this
    /// one. `attempt` is the 1-based index of the attempt that just failed
    /// and is only checked against the overall ceiling.
    pub fn decide(&self, kind: FailureKind, kind_failures: u32, attempt: u32) -> RetryDecision {
        let Some(rule) = self.rules.get(&kind) else {
            return RetryDecision::GiveUp;
        };

        if kind_failures >= rule.max_attempts || attempt >= self.max_attempts {
            return RetryDecision::GiveUp;
        }

        RetryDecision::Retry {
            wait: rule.backoff_after(kind_failures),
            mutation: rule.mutation,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ScraperConfig::default())
    }
}
