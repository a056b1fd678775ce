//! HTTP fetching for article pages
//!
//! [`ReqwestTransport`] performs single GET requests with a browser-like
//! header set. [`ArticleFetcher`] drives the transport through the
//! [`RetryPolicy`] table: backoff, referer rotation on 403 and the one-shot
//! relaxed-TLS retry all happen here, and every outcome comes back as a
//! [`FetchOutcome`] value rather than an error.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, ClientBuilder};
use tokio::time::sleep;
use tracing::{debug, info, warn};
use url::Url;

use crate::domain::{FailureReason, FetchFailure};
use crate::infrastructure::config::ScraperConfig;
use crate::infrastructure::retry_policy::{FailureKind, RequestMutation, RetryDecision, RetryPolicy};

/// Per-attempt request settings chosen by the fetcher
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestPlan {
    pub referer: Option<String>,
    /// Skip certificate validation
    pub insecure: bool,
}

#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    Body,
    Other,
}

/// A request that never produced a status line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    Tls(String),
    Network { kind: TransportErrorKind, message: String },
}

impl TransportError {
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Network {
            kind: TransportErrorKind::Timeout,
            message: message.into(),
        }
    }

    pub fn connect(message: impl Into<String>) -> Self {
        Self::Network {
            kind: TransportErrorKind::Connect,
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Tls(message) | Self::Network { message, .. } => message,
        }
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tls(message) => write!(f, "TLS error: {message}"),
            Self::Network { kind, message } => write!(f, "{kind:?} error: {message}"),
        }
    }
}

/// One GET request, no retries
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &str, plan: &RequestPlan) -> Result<RawResponse, TransportError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    Success,
    HttpError { code: u16 },
    TransportError { kind: TransportErrorKind },
    TlsError,
}

/// Result of fetching one URL, including every retry
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub url: String,
    pub status: FetchStatus,
    /// Present only on success
    pub body: Option<Vec<u8>>,
    pub attempts: u32,
    /// Last error text for failed outcomes
    pub message: Option<String>,
}

impl FetchOutcome {
    pub const fn is_success(&self) -> bool {
        matches!(self.status, FetchStatus::Success)
    }

    /// Body decoded as UTF-8, replacing invalid sequences
    pub fn body_text(&self) -> Option<String> {
        self.body
            .as_deref()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn failure(&self) -> Option<FetchFailure> {
        let reason = match self.status {
            FetchStatus::Success => return None,
            FetchStatus::HttpError { code: 403 } => FailureReason::Blocked,
            FetchStatus::HttpError { .. } => FailureReason::HttpStatus,
            FetchStatus::TransportError { .. } => FailureReason::Transport,
            FetchStatus::TlsError => FailureReason::Tls,
        };

        Some(FetchFailure {
            url: self.url.clone(),
            reason,
            attempts: self.attempts,
            message: self.message.clone().unwrap_or_default(),
        })
    }
}

/// Fetches a page with whatever retries the implementation applies
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> FetchOutcome;
}

/// reqwest-backed transport with a strict and a relaxed TLS client
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    strict: Client,
    relaxed: Client,
}

impl ReqwestTransport {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        Ok(Self {
            strict: Self::build_client(config, false)?,
            relaxed: Self::build_client(config, true)?,
        })
    }

    fn default_headers(config: &ScraperConfig) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_str(&config.accept).map_err(|e| anyhow!("Invalid Accept header: {}", e))?,
        );
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_str(&config.accept_language)
                .map_err(|e| anyhow!("Invalid Accept-Language header: {}", e))?,
        );
        headers.insert(header::DNT, HeaderValue::from_static("1"));
        headers.insert(header::UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("max-age=0"));
        headers.insert("sec-fetch-dest", HeaderValue::from_static("document"));
        headers.insert("sec-fetch-mode", HeaderValue::from_static("navigate"));
        headers.insert("sec-fetch-site", HeaderValue::from_static("none"));
        headers.insert("sec-fetch-user", HeaderValue::from_static("?1"));
        Ok(headers)
    }

    fn build_client(config: &ScraperConfig, insecure: bool) -> Result<Client> {
        ClientBuilder::new()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .user_agent(&config.user_agent)
            .default_headers(Self::default_headers(config)?)
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .danger_accept_invalid_certs(insecure)
            .redirect(if config.follow_redirects {
                reqwest::redirect::Policy::limited(config.max_redirects)
            } else {
                reqwest::redirect::Policy::none()
            })
            .build()
            .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))
    }

    fn classify(err: &reqwest::Error) -> TransportError {
        let chain = error_chain_text(err);
        if err.is_timeout() {
            return TransportError::timeout(chain);
        }
        // The top-level message carries the request URL, so only the causes
        // are inspected for handshake failures
        let causes = err.source().map(error_chain_text).unwrap_or_default();
        if err.is_connect() && looks_like_tls_failure(&causes) {
            return TransportError::Tls(chain);
        }
        let kind = if err.is_connect() {
            TransportErrorKind::Connect
        } else if err.is_body() || err.is_decode() {
            TransportErrorKind::Body
        } else {
            TransportErrorKind::Other
        };
        TransportError::Network { kind, message: chain }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str, plan: &RequestPlan) -> Result<RawResponse, TransportError> {
        let client = if plan.insecure { &self.relaxed } else { &self.strict };
        let mut request = client.get(url);
        if let Some(referer) = &plan.referer {
            request = request.header(header::REFERER, referer);
        }

        let response = request.send().await.map_err(|e| Self::classify(&e))?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| Self::classify(&e))?;

        Ok(RawResponse {
            status,
            body: body.to_vec(),
        })
    }
}

fn error_chain_text(err: &(dyn StdError + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(inner) = source {
        parts.push(inner.to_string());
        source = inner.source();
    }
    parts.join(": ")
}

fn looks_like_tls_failure(text: &str) -> bool {
    let lower = text.to_lowercase();
    ["certificate", "tls", "ssl", "handshake"]
        .iter()
        .any(|needle| lower.contains(needle))
}

/// Retrying fetcher driven by the [`RetryPolicy`] table
pub struct ArticleFetcher<T = ReqwestTransport> {
    transport: T,
    policy: RetryPolicy,
    config: ScraperConfig,
}

impl ArticleFetcher<ReqwestTransport> {
    pub fn from_config(config: &ScraperConfig) -> Result<Self> {
        Ok(Self::with_transport(ReqwestTransport::new(config)?, config))
    }
}

impl<T: HttpTransport> ArticleFetcher<T> {
    pub fn with_transport(transport: T, config: &ScraperConfig) -> Self {
        Self {
            transport,
            policy: RetryPolicy::from_config(config),
            config: config.clone(),
        }
    }

    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Platform referer for hosts under a protected domain
    pub fn initial_referer(&self, url: &str) -> Option<String> {
        let host = Url::parse(url).ok()?.host_str()?.to_lowercase();
        self.config
            .protected_domains
            .iter()
            .find(|domain| {
                let protected = domain.host.to_lowercase();
                host == protected || host.ends_with(&format!(".{protected}"))
            })
            .map(|domain| domain.referer.clone())
    }

    fn rotated_referer(&self, rotations: usize) -> Option<String> {
        if self.config.referer_rotation.is_empty() {
            return None;
        }
        let index = rotations.saturating_sub(1).min(self.config.referer_rotation.len() - 1);
        self.config.referer_rotation.get(index).cloned()
    }

    fn finished(url: &str, status: FetchStatus, attempts: u32, message: String) -> FetchOutcome {
        warn!("Giving up on {} after {} attempt(s): {}", url, attempts, message);
        FetchOutcome {
            url: url.to_string(),
            status,
            body: None,
            attempts,
            message: Some(message),
        }
    }
}

#[async_trait]
impl<T: HttpTransport> PageFetcher for ArticleFetcher<T> {
    async fn fetch(&self, url: &str) -> FetchOutcome {
        let mut plan = RequestPlan {
            referer: self.initial_referer(url),
            insecure: false,
        };
        let mut attempt: u32 = 0;
        let mut rotations: usize = 0;
        let mut failures: HashMap<FailureKind, u32> = HashMap::new();

        loop {
            attempt += 1;
            info!("🌐 HTTP GET (attempt {}/{}) : {}", attempt, self.policy.max_attempts(), url);

            let (kind, status, message) = match self.transport.get(url, &plan).await {
                Ok(response) if response.status == 200 => {
                    debug!("Fetched {} ({} bytes) on attempt {}", url, response.body.len(), attempt);
                    return FetchOutcome {
                        url: url.to_string(),
                        status: FetchStatus::Success,
                        body: Some(response.body),
                        attempts: attempt,
                        message: None,
                    };
                }
                Ok(response) if response.status == 403 => (
                    FailureKind::Blocked,
                    FetchStatus::HttpError { code: 403 },
                    "HTTP 403 Forbidden".to_string(),
                ),
                Ok(response) => {
                    let code = response.status;
                    return Self::finished(url, FetchStatus::HttpError { code }, attempt, format!("HTTP {code}"));
                }
                Err(TransportError::Tls(message)) => (FailureKind::Tls, FetchStatus::TlsError, message),
                Err(TransportError::Network { kind, message }) => {
                    (FailureKind::Transport, FetchStatus::TransportError { kind }, message)
                }
            };

            warn!("⚠️ Attempt {} failed for {}: {}", attempt, url, message);

            // The relaxed retry is the last chance regardless of what it hit
            if plan.insecure {
                return Self::finished(url, status, attempt, message);
            }

            let kind_failures = failures.entry(kind).or_default();
            *kind_failures += 1;

            match self.policy.decide(kind, *kind_failures, attempt) {
                RetryDecision::GiveUp => return Self::finished(url, status, attempt, message),
                RetryDecision::Retry { wait, mutation } => {
                    match mutation {
                        RequestMutation::RotateReferer => {
                            rotations += 1;
                            plan.referer = self.rotated_referer(rotations).or_else(|| plan.referer.take());
                            debug!("Rotating referer for {} to {:?}", url, plan.referer);
                        }
                        RequestMutation::RelaxTls => {
                            warn!("Retrying {} without certificate validation", url);
                            plan.insecure = true;
                        }
                        RequestMutation::None => {}
                    }
                    if !wait.is_zero() {
                        debug!("Backing off {:?} before retrying {}", wait, url);
                        sleep(wait).await;
                    }
                }
            }
        }
    }
}
