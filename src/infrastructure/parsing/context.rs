//! Parsing context for article pages

use url::Url;

use crate::infrastructure::config::{ScraperConfig, defaults};

/// Hosting platform facts the extractor needs to classify links and images
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    /// Hosts containing this string count as internal
    pub domain: String,
    /// Prefix for relative author links
    pub base_url: String,
    /// Image hosts containing this string get their size params stripped
    pub media_cdn_domain: String,
}

impl Default for Platform {
    fn default() -> Self {
        Self {
            domain: defaults::PLATFORM_DOMAIN.to_string(),
            base_url: defaults::PLATFORM_BASE_URL.to_string(),
            media_cdn_domain: defaults::PLATFORM_DOMAIN.to_string(),
        }
    }
}

impl From<&ScraperConfig> for Platform {
    fn from(config: &ScraperConfig) -> Self {
        Self {
            domain: config.platform_domain.clone(),
            base_url: config.platform_base_url.trim_end_matches('/').to_string(),
            media_cdn_domain: config.media_cdn_domain.clone(),
        }
    }
}

/// Context for parsing one fetched article
#[derive(Debug, Clone)]
pub struct ArticleParseContext {
    /// URL the page was fetched from
    pub url: String,

    /// Host of `url`, empty when it does not parse
    pub host: String,

    pub platform: Platform,
}

impl ArticleParseContext {
    pub fn new(url: &str, platform: Platform) -> Self {
        let host = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default();

        Self {
            url: url.to_string(),
            host,
            platform,
        }
    }

    pub fn is_platform_host(&self, host: &str) -> bool {
        !self.platform.domain.is_empty() && host.contains(&self.platform.domain)
    }
}
