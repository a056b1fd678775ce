//! Article page parser
//!
//! Turns a fetched article page into an [`ArticleRecord`]. Every field has
//! its own fallback chain; a field nothing matches stays empty, so parsing
//! never fails once the extractor is built.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::ContextualParser;
use super::config::ArticleSelectors;
use super::context::{ArticleParseContext, Platform};
use super::keywords::{KeywordExtractor, split_meta_keywords};
use super::strategy::{StrategyChain, compile_selector, compile_selectors, non_empty, text_chain, visible_text};
use crate::domain::ArticleRecord;
use crate::infrastructure::parsing_error::{ParsingError, ParsingResult};

/// Parser for article detail pages
#[derive(Debug)]
pub struct ArticleExtractor {
    title: StrategyChain<String>,
    subtitle: StrategyChain<String>,
    /// Author name with its raw href
    author: StrategyChain<(String, String)>,
    claps: StrategyChain<u64>,
    reading_time: StrategyChain<String>,

    body_containers: Vec<Selector>,
    body_blocks: Selector,
    body_noise: Vec<String>,
    min_block_chars: usize,

    images: Selector,
    image_src_attrs: Vec<String>,
    pictures: Selector,
    picture_source: Selector,
    links: Selector,
    json_ld: Selector,
    keywords_meta: Selector,
    tags: Vec<Selector>,

    size_params: Vec<Regex>,
    srcset_url: Regex,
    keywords: KeywordExtractor,
    platform: Platform,
}

impl ArticleExtractor {
    /// Create an extractor with the default selectors and platform
    pub fn new() -> ParsingResult<Self> {
        Self::with_config(&ArticleSelectors::default(), Platform::default())
    }

    pub fn with_config(selectors: &ArticleSelectors, platform: Platform) -> ParsingResult<Self> {
        let count = Regex::new(r"(\d[\d,]*)(?:\.(\d+))?(?:\s?([KkMm])\b)?")
            .map_err(|e| ParsingError::invalid_pattern("count", e))?;
        let size_params = [r"[?&]w=\d+", r"[?&]q=\d+"]
            .iter()
            .map(|p| Regex::new(p).map_err(|e| ParsingError::invalid_pattern("size_param", e)))
            .collect::<ParsingResult<Vec<_>>>()?;
        let srcset_url =
            Regex::new(r"https?://[^\s,]+").map_err(|e| ParsingError::invalid_pattern("srcset_url", e))?;
        let reading_title = Regex::new(&selectors.reading_time_title_pattern)
            .map_err(|e| ParsingError::invalid_pattern("reading_time_title", e))?;

        Ok(Self {
            title: text_chain("title", &selectors.title)?,
            subtitle: text_chain("subtitle", &selectors.subtitle)?,
            author: Self::author_chain(selectors)?,
            claps: Self::claps_chain(&selectors.claps, count)?,
            reading_time: Self::reading_time_chain(&selectors.reading_time, reading_title)?,

            body_containers: compile_selectors("body", &selectors.body_containers)?,
            body_blocks: compile_selector("body", &selectors.body_blocks)?,
            body_noise: selectors.body_noise.clone(),
            min_block_chars: selectors.min_block_chars,

            images: compile_selector("images", &selectors.images)?,
            image_src_attrs: selectors.image_src_attrs.clone(),
            pictures: compile_selector("images", &selectors.pictures)?,
            picture_source: compile_selector("images", &selectors.picture_source)?,
            links: compile_selector("links", &selectors.links)?,
            json_ld: compile_selector("claps", &selectors.json_ld)?,
            keywords_meta: compile_selector("keywords", &selectors.keywords_meta)?,
            tags: compile_selectors("keywords", &selectors.tags)?,

            size_params,
            srcset_url,
            keywords: KeywordExtractor::new()?,
            platform,
        })
    }

    fn author_chain(selectors: &ArticleSelectors) -> ParsingResult<StrategyChain<(String, String)>> {
        let mut chain = StrategyChain::new("author");
        for rule in &selectors.author {
            let selector = compile_selector("author", &rule.css)?;
            match rule.attr.clone() {
                Some(attr) => chain.push(Box::new(move |html: &Html| {
                    let element = html.select(&selector).next()?;
                    let name = non_empty(element.value().attr(&attr)?.trim().to_string())?;
                    Some((name, String::new()))
                })),
                None => chain.push(Box::new(move |html: &Html| {
                    let element = html.select(&selector).next()?;
                    let name = non_empty(visible_text(element))?;
                    let href = element.value().attr("href").unwrap_or_default().trim().to_string();
                    Some((name, href))
                })),
            }
        }
        Ok(chain)
    }

    fn claps_chain(selectors: &[String], count: Regex) -> ParsingResult<StrategyChain<u64>> {
        let mut chain = StrategyChain::new("claps");
        for selector in compile_selectors("claps", selectors)? {
            let count = count.clone();
            chain.push(Box::new(move |html: &Html| {
                let element = html.select(&selector).next()?;
                element
                    .value()
                    .attr("aria-label")
                    .and_then(|label| parse_count(&count, label))
                    .or_else(|| parse_count(&count, &visible_text(element)))
            }));
        }
        Ok(chain)
    }

    fn reading_time_chain(selectors: &[String], title_pattern: Regex) -> ParsingResult<StrategyChain<String>> {
        let mut chain = StrategyChain::new("reading_time");
        for selector in compile_selectors("reading_time", selectors)? {
            chain.push(Box::new(move |html: &Html| {
                let element = html.select(&selector).next()?;
                non_empty(visible_text(element))
            }));
        }

        let titled = compile_selector("reading_time", "[title]")?;
        chain.push(Box::new(move |html: &Html| {
            html.select(&titled)
                .filter_map(|element| element.value().attr("title"))
                .find(|title| title_pattern.is_match(title))
                .and_then(|title| non_empty(title.trim().to_string()))
        }));
        Ok(chain)
    }

    /// Parse a page fetched from `page_url`
    pub fn extract(&self, document: &str, page_url: &str) -> ArticleRecord {
        let html = Html::parse_document(document);
        let context = ArticleParseContext::new(page_url, self.platform.clone());
        self.parse_with_context(&html, &context)
    }

    fn is_noise(&self, element: ElementRef<'_>) -> bool {
        element.ancestors().any(|node| {
            node.value()
                .as_element()
                .is_some_and(|e| self.body_noise.iter().any(|n| n == e.name()))
        })
    }

    /// Text of `element` minus anything inside a noise subtree
    fn block_text(&self, element: ElementRef<'_>) -> String {
        if self.is_noise(element) {
            return String::new();
        }

        let mut raw = String::new();
        for node in element.descendants() {
            let Some(text) = node.value().as_text() else {
                continue;
            };
            let inside_noise = node.ancestors().any(|ancestor| {
                ancestor
                    .value()
                    .as_element()
                    .is_some_and(|e| self.body_noise.iter().any(|n| n == e.name()))
            });
            if !inside_noise {
                raw.push_str(text);
            }
        }

        raw.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn extract_body_text(&self, html: &Html) -> String {
        for container_selector in &self.body_containers {
            let Some(container) = html.select(container_selector).next() else {
                continue;
            };

            let blocks: Vec<String> = container
                .select(&self.body_blocks)
                .map(|block| self.block_text(block))
                .filter(|text| text.chars().count() > self.min_block_chars)
                .collect();

            if !blocks.is_empty() {
                return blocks.join("\n\n");
            }
        }
        String::new()
    }

    fn strip_size_params(&self, url: &str) -> String {
        let mut cleaned = url.to_string();
        for pattern in &self.size_params {
            cleaned = pattern.replace_all(&cleaned, "").into_owned();
        }
        // Stripping the first parameter can leave `&x=1` without a `?`
        if !cleaned.contains('?') {
            if let Some(index) = cleaned.find('&') {
                cleaned.replace_range(index..=index, "?");
            }
        }
        cleaned
    }

    fn extract_images(&self, html: &Html, context: &ArticleParseContext) -> Vec<String> {
        let mut images: Vec<String> = Vec::new();
        let cdn = &context.platform.media_cdn_domain;

        for img in html.select(&self.images) {
            let src = self
                .image_src_attrs
                .iter()
                .filter_map(|attr| img.value().attr(attr))
                .map(str::trim)
                .find(|src| !src.is_empty());
            let Some(src) = src else {
                continue;
            };

            let src = if !cdn.is_empty() && src.contains(cdn.as_str()) {
                self.strip_size_params(src)
            } else {
                src.to_string()
            };
            if !images.contains(&src) {
                images.push(src);
            }
        }

        for picture in html.select(&self.pictures) {
            let Some(srcset) = picture
                .select(&self.picture_source)
                .next()
                .and_then(|source| source.value().attr("srcset"))
            else {
                continue;
            };
            if let Some(found) = self.srcset_url.find(srcset) {
                let src = self.strip_size_params(found.as_str());
                if !images.contains(&src) {
                    images.push(src);
                }
            }
        }

        images
    }

    fn extract_external_links(&self, html: &Html, context: &ArticleParseContext) -> Vec<String> {
        let mut links: Vec<String> = Vec::new();

        for anchor in html.select(&self.links) {
            let href = anchor.value().attr("href").unwrap_or_default().trim();
            if href.is_empty() {
                continue;
            }

            let absolute = if href.starts_with('/') {
                format!("https://{}{}", context.host, href)
            } else if href.starts_with("http") {
                href.to_string()
            } else {
                continue;
            };

            let Some(host) = Url::parse(&absolute)
                .ok()
                .and_then(|u| u.host_str().map(str::to_string))
            else {
                continue;
            };

            if host != context.host && !context.is_platform_host(&host) && !links.contains(&absolute) {
                links.push(absolute);
            }
        }

        links
    }

    fn extract_author(&self, html: &Html, context: &ArticleParseContext) -> (String, String) {
        let Some((name, href)) = self.author.first_match(html) else {
            return (String::new(), String::new());
        };

        let url = if href.is_empty() || href.starts_with("http") {
            href
        } else {
            format!("{}{}", context.platform.base_url, href)
        };
        (name, url)
    }

    /// Claps from visible markup, overridden by structured data when present
    fn extract_claps(&self, html: &Html) -> u64 {
        let visible = self.claps.first_match(html).unwrap_or(0);

        let structured = html
            .select(&self.json_ld)
            .filter_map(|script| serde_json::from_str::<Value>(&script.text().collect::<String>()).ok())
            .find_map(|value| like_count(&value));

        match structured {
            Some(count) => {
                debug!("Claps taken from structured data: {}", count);
                count
            }
            None => visible,
        }
    }

    fn extract_keywords(&self, html: &Html, body_text: &str) -> Vec<String> {
        let meta = html
            .select(&self.keywords_meta)
            .next()
            .and_then(|element| element.value().attr("content"))
            .map(split_meta_keywords)
            .unwrap_or_default();

        let tags: Vec<String> = self
            .tags
            .iter()
            .flat_map(|selector| html.select(selector).map(visible_text).collect::<Vec<_>>())
            .filter(|tag| !tag.is_empty())
            .collect();

        self.keywords.assemble(meta, tags, body_text)
    }
}

impl ContextualParser for ArticleExtractor {
    type Output = ArticleRecord;
    type Context = ArticleParseContext;

    fn parse_with_context(&self, html: &Html, context: &Self::Context) -> Self::Output {
        debug!("Parsing article from: {}", context.url);

        let body_text = self.extract_body_text(html);
        let (author_name, author_url) = self.extract_author(html, context);
        let keywords = self.extract_keywords(html, &body_text);

        let record = ArticleRecord {
            url: context.url.clone(),
            title: self.title.first_match(html).unwrap_or_default(),
            subtitle: self.subtitle.first_match(html).unwrap_or_default(),
            image_urls: self.extract_images(html, context),
            external_link_urls: self.extract_external_links(html, context),
            author_name,
            author_url,
            claps: self.extract_claps(html),
            reading_time: self.reading_time.first_match(html).unwrap_or_default(),
            keywords,
            body_text,
        };

        debug!(
            "Extracted article '{}' ({} images, {} external links, {} keywords)",
            record.title,
            record.image_urls.len(),
            record.external_link_urls.len(),
            record.keywords.len()
        );
        record
    }
}

/// Parse the first count in `text`, honouring `K`/`M` suffixes
fn parse_count(pattern: &Regex, text: &str) -> Option<u64> {
    let captures = pattern.captures(text)?;
    let whole: u64 = captures.get(1)?.as_str().replace(',', "").parse().ok()?;
    let multiplier: u64 = match captures.get(3).map(|m| m.as_str()) {
        Some("K" | "k") => 1_000,
        Some("M" | "m") => 1_000_000,
        _ => return Some(whole),
    };

    let fraction = captures.get(2).map_or(0, |digits| {
        let digits = digits.as_str();
        let scale = 10u64.checked_pow(u32::try_from(digits.len()).unwrap_or(u32::MAX));
        match (digits.parse::<u64>(), scale) {
            (Ok(value), Some(scale)) => value.saturating_mul(multiplier) / scale,
            _ => 0,
        }
    });

    Some(whole.saturating_mul(multiplier).saturating_add(fraction))
}

fn is_like_action(interaction_type: &Value) -> bool {
    match interaction_type {
        Value::String(name) => name.ends_with("LikeAction"),
        Value::Object(map) => map
            .get("@type")
            .and_then(Value::as_str)
            .is_some_and(|name| name.ends_with("LikeAction")),
        _ => false,
    }
}

fn count_value(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// `userInteractionCount` of the first `LikeAction` statistic in a JSON-LD
/// value, searching arrays and `@graph` nodes
fn like_count(value: &Value) -> Option<u64> {
    match value {
        Value::Array(items) => items.iter().find_map(like_count),
        Value::Object(map) => {
            let direct = map.get("interactionStatistic").and_then(|stats| {
                let stats: Vec<&Value> = match stats {
                    Value::Array(items) => items.iter().collect(),
                    other => vec![other],
                };
                stats.into_iter().find_map(|stat| {
                    stat.get("interactionType")
                        .filter(|kind| is_like_action(kind))
                        .and_then(|_| stat.get("userInteractionCount"))
                        .and_then(count_value)
                })
            });
            direct.or_else(|| map.get("@graph").and_then(like_count))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const PAGE_URL: &str = "https://medium.com/@writer/the-story-abc123";

    fn extractor() -> ArticleExtractor {
        ArticleExtractor::new().unwrap()
    }

    fn count_pattern() -> Regex {
        Regex::new(r"(\d[\d,]*)(?:\.(\d+))?(?:\s?([KkMm])\b)?").unwrap()
    }

    #[test]
    fn test_extractor_creation() {
        assert!(ArticleExtractor::new().is_ok());
    }

    #[test]
    fn test_meta_title_used_when_no_heading() {
        let html = r#"<html><head>
            <meta property="og:title" content="Only In Meta">
            <title>Document Title</title>
        </head><body><p>nothing</p></body></html>"#;

        let record = extractor().extract(html, PAGE_URL);
        assert_eq!(record.title, "Only In Meta");
    }

    #[test]
    fn test_document_title_is_last_resort() {
        let html = "<html><head><title> Document Title </title></head><body></body></html>";
        assert_eq!(extractor().extract(html, PAGE_URL).title, "Document Title");
    }

    #[test]
    fn test_missing_fields_stay_empty() {
        let record = extractor().extract("<html><body></body></html>", PAGE_URL);

        assert_eq!(record.url, PAGE_URL);
        assert!(record.title.is_empty());
        assert!(record.subtitle.is_empty());
        assert!(record.body_text.is_empty());
        assert!(record.image_urls.is_empty());
        assert_eq!(record.claps, 0);
    }

    #[test]
    fn test_subtitle_prefers_story_subtitle() {
        let html = r#"<html><head><meta name="description" content="From description"></head>
            <body><article><h2>Plain heading</h2><h2 data-testid="storySubtitle">The real subtitle</h2></article></body></html>"#;
        assert_eq!(extractor().extract(html, PAGE_URL).subtitle, "The real subtitle");
    }

    #[test]
    fn test_body_skips_short_blocks_and_noise() {
        let html = r#"<html><body>
            <header><p>Header text that is long enough</p></header>
            <article>
              <section>
                <h1>A title that counts as a block</h1>
                <p>tiny</p>
                <p>First real paragraph of the story.<script>var x = "ignored script";</script></p>
                <nav><p>Navigation paragraph long enough</p></nav>
                <p>Second real paragraph of the story.</p>
              </section>
            </article>
        </body></html>"#;

        let record = extractor().extract(html, PAGE_URL);
        assert_eq!(
            record.body_text,
            "A title that counts as a block\n\nFirst real paragraph of the story.\n\nSecond real paragraph of the story."
        );
    }

    #[test]
    fn test_body_falls_back_to_next_container() {
        let html = r#"<html><body>
            <article><section><p>short</p></section><p>Paragraph directly in the article.</p></article>
        </body></html>"#;

        assert_eq!(
            extractor().extract(html, PAGE_URL).body_text,
            "Paragraph directly in the article."
        );
    }

    #[test]
    fn test_duplicate_image_kept_once() {
        let html = r#"<html><body>
            <img src="https://cdn.example.com/a.png">
            <img data-src="https://cdn.example.com/b.png">
            <img src="https://cdn.example.com/a.png">
        </body></html>"#;

        let record = extractor().extract(html, PAGE_URL);
        assert_eq!(
            record.image_urls,
            vec!["https://cdn.example.com/a.png", "https://cdn.example.com/b.png"]
        );
        assert_eq!(record.num_images(), 2);
    }

    #[test]
    fn test_cdn_size_params_are_stripped() {
        let html = r#"<html><body>
            <img src="https://miro.medium.com/v2/resize:fit:700/1*abc.png?w=700&q=20">
            <picture>
              <source srcset="https://miro.medium.com/v2/1*pic.webp?q=75&w=640 640w, https://miro.medium.com/v2/1*pic.webp 1400w">
              <source srcset="https://other.example.com/ignored.webp">
            </picture>
        </body></html>"#;

        let record = extractor().extract(html, PAGE_URL);
        assert_eq!(
            record.image_urls,
            vec![
                "https://miro.medium.com/v2/resize:fit:700/1*abc.png",
                "https://miro.medium.com/v2/1*pic.webp",
            ]
        );
    }

    #[test]
    fn test_external_links_exclude_platform_hosts() {
        let html = r#"<html><body>
            <a href="/@writer">profile</a>
            <a href="https://example.com/ref">ref</a>
            <a href="https://example.com/ref">again</a>
            <a href="https://blog.medium.com/post">platform</a>
            <a href="mailto:someone@example.com">mail</a>
            <a href="relative/path">relative</a>
            <a href="https://docs.rs/tokio">docs</a>
        </body></html>"#;

        let record = extractor().extract(html, PAGE_URL);
        assert_eq!(
            record.external_link_urls,
            vec!["https://example.com/ref", "https://docs.rs/tokio"]
        );
    }

    #[test]
    fn test_author_relative_href_is_made_absolute() {
        let html = r#"<html><body><a rel="author" href="/@writer">Jane Writer</a></body></html>"#;

        let record = extractor().extract(html, PAGE_URL);
        assert_eq!(record.author_name, "Jane Writer");
        assert_eq!(record.author_url, "https://medium.com/@writer");
    }

    #[test]
    fn test_author_from_meta_has_no_url() {
        let html = r#"<html><head><meta name="author" content="Meta Author"></head><body></body></html>"#;

        let record = extractor().extract(html, PAGE_URL);
        assert_eq!(record.author_name, "Meta Author");
        assert!(record.author_url.is_empty());
    }

    #[test]
    fn test_claps_from_aria_label() {
        let html = r#"<html><body><button data-testid="clap-button" aria-label="clap 42 times">clap</button></body></html>"#;
        assert_eq!(extractor().extract(html, PAGE_URL).claps, 42);
    }

    #[test]
    fn test_claps_from_text_with_suffix() {
        let html = r#"<html><body><div class="clapCount">1.2K</div></body></html>"#;
        assert_eq!(extractor().extract(html, PAGE_URL).claps, 1200);
    }

    #[test]
    fn test_structured_data_overrides_visible_claps() {
        let html = r#"<html><head>
            <script type="application/ld+json">
              {"@context": "https://schema.org", "@graph": [
                {"@type": "Person", "name": "Jane"},
                {"@type": "Article", "interactionStatistic": [
                  {"@type": "InteractionCounter", "interactionType": {"@type": "CommentAction"}, "userInteractionCount": 3},
                  {"@type": "InteractionCounter", "interactionType": {"@type": "LikeAction"}, "userInteractionCount": 512}
                ]}
              ]}
            </script>
        </head><body><div class="clapCount">40</div></body></html>"#;

        assert_eq!(extractor().extract(html, PAGE_URL).claps, 512);
    }

    #[test]
    fn test_invalid_structured_data_is_ignored() {
        let html = r#"<html><head><script type="application/ld+json">{not json</script></head>
            <body><div class="clapCount">40</div></body></html>"#;
        assert_eq!(extractor().extract(html, PAGE_URL).claps, 40);
    }

    #[rstest]
    #[case("42", Some(42))]
    #[case("1,234 claps", Some(1234))]
    #[case("1.2K", Some(1200))]
    #[case("3.45k claps", Some(3450))]
    #[case("2M", Some(2_000_000))]
    #[case("12 minutes", Some(12))]
    #[case("no digits", None)]
    fn test_parse_count(#[case] text: &str, #[case] expected: Option<u64>) {
        assert_eq!(parse_count(&count_pattern(), text), expected);
    }

    #[test]
    fn test_like_count_accepts_single_statistic_and_string_count() {
        let value: Value = serde_json::json!({
            "interactionStatistic": {
                "interactionType": "https://schema.org/LikeAction",
                "userInteractionCount": "77"
            }
        });
        assert_eq!(like_count(&value), Some(77));
    }

    #[test]
    fn test_reading_time_from_selector() {
        let html = r#"<html><body><span data-testid="storyReadingTime">7 min read</span></body></html>"#;
        assert_eq!(extractor().extract(html, PAGE_URL).reading_time, "7 min read");
    }

    #[test]
    fn test_reading_time_from_title_attribute() {
        let html = r#"<html><body><div title="Reading takes 4 min">icon</div></body></html>"#;
        assert_eq!(
            extractor().extract(html, PAGE_URL).reading_time,
            "Reading takes 4 min"
        );
    }

    #[test]
    fn test_keywords_meta_then_tags_then_frequency() {
        let html = r#"<html><head><meta name="keywords" content="Rust, Async"></head><body>
            <article>
              <p>Ownership ownership ownership borrowing borrowing lifetimes.</p>
              <p>Lifetimes lifetimes lifetimes lifetimes ownership explained.</p>
            </article>
            <a href="/tag/programming">Programming</a>
            <a href="/tag/rust">Rust</a>
        </body></html>"#;

        let keywords = extractor().extract(html, PAGE_URL).keywords;
        assert_eq!(&keywords[..3], &["Rust", "Async", "Programming"]);
        assert_eq!(&keywords[3..6], &["lifetimes", "ownership", "borrowing"]);
        assert!(keywords.len() <= crate::domain::MAX_KEYWORDS);

        let mut unique = keywords.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), keywords.len());
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let html = r#"<html><head><meta name="keywords" content="a1b2, c3d4"></head><body>
            <article><p>Some paragraph with enough words to matter here.</p></article>
            <img src="https://cdn.example.com/x.png"><a href="https://example.org/">x</a>
        </body></html>"#;

        let extractor = extractor();
        assert_eq!(extractor.extract(html, PAGE_URL), extractor.extract(html, PAGE_URL));
    }
}
