//! Selector configuration for article extraction
//!
//! Every field keeps its selectors as an ordered list. Order is priority:
//! the extractor tries them front to back and keeps the first non-empty
//! value.

use serde::{Deserialize, Serialize};

/// One selector and where its value comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorRule {
    pub css: String,
    /// Attribute to read; `None` reads the element's visible text
    #[serde(default)]
    pub attr: Option<String>,
}

impl SelectorRule {
    pub fn text(css: &str) -> Self {
        Self {
            css: css.to_string(),
            attr: None,
        }
    }

    pub fn attr(css: &str, attr: &str) -> Self {
        Self {
            css: css.to_string(),
            attr: Some(attr.to_string()),
        }
    }

    /// `content` attribute of a meta tag
    pub fn meta(css: &str) -> Self {
        Self::attr(css, "content")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArticleSelectors {
    pub title: Vec<SelectorRule>,
    pub subtitle: Vec<SelectorRule>,

    /// Body containers in priority order
    pub body_containers: Vec<String>,
    /// Text blocks collected inside the winning container
    pub body_blocks: String,
    /// Subtrees whose text never counts as body text
    pub body_noise: Vec<String>,
    /// Blocks at or below this many characters are dropped
    pub min_block_chars: usize,

    pub images: String,
    pub image_src_attrs: Vec<String>,
    pub pictures: String,
    /// Only the first match inside each picture is used
    pub picture_source: String,

    pub links: String,

    pub author: Vec<SelectorRule>,

    pub claps: Vec<String>,
    pub json_ld: String,

    pub reading_time: Vec<String>,
    /// Regex over `title` attributes used when no reading time selector matched
    pub reading_time_title_pattern: String,

    pub keywords_meta: String,
    pub tags: Vec<String>,
}

impl Default for ArticleSelectors {
    fn default() -> Self {
        Self {
            title: vec![
                SelectorRule::text("h1"),
                SelectorRule::text(r#"h1[data-testid="storyTitle"]"#),
                SelectorRule::text("h1.pw-post-title"),
                SelectorRule::text("article h1"),
                SelectorRule::meta(r#"meta[property="og:title"]"#),
                SelectorRule::text("title"),
            ],
            subtitle: vec![
                SelectorRule::text(r#"h2[data-testid="storySubtitle"]"#),
                SelectorRule::text("h2.pw-subtitle-paragraph"),
                SelectorRule::text("h2[data-selectable-paragraph]"),
                SelectorRule::text("article h2"),
                SelectorRule::meta(r#"meta[property="og:description"]"#),
                SelectorRule::meta(r#"meta[name="description"]"#),
            ],
            body_containers: vec![
                "article section".to_string(),
                "article".to_string(),
                r#"[data-testid="storyBody"]"#.to_string(),
                ".postArticle-content".to_string(),
            ],
            body_blocks: "p, h1, h2, h3, h4, h5, h6".to_string(),
            body_noise: ["script", "style", "nav", "header", "footer"]
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            min_block_chars: 10,
            images: "img".to_string(),
            image_src_attrs: vec!["src".to_string(), "data-src".to_string(), "data-lazy-src".to_string()],
            pictures: "picture".to_string(),
            picture_source: "source".to_string(),
            links: "a[href]".to_string(),
            author: vec![
                SelectorRule::text(r#"a[data-action="show-user-card"]"#),
                SelectorRule::text(r#"a[rel="author"]"#),
                SelectorRule::text(".author"),
                SelectorRule::meta(r#"meta[name="author"]"#),
                SelectorRule::meta(r#"meta[property="article:author"]"#),
            ],
            claps: vec![
                r#"button[data-testid="clap-button"]"#.to_string(),
                r#"[data-testid="clapCount"]"#.to_string(),
                ".clapCount".to_string(),
                r#"button[aria-label*="clap"]"#.to_string(),
            ],
            json_ld: r#"script[type="application/ld+json"]"#.to_string(),
            reading_time: vec![
                r#"[data-testid="storyReadingTime"]"#.to_string(),
                ".readingTime".to_string(),
                r#"span[title*="min read"]"#.to_string(),
                r#"span[title*="read"]"#.to_string(),
            ],
            reading_time_title_pattern: r"(?i)min.*read|read.*min".to_string(),
            keywords_meta: r#"meta[name="keywords"]"#.to_string(),
            tags: vec![
                r#"a[href*="/tag/"]"#.to_string(),
                ".tags a".to_string(),
                r#"[data-testid="tag"]"#.to_string(),
            ],
        }
    }
}
