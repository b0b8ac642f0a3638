//! Article page fetcher and text extractor.
//!
//! Downloads a page with `reqwest` and pulls the headline and body text out
//! of the HTML with `scraper`:
//!
//! - **Title**: `og:title` meta tag, then `<title>`, then the first `<h1>`
//! - **Text**: paragraphs inside `<article>`, then inside `<main>`, then every
//!   `<p>` on the page
//!
//! Any non-2xx response becomes an [`ArticleError`] carrying the status code.

use super::ArticleSource;
use crate::errors::{ArticleError, ArticleErrorKind};
use crate::models::ArticleContent;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::CONTENT_TYPE;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};

static OG_TITLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[property="og:title"]"#).expect("valid selector"));
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").expect("valid selector"));
static H1: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").expect("valid selector"));
static BODY_PARAGRAPHS: Lazy<[Selector; 3]> = Lazy::new(|| {
    ["article p", "main p", "p"].map(|s| Selector::parse(s).expect("valid selector"))
});
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

#[derive(Debug, Clone)]
pub struct HttpArticleSource {
    client: reqwest::Client,
}

impl HttpArticleSource {
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl ArticleSource for HttpArticleSource {
    #[instrument(level = "debug", skip(self))]
    async fn fetch_article(&self, url: &str) -> Result<ArticleContent, ArticleError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ArticleError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ArticleError::http(url, status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        if !content_type.is_empty() && !content_type.contains("html") {
            return Err(ArticleError::new(
                url,
                ArticleErrorKind::Extract,
                Some(status.as_u16()),
                format!("unsupported content type {content_type}"),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ArticleError::from_reqwest(url, e))?;
        let article = extract_article(&body);
        debug!(bytes = article.text.len(), "Extracted article");
        Ok(article)
    }
}

fn normalize(s: &str) -> String {
    WHITESPACE.replace_all(s, " ").trim().to_string()
}

fn element_text(el: ElementRef<'_>) -> String {
    normalize(&el.text().collect::<String>())
}

/// Extract the title and paragraph text of an HTML page.
///
/// Paragraphs are separated by a blank line. A page without paragraphs
/// yields empty text, not an error.
pub fn extract_article(html: &str) -> ArticleContent {
    let document = Html::parse_document(html);

    let title = document
        .select(&OG_TITLE)
        .find_map(|m| m.value().attr("content").map(normalize))
        .filter(|t| !t.is_empty())
        .or_else(|| document.select(&TITLE).map(element_text).find(|t| !t.is_empty()))
        .or_else(|| document.select(&H1).map(element_text).find(|t| !t.is_empty()))
        .unwrap_or_default();

    let text = BODY_PARAGRAPHS
        .iter()
        .map(|selector| {
            document
                .select(selector)
                .map(element_text)
                .filter(|p| !p.is_empty())
                .collect::<Vec<_>>()
        })
        .find(|paragraphs| !paragraphs.is_empty())
        .map(|paragraphs| paragraphs.join("\n\n"))
        .unwrap_or_default();

    ArticleContent { title, text }
}
