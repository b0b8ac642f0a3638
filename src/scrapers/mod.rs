//! External fetch capabilities.
//!
//! The pipeline only talks to the network through two traits:
//!
//! | Trait | HTTP implementation | Returns |
//! |-------|---------------------|---------|
//! | [`FeedSource`] | [`feed::HttpFeedSource`] | entries of an RSS/Atom feed |
//! | [`ArticleSource`] | [`article::HttpArticleSource`] | title and text of an article page |
//!
//! Both report failures as typed errors instead of panicking, so a caller can
//! decide whether to skip, retract or retry. [`retry::RetryFetch`] wraps either
//! one with exponential backoff for transient failures.

pub mod article;
pub mod feed;
pub mod retry;

use crate::errors::{ArticleError, FetchError};
use crate::models::{ArticleContent, FeedEntry};

/// Something that can list the entries of a feed.
pub trait FeedSource {
    async fn fetch_feed(&self, url: &str) -> Result<Vec<FeedEntry>, FetchError>;
}

/// Something that can download and extract one article.
pub trait ArticleSource {
    async fn fetch_article(&self, url: &str) -> Result<ArticleContent, ArticleError>;
}

impl<T: FeedSource> FeedSource for &T {
    async fn fetch_feed(&self, url: &str) -> Result<Vec<FeedEntry>, FetchError> {
        (**self).fetch_feed(url).await
    }
}

impl<T: ArticleSource> ArticleSource for &T {
    async fn fetch_article(&self, url: &str) -> Result<ArticleContent, ArticleError> {
        (**self).fetch_article(url).await
    }
}

/// Build the shared HTTP client from config.
pub fn http_client(http: &crate::config::HttpConfig) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(http.timeout())
        .user_agent(http.user_agent.clone())
        .build()
}
