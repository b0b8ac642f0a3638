//! Data models shared across the pipeline.
//!
//! - [`FeedEntry`]: one entry as returned by a feed source
//! - [`ArticleContent`]: the extracted title and text of one article
//! - [`ArticleRecord`]: a row of the article store
//! - Reports: [`CollectReport`], [`IngestReport`], [`CategoryReport`], [`RunReport`]
//! - [`CategoryStats`]: store sizes for `stats`

use serde::{Deserialize, Serialize};

/// A single feed entry, already decoded from RSS or Atom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    /// Absolute URL of the linked article. May be empty for malformed entries.
    pub link: String,
    pub title: String,
    /// Plain-text summary, if the feed carried one.
    pub summary: Option<String>,
}

impl FeedEntry {
    /// Title and summary joined by a space, as matched by keyword filters.
    pub fn searchable_text(&self) -> String {
        format!("{} {}", self.title, self.summary.as_deref().unwrap_or(""))
    }
}

/// Title and body text extracted from an article page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArticleContent {
    pub title: String,
    pub text: String,
}

/// A row of the article store, keyed by `url`.
///
/// The field order defines the CSV header: `url,title,text,label`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ArticleRecord {
    pub url: String,
    pub title: String,
    pub text: String,
    pub label: i64,
}

/// Outcome of one `collect` invocation (Round Collector + Merger).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectReport {
    pub category: u8,
    pub rounds: usize,
    /// URLs newly appended to the temp store by this invocation.
    pub new_urls: usize,
    /// Size of the canonical store after the merge.
    pub canonical_size: usize,
}

/// Outcome of one `ingest` invocation (Ingestion + Reconciler).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub category: u8,
    pub delta: usize,
    pub succeeded: usize,
    /// Failed fetches that stay in the delta. 403s are counted in `permanently_failed` instead.
    pub failed: usize,
    pub empty_text: usize,
    pub permanently_failed: Vec<String>,
    /// URLs removed from the canonical store by reconciliation.
    pub retracted: usize,
}

/// The four stages of one category, or the fatal error that stopped them.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CategoryReport {
    pub category: u8,
    pub name: String,
    pub collect: Option<CollectReport>,
    pub ingest: Option<IngestReport>,
    pub error: Option<String>,
}

/// Store sizes for one category, as printed by `stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryStats {
    pub category: u8,
    pub name: String,
    pub canonical_urls: usize,
    pub temp_urls: usize,
    pub articles: usize,
    pub empty_text_articles: usize,
    /// Canonical URLs with no article record yet.
    pub pending: usize,
}

/// A whole `run` across categories, as written to the JSON report.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub local_date: String,
    pub local_time: String,
    pub categories: Vec<CategoryReport>,
}

impl RunReport {
    pub fn failed_categories(&self) -> usize {
        self.categories.iter().filter(|c| c.error.is_some()).count()
    }
}
