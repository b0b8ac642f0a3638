//! Article ingestion and retraction of permanently failing URLs.
//!
//! [`Ingestor::ingest`] downloads every canonical URL that has no article
//! record yet and appends the successes in one batch. It never touches the
//! canonical store. URLs that answered HTTP 403 come back in
//! [`IngestOutcome::permanently_failed`], and [`reconcile`] removes them from
//! the canonical store afterwards.

use crate::errors::{ArticleError, StoreError};
use crate::models::{ArticleContent, ArticleRecord};
use crate::scrapers::ArticleSource;
use crate::store::{ArticleStore, UrlStore};
use crate::utils::truncate_for_log;
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use std::collections::HashSet;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestOutcome {
    pub delta: usize,
    pub succeeded: usize,
    /// Failures left for a later run. 403s are in `permanently_failed` only.
    pub failed: usize,
    pub empty_text: usize,
    pub permanently_failed: Vec<String>,
}

/// Fetches article content for the canonical-minus-processed delta.
#[derive(Debug)]
pub struct Ingestor<A> {
    source: A,
    concurrency: usize,
}

impl<A: ArticleSource> Ingestor<A> {
    pub fn new(source: A, concurrency: usize) -> Self {
        Self {
            source,
            concurrency: concurrency.max(1),
        }
    }

    /// Fetch and record every canonical URL without an article record.
    ///
    /// Per-URL failures are counted, not propagated. Only reading the stores
    /// or writing the batch can fail. Records fetched before such a failure
    /// are not written, and their URLs stay in the delta for the next run.
    #[instrument(level = "info", skip_all, fields(canonical = %canonical.path().display(), articles = %articles.path().display(), label = label))]
    pub async fn ingest(
        &self,
        label: i64,
        canonical: &UrlStore,
        articles: &ArticleStore,
    ) -> Result<IngestOutcome, StoreError> {
        let source_urls = canonical.load().await?;
        let processed = articles.load_urls().await?;
        let delta: Vec<String> = source_urls
            .difference(&processed)
            .cloned()
            .sorted()
            .collect();

        info!(
            total = source_urls.len(),
            processed = processed.len(),
            delta = delta.len(),
            "Computed ingestion delta"
        );
        if delta.is_empty() {
            info!("No new articles to process");
            return Ok(IngestOutcome::default());
        }

        let results: Vec<(String, Result<ArticleContent, ArticleError>)> = stream::iter(delta.iter())
            .map(|url| async move { (url.clone(), self.source.fetch_article(url).await) })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut outcome = IngestOutcome {
            delta: delta.len(),
            ..Default::default()
        };
        let mut records = Vec::new();
        for (url, result) in results {
            match result {
                Ok(content) => {
                    if content.text.trim().is_empty() {
                        warn!(%url, "Empty text extracted; recording anyway");
                        outcome.empty_text += 1;
                    }
                    debug!(%url, preview = %truncate_for_log(&content.text, 120), "Fetched article");
                    outcome.succeeded += 1;
                    records.push(ArticleRecord {
                        url,
                        title: content.title,
                        text: content.text,
                        label,
                    });
                }
                Err(e) if e.is_forbidden() => {
                    warn!(%url, error = %e, "403 Forbidden; marking URL for retraction");
                    outcome.permanently_failed.push(url);
                }
                Err(e) => {
                    error!(%url, error = %e, "Article fetch failed; will retry next run");
                    outcome.failed += 1;
                }
            }
        }
        outcome.permanently_failed.sort();

        records.sort_by(|a, b| a.url.cmp(&b.url));
        articles.append(&records).await?;

        info!(
            succeeded = outcome.succeeded,
            failed = outcome.failed,
            forbidden = outcome.permanently_failed.len(),
            empty_text = outcome.empty_text,
            "Ingestion finished"
        );
        Ok(outcome)
    }
}

/// Remove permanently failing URLs from the canonical store.
///
/// A no-op without any file access when `permanently_failed` is empty.
/// Returns the number of lines removed.
#[instrument(level = "info", skip_all, fields(canonical = %canonical.path().display(), count = permanently_failed.len()))]
pub async fn reconcile(
    canonical: &UrlStore,
    permanently_failed: &[String],
) -> Result<usize, StoreError> {
    if permanently_failed.is_empty() {
        return Ok(0);
    }
    let exclude: HashSet<String> = permanently_failed.iter().cloned().collect();
    let removed = canonical.rewrite_excluding(&exclude).await?;
    info!(removed, "Retracted permanently failing URLs");
    Ok(removed)
}
