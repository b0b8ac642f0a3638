//! Per-category orchestration of the four stages.
//!
//! ```text
//! collect:  RoundCollector ──▶ temp store ──merge──▶ canonical store
//! ingest:   canonical − article store ──fetch──▶ article store
//!           403s ──reconcile──▶ canonical store
//! ```
//!
//! Each category owns its stores, so [`Pipeline::run_all`] may run
//! categories concurrently once [`AppConfig::check_disjoint_stores`] passes.

use crate::collect::{self, CollectParams, RoundCollector};
use crate::config::{AppConfig, CategoryConfig};
use crate::errors::PipelineError;
use crate::harvest::Harvester;
use crate::ingest::{self, Ingestor};
use crate::models::{CategoryReport, CategoryStats, CollectReport, IngestReport};
use crate::scrapers::{ArticleSource, FeedSource};
use crate::store::{ArticleStore, UrlStore};
use futures::future::join_all;
use std::collections::HashSet;
use std::time::Instant;
use tracing::{error, info, instrument};

struct CategoryStores {
    canonical: UrlStore,
    temp: UrlStore,
    articles: ArticleStore,
}

pub struct Pipeline<F, A> {
    config: AppConfig,
    harvester: Harvester<F>,
    ingestor: Ingestor<A>,
}

impl<F: FeedSource, A: ArticleSource> Pipeline<F, A> {
    pub fn new(config: AppConfig, feeds: F, articles: A) -> Self {
        let concurrency = config.http.concurrency;
        Self {
            config,
            harvester: Harvester::new(feeds),
            ingestor: Ingestor::new(articles, concurrency),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn stores(&self, category: &CategoryConfig) -> CategoryStores {
        let paths = category.paths(&self.config.data_dir);
        CategoryStores {
            canonical: UrlStore::new(paths.urls),
            temp: UrlStore::new(paths.temp),
            articles: ArticleStore::new(paths.articles),
        }
    }

    /// Collect new URLs into the temp store, then merge once into the canonical store.
    ///
    /// # Arguments
    ///
    /// * `category_id` - The configured category to collect for
    /// * `params` - Target count, round limits and keyword selection
    ///
    /// # Returns
    ///
    /// A [`CollectReport`] with the rounds run, the URLs newly appended to the
    /// temp store and the canonical store size after the merge. Fails on an
    /// unknown category or a store I/O error.
    #[instrument(level = "info", skip(self, params), fields(target = params.target_count))]
    pub async fn collect(
        &self,
        category_id: u8,
        params: &CollectParams,
    ) -> Result<CollectReport, PipelineError> {
        let category = self.config.category(category_id)?;
        let stores = self.stores(category);
        let filter = params.filter(category.keywords.as_deref());
        let t0 = Instant::now();

        let outcome = RoundCollector::new(
            &self.harvester,
            &category.feeds,
            &stores.temp,
            &stores.canonical,
        )
        .collect(
            params.target_count,
            params.max_rounds,
            params.per_round_limit,
            filter.as_ref(),
        )
        .await?;
        let canonical_size = collect::merge(&stores.temp, &stores.canonical).await?;

        info!(
            category = category_id,
            rounds = outcome.rounds,
            new_urls = outcome.new_urls,
            canonical_size,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Collection complete"
        );
        Ok(CollectReport {
            category: category_id,
            rounds: outcome.rounds,
            new_urls: outcome.new_urls,
            canonical_size,
        })
    }

    /// Ingest the pending delta, then retract URLs that answered 403.
    ///
    /// # Returns
    ///
    /// An [`IngestReport`]. Per-URL fetch failures are counted in it, so only
    /// an unknown category or a store error is returned as `Err`.
    #[instrument(level = "info", skip(self))]
    pub async fn ingest(&self, category_id: u8) -> Result<IngestReport, PipelineError> {
        let category = self.config.category(category_id)?;
        let stores = self.stores(category);
        let t0 = Instant::now();

        let outcome = self
            .ingestor
            .ingest(category.label(), &stores.canonical, &stores.articles)
            .await?;
        let retracted = ingest::reconcile(&stores.canonical, &outcome.permanently_failed).await?;

        info!(
            category = category_id,
            succeeded = outcome.succeeded,
            failed = outcome.failed,
            retracted,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Ingestion complete"
        );
        Ok(IngestReport {
            category: category_id,
            delta: outcome.delta,
            succeeded: outcome.succeeded,
            failed: outcome.failed,
            empty_text: outcome.empty_text,
            permanently_failed: outcome.permanently_failed,
            retracted,
        })
    }

    /// All four stages for one category, in order.
    ///
    /// A fatal error is recorded in the report; ingestion is skipped when
    /// collection failed.
    pub async fn run(&self, category_id: u8, params: &CollectParams) -> CategoryReport {
        let mut report = CategoryReport {
            category: category_id,
            name: self
                .config
                .category(category_id)
                .map(|c| c.name.clone())
                .unwrap_or_default(),
            ..Default::default()
        };

        match self.collect(category_id, params).await {
            Ok(collected) => report.collect = Some(collected),
            Err(e) => {
                error!(category = category_id, error = %e, "Collection failed");
                report.error = Some(e.to_string());
                return report;
            }
        }

        match self.ingest(category_id).await {
            Ok(ingested) => report.ingest = Some(ingested),
            Err(e) => {
                error!(category = category_id, error = %e, "Ingestion failed");
                report.error = Some(e.to_string());
            }
        }
        report
    }

    /// Run every configured category, concurrently when `parallel` is set.
    ///
    /// Fails up front only if `parallel` is set and two categories share a store.
    #[instrument(level = "info", skip(self, params))]
    pub async fn run_all(
        &self,
        params: &CollectParams,
        parallel: bool,
    ) -> Result<Vec<CategoryReport>, PipelineError> {
        let ids: Vec<u8> = self.config.categories.iter().map(|c| c.id).collect();

        if parallel {
            self.config.check_disjoint_stores()?;
            info!(categories = ids.len(), "Running categories concurrently");
            return Ok(join_all(ids.iter().map(|&id| self.run(id, params))).await);
        }

        let mut reports = Vec::with_capacity(ids.len());
        for id in ids {
            reports.push(self.run(id, params).await);
        }
        Ok(reports)
    }

    /// Current store sizes for one category. Read-only.
    pub async fn stats(&self, category_id: u8) -> Result<CategoryStats, PipelineError> {
        let category = self.config.category(category_id)?;
        let stores = self.stores(category);

        let canonical = stores.canonical.load().await?;
        let temp = stores.temp.load().await?;
        let records = stores.articles.load_records().await?;
        let processed: HashSet<&str> = records.iter().map(|r| r.url.as_str()).collect();
        let pending = canonical
            .iter()
            .filter(|url| !processed.contains(url.as_str()))
            .count();

        Ok(CategoryStats {
            category: category_id,
            name: category.name.clone(),
            canonical_urls: canonical.len(),
            temp_urls: temp.len(),
            articles: records.len(),
            empty_text_articles: records.iter().filter(|r| r.text.trim().is_empty()).count(),
            pending,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::KeywordSelection;
    use crate::errors::ConfigError;
    use crate::scrapers::fakes::{FixedArticles, ScriptedFeeds};
    use tempfile::TempDir;

    const CONFIG: &str = r#"
categories:
  - id: 0
    name: independent
    feeds: ["https://telex.hu/rss"]
  - id: 1
    name: government
    feeds: ["https://888.hu/rss"]
    keywords: ["orbán"]
"#;

    fn config(dir: &TempDir) -> AppConfig {
        let mut config = AppConfig::from_yaml(CONFIG).unwrap();
        config.data_dir = dir.path().to_path_buf();
        config
    }

    #[tokio::test]
    async fn test_run_collects_merges_ingests_and_retracts() {
        let dir = TempDir::new().unwrap();
        let feeds = ScriptedFeeds::new();
        feeds.push(
            "https://telex.hu/rss",
            &["https://telex.hu/a", "https://telex.hu/b", "https://telex.hu/c"],
        );
        let articles = FixedArticles::new()
            .ok("https://telex.hu/a", "első")
            .ok("https://telex.hu/b", "második")
            .status("https://telex.hu/c", 403);
        let pipeline = Pipeline::new(config(&dir), &feeds, &articles);

        let report = pipeline.run(0, &CollectParams::new(10, 2)).await;

        assert!(report.error.is_none());
        assert_eq!(report.name, "independent");
        let collected = report.collect.unwrap();
        assert_eq!(collected.new_urls, 3);
        assert_eq!(collected.canonical_size, 3);
        let ingested = report.ingest.unwrap();
        assert_eq!(ingested.succeeded, 2);
        assert_eq!(ingested.retracted, 1);

        let stats = pipeline.stats(0).await.unwrap();
        assert_eq!(stats.canonical_urls, 2);
        assert_eq!(stats.temp_urls, 0);
        assert_eq!(stats.articles, 2);
        assert_eq!(stats.pending, 0);
    }

    #[tokio::test]
    async fn test_configured_keywords_filter_collection() {
        let dir = TempDir::new().unwrap();
        let feeds = ScriptedFeeds::new();
        feeds.push_entries(
            "https://888.hu/rss",
            vec![
                crate::models::FeedEntry {
                    link: "https://888.hu/sport".into(),
                    title: "Foci".into(),
                    summary: None,
                },
                crate::models::FeedEntry {
                    link: "https://888.hu/orban".into(),
                    title: "Orbán Viktor beszéde".into(),
                    summary: None,
                },
            ],
        );
        let articles = FixedArticles::new();
        let pipeline = Pipeline::new(config(&dir), &feeds, &articles);

        let report = pipeline.collect(1, &CollectParams::new(5, 1)).await.unwrap();
        assert_eq!(report.new_urls, 1);

        let mut unfiltered = CollectParams::new(5, 1);
        unfiltered.keywords = KeywordSelection::Disabled;
        let report = pipeline.collect(1, &unfiltered).await.unwrap();
        assert_eq!(report.new_urls, 1);
        assert_eq!(report.canonical_size, 2);
    }

    #[tokio::test]
    async fn test_second_ingest_does_not_refetch() {
        let dir = TempDir::new().unwrap();
        let feeds = ScriptedFeeds::new();
        feeds.push("https://telex.hu/rss", &["https://telex.hu/a"]);
        let articles = FixedArticles::new().ok("https://telex.hu/a", "szöveg");
        let pipeline = Pipeline::new(config(&dir), &feeds, &articles);

        pipeline.collect(0, &CollectParams::new(1, 1)).await.unwrap();
        let first = pipeline.ingest(0).await.unwrap();
        let second = pipeline.ingest(0).await.unwrap();

        assert_eq!(first.succeeded, 1);
        assert_eq!(second.delta, 0);
        assert_eq!(articles.calls.borrow().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_category_is_reported_not_panicked() {
        let dir = TempDir::new().unwrap();
        let feeds = ScriptedFeeds::new();
        let articles = FixedArticles::new();
        let pipeline = Pipeline::new(config(&dir), &feeds, &articles);

        let report = pipeline.run(9, &CollectParams::new(1, 1)).await;
        assert!(report.error.is_some());
        assert!(report.collect.is_none());
        assert!(matches!(
            pipeline.stats(9).await,
            Err(PipelineError::Config(ConfigError::Invalid(_)))
        ));
    }

    #[tokio::test]
    async fn test_run_all_parallel_covers_every_category() {
        let dir = TempDir::new().unwrap();
        let feeds = ScriptedFeeds::new();
        feeds.push("https://telex.hu/rss", &["https://telex.hu/a"]);
        feeds.push_failure("https://888.hu/rss");
        let articles = FixedArticles::new().ok("https://telex.hu/a", "szöveg");
        let pipeline = Pipeline::new(config(&dir), &feeds, &articles);

        let reports = pipeline.run_all(&CollectParams::new(5, 2), true).await.unwrap();

        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.error.is_none()));
        assert_eq!(reports[0].collect.as_ref().unwrap().new_urls, 1);
        assert_eq!(reports[1].collect.as_ref().unwrap().new_urls, 0);
        assert!(dir.path().join("0_articles.csv").exists());
        assert!(!dir.path().join("1_articles.csv").exists());
    }

    #[tokio::test]
    async fn test_run_all_parallel_rejects_shared_stores() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        for category in &mut config.categories {
            category.article_store = Some("articles.csv".into());
        }
        let feeds = ScriptedFeeds::new();
        let articles = FixedArticles::new();
        let pipeline = Pipeline::new(config, &feeds, &articles);

        assert!(pipeline.run_all(&CollectParams::new(1, 1), true).await.is_err());
        assert!(feeds.calls.borrow().is_empty());
    }
}
