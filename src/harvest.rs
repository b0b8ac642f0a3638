//! Feed harvester: turns one feed into a bounded list of candidate links.

use crate::models::FeedEntry;
use crate::scrapers::FeedSource;
use crate::store::urls;
use std::collections::HashSet;
use tracing::{debug, instrument, warn};

/// Case-insensitive substring filter over an entry's title and summary.
#[derive(Debug, Clone, Default)]
pub struct KeywordFilter {
    keywords: Vec<String>,
}

impl KeywordFilter {
    /// Build a filter; blank keywords are dropped.
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    pub fn matches(&self, entry: &FeedEntry) -> bool {
        let text = entry.searchable_text().to_lowercase();
        self.keywords.iter().any(|k| text.contains(k.as_str()))
    }
}

/// Harvests links from feeds through a [`FeedSource`].
#[derive(Debug)]
pub struct Harvester<F> {
    source: F,
}

impl<F: FeedSource> Harvester<F> {
    pub fn new(source: F) -> Self {
        Self { source }
    }

    /// Collect up to `limit` distinct links from `feed_url`, in feed order.
    ///
    /// A feed that cannot be fetched or parsed yields an empty list. The error
    /// is logged and never propagated.
    ///
    /// # Arguments
    ///
    /// * `feed_url` - The feed to download
    /// * `filter` - Keyword filter on title and summary; `None` accepts all
    /// * `limit` - Maximum links returned; `None` for no bound
    /// * `known` - Links already stored; they are skipped and not counted
    ///
    /// # Returns
    ///
    /// Distinct non-empty links, at most `limit` of them.
    #[instrument(level = "info", skip(self, filter, known))]
    pub async fn harvest(
        &self,
        feed_url: &str,
        filter: Option<&KeywordFilter>,
        limit: Option<usize>,
        known: &HashSet<String>,
    ) -> Vec<String> {
        if limit == Some(0) {
            return Vec::new();
        }

        let entries = match self.source.fetch_feed(feed_url).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(feed = feed_url, error = %e, "Feed unavailable; skipping");
                return Vec::new();
            }
        };

        let filter = filter.filter(|f| !f.is_empty());
        let mut seen = HashSet::new();
        let mut accepted = Vec::new();
        for entry in &entries {
            if limit.is_some_and(|l| accepted.len() >= l) {
                break;
            }
            let link = entry.link.trim();
            if link.is_empty() || urls::contains(known, link) {
                continue;
            }
            if let Some(filter) = filter {
                if !filter.matches(entry) {
                    continue;
                }
            }
            if seen.insert(link.to_string()) {
                accepted.push(link.to_string());
            }
        }

        debug!(
            feed = feed_url,
            entries = entries.len(),
            accepted = accepted.len(),
            "Harvested feed"
        );
        accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::fakes::ScriptedFeeds;

    const FEED: &str = "https://telex.hu/rss";

    fn entry(link: &str, title: &str, summary: Option<&str>) -> FeedEntry {
        FeedEntry {
            link: link.to_string(),
            title: title.to_string(),
            summary: summary.map(str::to_string),
        }
    }

    #[test]
    fn test_keyword_filter_is_case_insensitive_substring() {
        let filter = KeywordFilter::new(["Orbán", "  ", "NATO"]);
        assert!(filter.matches(&entry("u", "Az ORBÁN-kormány döntött", None)));
        assert!(filter.matches(&entry("u", "Hírek", Some("a nato csúcs"))));
        assert!(!filter.matches(&entry("u", "Időjárás", Some("eső"))));
    }

    #[tokio::test]
    async fn test_harvest_without_filter_respects_limit_in_feed_order() {
        let feeds = ScriptedFeeds::new();
        feeds.push(FEED, &["https://a.hu/1", "", "https://a.hu/2", "https://a.hu/1", "https://a.hu/3"]);
        let harvester = Harvester::new(&feeds);

        let links = harvester.harvest(FEED, None, Some(2), &HashSet::new()).await;
        assert_eq!(links, vec!["https://a.hu/1", "https://a.hu/2"]);

        let all = harvester.harvest(FEED, None, None, &HashSet::new()).await;
        assert_eq!(all, vec!["https://a.hu/1", "https://a.hu/2", "https://a.hu/3"]);
    }

    #[tokio::test]
    async fn test_harvest_applies_keyword_filter() {
        let feeds = ScriptedFeeds::new();
        feeds.push_entries(
            FEED,
            vec![
                entry("https://a.hu/weather", "Időjárás", None),
                entry("https://a.hu/war", "Háború", Some("Ukrajna")),
                entry("https://a.hu/tax", "Gazdaság", Some("Új adó jön")),
            ],
        );
        let filter = KeywordFilter::new(["ukrajna", "adó"]);
        let links = Harvester::new(&feeds)
            .harvest(FEED, Some(&filter), None, &HashSet::new())
            .await;
        assert_eq!(links, vec!["https://a.hu/war", "https://a.hu/tax"]);
    }

    #[tokio::test]
    async fn test_known_links_do_not_use_up_limit() {
        let feeds = ScriptedFeeds::new();
        feeds.push(FEED, &["https://a.hu/1", "https://a.hu/2", "https://a.hu/3"]);
        let known: HashSet<String> = ["https://a.hu/1".to_string()].into();

        let links = Harvester::new(&feeds).harvest(FEED, None, Some(1), &known).await;
        assert_eq!(links, vec!["https://a.hu/2"]);
    }

    #[tokio::test]
    async fn test_failing_feed_yields_nothing() {
        let feeds = ScriptedFeeds::new();
        feeds.push_failure(FEED);
        let links = Harvester::new(&feeds).harvest(FEED, None, None, &HashSet::new()).await;
        assert!(links.is_empty());
    }

    #[tokio::test]
    async fn test_zero_limit_skips_fetch() {
        let feeds = ScriptedFeeds::new();
        feeds.push(FEED, &["https://a.hu/1"]);
        let links = Harvester::new(&feeds).harvest(FEED, None, Some(0), &HashSet::new()).await;
        assert!(links.is_empty());
        assert_eq!(feeds.calls_to(FEED), 0);
    }
}
