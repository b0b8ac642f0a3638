//! Quota-bounded round collection and the merge into the canonical store.
//!
//! A collection run walks the category's feeds in order, round after round,
//! appending unseen links to the temp store until one of these holds:
//!
//! 1. the target count is reached,
//! 2. `max_rounds` rounds have run,
//! 3. a round added nothing (feeds do not change meaningfully within one run).
//!
//! Afterwards [`merge`] folds the temp store into the canonical store. Both
//! stores are re-read at the start of every round, so a run that crashed
//! halfway resumes from whatever reached the disk.

use crate::errors::StoreError;
use crate::harvest::{Harvester, KeywordFilter};
use crate::scrapers::FeedSource;
use crate::store::UrlStore;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info, instrument};

/// Which keyword filter a collection run applies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum KeywordSelection {
    /// The category's configured keywords, if any.
    #[default]
    Configured,
    /// Accept every entry.
    Disabled,
    Custom(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectParams {
    pub target_count: usize,
    pub max_rounds: usize,
    /// Upper bound on new URLs per round.
    pub per_round_limit: Option<usize>,
    pub keywords: KeywordSelection,
}

impl CollectParams {
    pub fn new(target_count: usize, max_rounds: usize) -> Self {
        Self {
            target_count,
            max_rounds,
            per_round_limit: None,
            keywords: KeywordSelection::Configured,
        }
    }

    pub(crate) fn filter(&self, configured: Option<&[String]>) -> Option<KeywordFilter> {
        match &self.keywords {
            KeywordSelection::Configured => configured.map(KeywordFilter::new),
            KeywordSelection::Disabled => None,
            KeywordSelection::Custom(words) => Some(KeywordFilter::new(words)),
        }
        .filter(|f| !f.is_empty())
    }
}

/// Progress of one collection run. Discarded when the run returns.
#[derive(Debug, Default, Clone, Copy)]
struct RoundState {
    accumulated: usize,
    round_index: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CollectOutcome {
    pub rounds: usize,
    pub new_urls: usize,
}

/// Drives a [`Harvester`] over one category's feeds into its temp store.
pub struct RoundCollector<'a, F> {
    harvester: &'a Harvester<F>,
    feeds: &'a [String],
    temp: &'a UrlStore,
    canonical: &'a UrlStore,
}

impl<'a, F: FeedSource> RoundCollector<'a, F> {
    pub fn new(
        harvester: &'a Harvester<F>,
        feeds: &'a [String],
        temp: &'a UrlStore,
        canonical: &'a UrlStore,
    ) -> Self {
        Self {
            harvester,
            feeds,
            temp,
            canonical,
        }
    }

    /// Run rounds until quota, `max_rounds` or stagnation.
    ///
    /// Only links actually appended to the temp store count toward the quota,
    /// so the returned `new_urls` never exceeds `target_count`. The only error
    /// is a failure to read or write a store.
    #[instrument(level = "info", skip_all, fields(target = target_count, max_rounds = max_rounds))]
    pub async fn collect(
        &self,
        target_count: usize,
        max_rounds: usize,
        per_round_limit: Option<usize>,
        filter: Option<&KeywordFilter>,
    ) -> Result<CollectOutcome, StoreError> {
        let mut state = RoundState::default();

        while state.accumulated < target_count && state.round_index < max_rounds {
            state.round_index += 1;
            let round_quota = (target_count - state.accumulated).min(per_round_limit.unwrap_or(usize::MAX));

            let mut known: HashSet<String> = self.temp.load().await?;
            known.extend(self.canonical.load().await?);

            let mut round_new = 0usize;
            for feed in self.feeds {
                let remaining = round_quota - round_new;
                if remaining == 0 {
                    break;
                }

                let links = self
                    .harvester
                    .harvest(feed, filter, Some(remaining), &known)
                    .await;
                if links.is_empty() {
                    debug!(feed = %feed, "No new links");
                    continue;
                }

                let batch: Vec<String> = links.into_iter().take(remaining).collect();
                let written = self.temp.append_new(&batch).await?;
                known.extend(batch);
                round_new += written;
                info!(
                    round = state.round_index,
                    feed = %feed,
                    written,
                    "Saved new links"
                );
            }

            state.accumulated += round_new;
            info!(
                round = state.round_index,
                round_new,
                accumulated = state.accumulated,
                target = target_count,
                "Round finished"
            );

            if round_new == 0 {
                info!(round = state.round_index, "No new links this round; stopping");
                break;
            }
        }

        Ok(CollectOutcome {
            rounds: state.round_index,
            new_urls: state.accumulated,
        })
    }
}

/// Fold the temp store into the canonical store, sorted, then empty the temp store.
///
/// Returns the canonical store's size. If the process stops between the two
/// writes, the next merge unions the same links again with the same result.
#[instrument(level = "info", skip_all, fields(temp = %temp.path().display(), canonical = %canonical.path().display()))]
pub async fn merge(temp: &UrlStore, canonical: &UrlStore) -> Result<usize, StoreError> {
    let size = temp.merge_sorted_into(canonical).await?;
    temp.clear().await?;
    Ok(size)
}
