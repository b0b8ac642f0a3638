//! Command-line interface definitions.
//!
//! Every subcommand works on the stores under the configured data directory.
//! `collect` and `ingest` are the two halves of `run`, and can be scheduled
//! separately.

use crate::collect::{CollectParams, KeywordSelection};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Harvest article URLs from RSS feeds and ingest the articles behind them.
///
/// # Examples
///
/// ```sh
/// # Collect up to 200 new URLs for the independent category, 3 rounds max
/// feed_harvest collect --category 0 --target 200 --max-rounds 3
///
/// # Download everything collected but not yet ingested
/// feed_harvest ingest --category 0
///
/// # Both categories end to end, concurrently, with a JSON report
/// feed_harvest run --target 100 --parallel --report-dir ./reports
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to a YAML config file (defaults to the bundled feed lists)
    #[arg(short, long, global = true, env = "FEED_HARVEST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding the URL and article stores (overrides the config)
    #[arg(short, long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Collect new URLs into the temp store and merge them into the canonical store
    Collect {
        #[arg(long)]
        category: u8,
        #[command(flatten)]
        collect: CollectArgs,
    },
    /// Fetch articles for canonical URLs that have no record yet, then retract 403s
    Ingest {
        #[arg(long)]
        category: u8,
    },
    /// Collect, merge, ingest and reconcile
    Run {
        /// Only this category; all configured categories when omitted
        #[arg(long)]
        category: Option<u8>,
        #[command(flatten)]
        collect: CollectArgs,
        /// Run categories concurrently
        #[arg(long)]
        parallel: bool,
        /// Write a JSON run report under this directory
        #[arg(long)]
        report_dir: Option<PathBuf>,
    },
    /// Print store sizes
    Stats {
        #[arg(long)]
        category: Option<u8>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct CollectArgs {
    /// Number of new URLs to collect
    #[arg(short, long)]
    pub target: usize,

    /// Maximum harvesting rounds over the feed list
    #[arg(long, default_value_t = 1)]
    pub max_rounds: usize,

    /// Cap on new URLs per round
    #[arg(long)]
    pub per_round_limit: Option<usize>,

    /// Ignore the configured keywords and accept every entry
    #[arg(long, conflicts_with = "keywords")]
    pub no_keywords: bool,

    /// Use these keywords instead of the configured ones (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub keywords: Option<Vec<String>>,
}

impl CollectArgs {
    pub fn params(&self) -> CollectParams {
        let keywords = match (&self.keywords, self.no_keywords) {
            (_, true) => KeywordSelection::Disabled,
            (Some(words), false) => KeywordSelection::Custom(words.clone()),
            (None, false) => KeywordSelection::Configured,
        };
        CollectParams {
            per_round_limit: self.per_round_limit,
            keywords,
            ..CollectParams::new(self.target, self.max_rounds)
        }
    }
}
