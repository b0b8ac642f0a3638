//! # Feed Harvest
//!
//! Builds a labelled news-article dataset from RSS feeds, one category at a
//! time, in four resumable stages:
//!
//! 1. **Collect**: harvest new article links from the category's feeds,
//!    round after round, into a temp store until a target count is met
//! 2. **Merge**: fold the temp store into the canonical URL store
//! 3. **Ingest**: download every canonical URL without an article record and
//!    append title, text and label to the article store
//! 4. **Reconcile**: drop URLs that answered HTTP 403 from the canonical store
//!
//! ## Usage
//!
//! ```sh
//! feed_harvest run --target 100 --max-rounds 3 --parallel
//! feed_harvest stats
//! ```

use chrono::Local;
use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

mod cli;
mod collect;
mod config;
mod errors;
mod harvest;
mod ingest;
mod models;
mod outputs;
mod pipeline;
mod scrapers;
mod store;
mod utils;

use cli::{Cli, Command};
use config::AppConfig;
use models::{CategoryReport, RunReport};
use outputs::json;
use pipeline::Pipeline;
use scrapers::article::HttpArticleSource;
use scrapers::feed::HttpFeedSource;
use scrapers::retry::RetryFetch;
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("feed_harvest starting up");

    let args = Cli::parse();
    debug!(?args.config, ?args.data_dir, ?args.command, "Parsed CLI arguments");

    let mut config = match AppConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
        if let Err(e) = config.validate() {
            error!(error = %e, "Invalid configuration for the given data dir");
            return Err(e.into());
        }
    }
    info!(data_dir = %config.data_dir.display(), categories = config.categories.len(), "Configuration ready");

    let client = scrapers::http_client(&config.http)?;
    let feeds = RetryFetch::from_config(HttpFeedSource::with_client(client.clone()), &config.retry);
    let articles = RetryFetch::from_config(HttpArticleSource::with_client(client), &config.retry);
    let pipeline = Pipeline::new(config, feeds, articles);

    let result = dispatch(&pipeline, args.command).await;

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    result
}

async fn dispatch(
    pipeline: &Pipeline<RetryFetch<HttpFeedSource>, RetryFetch<HttpArticleSource>>,
    command: Command,
) -> Result<(), Box<dyn Error>> {
    match command {
        Command::Collect { category, collect } => {
            let report = pipeline.collect(category, &collect.params()).await?;
            info!(report = %serde_json::to_string(&report)?, "Collect report");
        }
        Command::Ingest { category } => {
            let report = pipeline.ingest(category).await?;
            info!(report = %serde_json::to_string(&report)?, "Ingest report");
        }
        Command::Run {
            category,
            collect,
            parallel,
            report_dir,
        } => {
            // Fail before doing any work if the report cannot be written.
            if let Some(dir) = &report_dir {
                if let Err(e) = ensure_writable_dir(dir).await {
                    error!(
                        path = %dir.display(),
                        error = %e,
                        "Report directory is not writable (fix perms or choose a different path)"
                    );
                    return Err(e);
                }
            }

            let now = Local::now();
            let params = collect.params();
            let categories: Vec<CategoryReport> = match category {
                Some(id) => vec![pipeline.run(id, &params).await],
                None => pipeline.run_all(&params, parallel).await?,
            };
            let report = RunReport {
                local_date: now.date_naive().to_string(),
                local_time: now.format("%H:%M:%S").to_string(),
                categories,
            };

            for category in &report.categories {
                info!(report = %serde_json::to_string(category)?, "Category report");
            }
            if let Some(dir) = &report_dir {
                if let Err(e) = json::write_run_report(&report, dir).await {
                    error!(error = %e, "Failed to write run report");
                }
            }

            let failed = report.failed_categories();
            if failed > 0 {
                error!(failed, "Some categories did not complete");
                return Err(format!("{failed} categories failed").into());
            }
        }
        Command::Stats { category } => {
            let ids: Vec<u8> = match category {
                Some(id) => vec![id],
                None => pipeline.config().categories.iter().map(|c| c.id).collect(),
            };
            for id in ids {
                let s = pipeline.stats(id).await?;
                println!(
                    "{} ({}): canonical={} temp={} articles={} empty_text={} pending={}",
                    s.category,
                    s.name,
                    s.canonical_urls,
                    s.temp_urls,
                    s.articles,
                    s.empty_text_articles,
                    s.pending
                );
            }
        }
    }
    Ok(())
}
