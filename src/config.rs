//! Harvesting configuration.
//!
//! Loaded once at startup from YAML and passed explicitly to every stage.
//! Without a config file the bundled `config/feeds.yaml` is used.

use crate::errors::ConfigError;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const DEFAULT_CONFIG: &str = include_str!("../config/feeds.yaml");

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Directory holding every category's stores.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    pub categories: Vec<CategoryConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Article downloads in flight at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
            concurrency: default_concurrency(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Backoff settings for transient fetch failures.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Random extra delay, up to this bound, added to every backoff.
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ms: default_jitter_ms(),
        }
    }
}

/// One partition of the pipeline: its feeds, keyword filter, label and stores.
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryConfig {
    pub id: u8,
    pub name: String,
    /// Label written to article records. Defaults to the category id.
    #[serde(default)]
    pub label: Option<i64>,
    /// Feed URLs, harvested in this order every round.
    pub feeds: Vec<String>,
    /// Case-insensitive substrings; an entry must match one of them.
    #[serde(default)]
    pub keywords: Option<Vec<String>>,
    #[serde(default)]
    pub url_store: Option<String>,
    #[serde(default)]
    pub temp_store: Option<String>,
    #[serde(default)]
    pub article_store: Option<String>,
}

/// Resolved store locations for one category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryPaths {
    pub urls: PathBuf,
    pub temp: PathBuf,
    pub articles: PathBuf,
}

impl CategoryConfig {
    pub fn label(&self) -> i64 {
        self.label.unwrap_or(i64::from(self.id))
    }

    pub fn paths(&self, data_dir: &Path) -> CategoryPaths {
        let id = self.id;
        let resolve = |custom: &Option<String>, default: String| {
            data_dir.join(custom.clone().unwrap_or(default))
        };
        CategoryPaths {
            urls: resolve(&self.url_store, format!("{id}_urls.txt")),
            temp: resolve(&self.temp_store, format!("{id}{id}_urls_tmp.txt")),
            articles: resolve(&self.article_store, format!("{id}_articles.csv")),
        }
    }

    /// Fail if two of this category's stores resolve to the same file.
    pub fn check_distinct_paths(&self, data_dir: &Path) -> Result<(), ConfigError> {
        let paths = self.paths(data_dir);
        let named = [
            ("url_store", &paths.urls),
            ("temp_store", &paths.temp),
            ("article_store", &paths.articles),
        ];
        for (i, (a, pa)) in named.iter().enumerate() {
            for (b, pb) in &named[i + 1..] {
                if pa == pb {
                    return Err(ConfigError::Invalid(format!(
                        "category {} ({}): {a} and {b} are both {}",
                        self.id,
                        self.name,
                        pa.display()
                    )));
                }
            }
        }
        Ok(())
    }
}

impl AppConfig {
    /// Load from `path`, or the bundled default when `None`, and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p).map_err(|source| ConfigError::Read {
                    path: p.to_path_buf(),
                    source,
                })?;
                info!(path = %p.display(), "Loaded configuration");
                Self::from_yaml(&raw)?
            }
            None => {
                info!("Using bundled default configuration");
                Self::from_yaml(DEFAULT_CONFIG)?
            }
        };
        debug!(categories = config.categories.len(), data_dir = %config.data_dir.display(), "Configuration parsed");
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.categories.is_empty() {
            return Err(ConfigError::Invalid("no categories configured".into()));
        }
        if self.http.timeout_secs == 0 {
            return Err(ConfigError::Invalid("http.timeout_secs must be positive".into()));
        }
        if self.http.concurrency == 0 {
            return Err(ConfigError::Invalid("http.concurrency must be positive".into()));
        }
        let mut seen = HashSet::new();
        for category in &self.categories {
            if !seen.insert(category.id) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate category id {}",
                    category.id
                )));
            }
            if category.feeds.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "category {} ({}) has no feeds",
                    category.id, category.name
                )));
            }
            category.check_distinct_paths(&self.data_dir)?;
        }
        Ok(())
    }

    pub fn category(&self, id: u8) -> Result<&CategoryConfig, ConfigError> {
        self.categories
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| ConfigError::Invalid(format!("unknown category {id}")))
    }

    /// Fail if two categories would write to the same file.
    ///
    /// Concurrent category runs rely on each category owning its files.
    pub fn check_disjoint_stores(&self) -> Result<(), ConfigError> {
        let mut owners: HashMap<PathBuf, u8> = HashMap::new();
        for category in &self.categories {
            let paths = category.paths(&self.data_dir);
            for path in [paths.urls, paths.temp, paths.articles] {
                if let Some(other) = owners.insert(path.clone(), category.id) {
                    if other != category.id {
                        return Err(ConfigError::Invalid(format!(
                            "categories {other} and {} share {}",
                            category.id,
                            path.display()
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_timeout_secs() -> u64 {
    20
}

fn default_user_agent() -> String {
    format!("feed_harvest/{}", env!("CARGO_PKG_VERSION"))
}

fn default_concurrency() -> usize {
    4
}

fn default_max_retries() -> usize {
    2
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_jitter_ms() -> u64 {
    250
}
