use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::error::{MirrorError, Result};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

pub const DEFAULT_CONTENT_ROUTES: &[&str] = &["blogs", "pages", "products", "collections", "cart"];
pub const DEFAULT_EXCLUDED_SEGMENTS: &[&str] = &["checkout", "account", "admin"];

/// Every tunable of a single mirror run.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    pub origin: Url,
    /// Hosts whose resources are captured, in addition to the origin host.
    pub mirror_hosts: Vec<String>,
    /// Priority targets, dispatched before anything discovered.
    pub seeds: Vec<Url>,
    /// First path segments that name HTML content routes.
    pub content_routes: Vec<String>,
    /// Path fragments that are never followed as page links.
    pub excluded_segments: Vec<String>,
    pub output_dir: PathBuf,
    pub max_pages: usize,
    pub max_queue: usize,
    pub max_depth: Option<usize>,
    pub max_asset_passes: usize,
    pub workers: usize,
    pub request_delay: Duration,
    pub timeout: Duration,
    pub retries: u32,
    pub user_agent: String,
}

impl MirrorConfig {
    pub fn new(origin: Url, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            seeds: vec![origin.clone()],
            origin,
            mirror_hosts: Vec::new(),
            content_routes: DEFAULT_CONTENT_ROUTES.iter().map(|s| s.to_string()).collect(),
            excluded_segments: DEFAULT_EXCLUDED_SEGMENTS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            output_dir: output_dir.into(),
            max_pages: 500,
            max_queue: 500,
            max_depth: None,
            max_asset_passes: 5,
            workers: 4,
            request_delay: Duration::from_millis(200),
            timeout: Duration::from_secs(30),
            retries: 0,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    pub fn with_mirror_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mirror_hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_seeds(mut self, seeds: Vec<Url>) -> Self {
        self.seeds = seeds;
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn with_max_queue(mut self, max_queue: usize) -> Self {
        self.max_queue = max_queue;
        self
    }

    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_max_asset_passes(mut self, passes: usize) -> Self {
        self.max_asset_passes = passes;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Resolve a seed that may be either an absolute URL or an origin route.
    pub fn resolve_seed(&self, seed: &str) -> Result<Url> {
        let seed = seed.trim();
        if let Ok(url) = Url::parse(seed) {
            return Ok(url);
        }
        self.origin
            .join(seed)
            .map_err(|e| MirrorError::InvalidUrl(format!("seed '{}': {}", seed, e)))
    }

    pub fn validate(&self) -> Result<()> {
        if !matches!(self.origin.scheme(), "http" | "https") {
            return Err(MirrorError::ConfigError(format!(
                "origin must be http or https, got {}",
                self.origin
            )));
        }
        if self.origin.host_str().is_none() {
            return Err(MirrorError::ConfigError(format!(
                "origin has no host: {}",
                self.origin
            )));
        }
        if self.workers == 0 {
            return Err(MirrorError::ConfigError("workers must be at least 1".into()));
        }
        if self.max_asset_passes == 0 {
            return Err(MirrorError::ConfigError(
                "at least one asset pass is required".into(),
            ));
        }
        Ok(())
    }
}
