// Site profiles: which site to mirror, which hosts belong to it and where to start

use mirrorball_engine::MirrorConfig;
use mirrorball_engine::config::{DEFAULT_CONTENT_ROUTES, DEFAULT_EXCLUDED_SEGMENTS};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

/// Storefront CDN and web-font hosts mirrored alongside the origin.
pub const DEFAULT_MIRROR_HOSTS: &[&str] = &[
    "cdn.shopify.com",
    "shopifycdn.com",
    "fonts.googleapis.com",
    "fonts.gstatic.com",
];

/// Routes captured first, before anything discovered by crawling.
pub const DEFAULT_SEEDS: &[&str] = &[
    "/",
    "/blogs/news",
    "/pages/about",
    "/pages/contact",
    "/pages/terms-and-conditions",
    "/pages/privacy-policy",
    "/collections/all",
    "/cart",
];

fn default_routes() -> Vec<String> {
    DEFAULT_CONTENT_ROUTES.iter().map(|s| s.to_string()).collect()
}

fn default_excluded() -> Vec<String> {
    DEFAULT_EXCLUDED_SEGMENTS.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteProfile {
    pub origin: String,
    #[serde(default)]
    pub hosts: Vec<String>,
    /// Absolute URLs or origin-relative routes.
    #[serde(default)]
    pub seeds: Vec<String>,
    #[serde(default = "default_routes")]
    pub content_routes: Vec<String>,
    #[serde(default = "default_excluded")]
    pub excluded_segments: Vec<String>,
}

impl SiteProfile {
    /// The default storefront profile for `origin`.
    pub fn for_origin(origin: &Url) -> Self {
        Self {
            origin: origin.as_str().to_string(),
            hosts: DEFAULT_MIRROR_HOSTS.iter().map(|s| s.to_string()).collect(),
            seeds: DEFAULT_SEEDS.iter().map(|s| s.to_string()).collect(),
            content_routes: default_routes(),
            excluded_segments: default_excluded(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, String> {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read profile {}: {}", path.display(), e))?;
        serde_json::from_str(&content)
            .map_err(|e| format!("Invalid profile {}: {}", path.display(), e))
    }

    pub fn save(&self, path: &Path) -> Result<(), String> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize profile: {}", e))?;
        fs::write(path, content)
            .map_err(|e| format!("Failed to write profile {}: {}", path.display(), e))
    }

    pub fn add_hosts<I, S>(&mut self, hosts: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for host in hosts {
            let host = host.into();
            if !self.hosts.contains(&host) {
                self.hosts.push(host);
            }
        }
    }

    pub fn add_seeds<I, S>(&mut self, seeds: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for seed in seeds {
            let seed = seed.into();
            if !self.seeds.contains(&seed) {
                self.seeds.push(seed);
            }
        }
    }

    /// Build the engine configuration. The origin root is always the first seed.
    pub fn into_config(self, output_dir: impl Into<PathBuf>) -> Result<MirrorConfig, String> {
        let origin = Url::parse(&self.origin)
            .map_err(|e| format!("Invalid origin '{}': {}", self.origin, e))?;

        let mut config = MirrorConfig::new(origin.clone(), output_dir).with_mirror_hosts(self.hosts);
        config.content_routes = self.content_routes;
        config.excluded_segments = self.excluded_segments;

        let mut root = origin;
        root.set_path("/");
        root.set_query(None);
        root.set_fragment(None);

        let mut seeds = vec![root];
        for seed in &self.seeds {
            let url = config.resolve_seed(seed).map_err(|e| e.to_string())?;
            if !seeds.contains(&url) {
                seeds.push(url);
            }
        }

        Ok(config.with_seeds(seeds))
    }
}
