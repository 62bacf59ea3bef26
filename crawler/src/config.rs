use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// One configured site: the crawl root and a display name.
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    pub url: String,
    pub name: String,
}

impl SiteConfig {
    /// Root URL as used for scope checks, without a trailing slash.
    pub fn root_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }
}

/// Fetch parameters shared by every crawl task of a run.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub user_agent: String,
    pub referrer: String,
    /// Politeness delay before each fetch.
    pub delay: Duration,
    pub timeout: Duration,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            user_agent: "SearchEngineBot/1.0".to_string(),
            referrer: "https://www.google.com".to_string(),
            delay: Duration::from_millis(500),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Loads the site list from a JSON file: `[{"url": "...", "name": "..."}]`.
pub fn load_sites(path: &Path) -> Result<Vec<SiteConfig>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading sites file {}", path.display()))?;
    let sites: Vec<SiteConfig> =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
    Ok(sites)
}
