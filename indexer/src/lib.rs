//! Content indexing: turns a fetched page into postings and per-site lemma
//! frequencies, replacing any previous contribution of the same page.

use anyhow::{bail, Result};
use reqwest::{header, redirect};
use sitesearch_core::{html, lemmatizer, Site, Store};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Fetch parameters for the single-URL reindex path.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub referrer: String,
    pub timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "SearchEngineBot/1.0".to_string(),
            referrer: "https://www.google.com".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

pub struct PageIndexer {
    store: Arc<Store>,
}

impl PageIndexer {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// (Re)indexes one page. If a page already exists at (site, path) its
    /// postings and frequency contributions are undone before the new content
    /// is applied; the whole sequence runs under one store write guard, so
    /// readers never see it half-done.
    pub fn index_page(&self, site: &Site, path: &str, code: u16, html_content: &str) -> Result<()> {
        let clean = html::clean_html(html_content);
        let lemmas = lemmatizer::lemmatize(&clean);

        let mut txn = self.store.write();
        if let Some(old_id) = txn.page_by_path(site.id, path).map(|p| p.id) {
            txn.decrement_frequencies_for_page(old_id);
            txn.delete_postings_by_page(old_id);
            txn.delete_page(old_id);
        }
        let page = txn.create_page(site.id, path, code, html_content);
        for (text, count) in &lemmas {
            let lemma_id = txn.find_or_create_lemma(site.id, text);
            txn.increment_lemma_frequency(lemma_id);
            txn.create_posting(page.id, lemma_id, *count);
        }
        debug!(site = %site.url, path, lemmas = lemmas.len(), "indexed page");
        Ok(())
    }

    /// Fetches a single URL belonging to `site` and indexes it, bypassing link
    /// expansion. Error statuses are logged and skipped, not fatal.
    pub async fn fetch_and_index(&self, site: &Site, url: &str, fetch: &FetchConfig) -> Result<()> {
        let root = site.url.trim_end_matches('/');
        if !url.starts_with(root) {
            bail!("url {url} is outside site {}", site.url);
        }

        let client = reqwest::Client::builder()
            .user_agent(&fetch.user_agent)
            .redirect(redirect::Policy::limited(5))
            .timeout(fetch.timeout)
            .build()?;
        let resp = client
            .get(url)
            .header(header::REFERER, &fetch.referrer)
            .send()
            .await?;
        let status = resp.status().as_u16();
        if status >= 400 {
            warn!(status, url, "skipping page with error status");
            return Ok(());
        }
        let body = resp.text().await?;

        let mut path = url[root.len()..].to_string();
        if path.is_empty() {
            path = "/".to_string();
        } else if !path.starts_with('/') {
            path.insert(0, '/');
        }
        self.index_page(site, &path, status, &body)
    }
}
