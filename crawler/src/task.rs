//! The recursive crawl unit: fetch one URL, index it, fan out into child
//! tasks for every new in-scope link, and wait for the whole subtree.

use crate::orchestrator::{RunState, SiteContext};
use crate::urlpolicy;
use anyhow::{Context, Result};
use reqwest::header;
use scraper::{Html, Selector};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, warn};
use url::Url;

pub(crate) struct CrawlTask {
    pub(crate) url: String,
    pub(crate) site: Arc<SiteContext>,
    pub(crate) run: Arc<RunState>,
}

impl CrawlTask {
    pub(crate) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.crawl())
    }

    // Boxed so the task can recurse through the pool without an infinite
    // future type; each child is its own pool unit, not a stack frame.
    fn crawl(self) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
            // Cycle/dedup guard: the seen-set admits exactly one task per URL.
            if self.stopped() || !self.site.mark_seen(&self.url) {
                return;
            }
            if let Err(e) = self.process().await {
                error!(url = %self.url, error = %e, "error indexing url");
                self.run
                    .store
                    .mark_site_failed(self.site.site_id, &format!("Indexing error: {e}"));
            }
        })
    }

    fn stopped(&self) -> bool {
        self.run.is_stopped() || self.site.is_stopped()
    }

    async fn process(&self) -> Result<()> {
        let (status, body) = {
            // The slot covers delay + fetch + index only; it is released
            // before children run, so a full pool cannot deadlock on joins.
            let _slot = self
                .run
                .fetch_slots
                .acquire()
                .await
                .context("crawl pool closed")?;
            sleep(self.run.config.delay).await;
            let resp = self
                .run
                .client
                .get(&self.url)
                .header(header::REFERER, &self.run.config.referrer)
                .send()
                .await?;
            let status = resp.status().as_u16();
            let body = resp.text().await?;
            (status, body)
        };

        if status >= 400 {
            warn!(status, url = %self.url, "skipping page with error status");
            return Ok(());
        }

        let site = self
            .run
            .store
            .site(self.site.site_id)
            .context("site row missing")?;
        let path = urlpolicy::site_relative_path(&self.url, &self.site.root_url);
        self.run.indexer.index_page(&site, &path, status, &body)?;

        if self.stopped() {
            return Ok(());
        }

        let mut children = Vec::new();
        for link in self.child_links(&body) {
            if self.stopped() {
                break;
            }
            let child = CrawlTask {
                url: link,
                site: self.site.clone(),
                run: self.run.clone(),
            };
            children.push(child.spawn());
        }
        // A task is done only once its whole subtree is done.
        for child in children {
            let _ = child.await;
        }
        Ok(())
    }

    fn child_links(&self, body: &str) -> Vec<String> {
        let base = match Url::parse(&self.url) {
            Ok(u) => u,
            Err(_) => return Vec::new(),
        };
        let selector = Selector::parse("a[href]").expect("valid selector");
        let doc = Html::parse_document(body);
        let mut links: Vec<String> = Vec::new();
        for anchor in doc.select(&selector) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let Some(normalized) = urlpolicy::normalize_link(&base, href) else {
                continue;
            };
            if urlpolicy::is_valid_url(&normalized, &self.site.root_url)
                && !self.site.is_seen(&normalized)
                && !links.contains(&normalized)
            {
                links.push(normalized);
            }
        }
        links
    }
}
