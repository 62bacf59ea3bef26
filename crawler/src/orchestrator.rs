//! Crawl run lifecycle: one run at a time across all configured sites, with
//! cooperative stop flags and a background monitor that completes the run.

use crate::config::{CrawlConfig, SiteConfig};
use crate::task::CrawlTask;
use anyhow::Result;
use parking_lot::Mutex;
use reqwest::redirect;
use sitesearch_core::{Site, SiteId, SiteStatus, Store};
use sitesearch_indexer::PageIndexer;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{error, info, warn};

/// Monitor heartbeat: how often INDEXING sites get their status_time bumped
/// and pool drain is checked.
const MONITOR_INTERVAL: Duration = Duration::from_secs(2);

/// Per-site state shared by every task crawling that site.
pub(crate) struct SiteContext {
    pub(crate) site_id: SiteId,
    /// Root URL without a trailing slash.
    pub(crate) root_url: String,
    seen: Mutex<HashSet<String>>,
    stopped: AtomicBool,
}

impl SiteContext {
    fn new(site_id: SiteId, root_url: String) -> Self {
        Self {
            site_id,
            root_url,
            seen: Mutex::new(HashSet::new()),
            stopped: AtomicBool::new(false),
        }
    }

    /// Atomic add-if-absent; true means this caller owns the URL.
    pub(crate) fn mark_seen(&self, url: &str) -> bool {
        self.seen.lock().insert(url.to_string())
    }

    pub(crate) fn is_seen(&self, url: &str) -> bool {
        self.seen.lock().contains(url)
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn clear(&self) {
        self.seen.lock().clear();
    }
}

/// State of one crawl run, shared by every task it spawned.
pub(crate) struct RunState {
    pub(crate) store: Arc<Store>,
    pub(crate) indexer: Arc<PageIndexer>,
    pub(crate) config: CrawlConfig,
    pub(crate) client: reqwest::Client,
    pub(crate) fetch_slots: Semaphore,
    stopped: AtomicBool,
    drained: AtomicBool,
    contexts: Mutex<Vec<Arc<SiteContext>>>,
    root_aborts: Mutex<Vec<AbortHandle>>,
}

impl RunState {
    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn is_active(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst) && !self.drained.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        for ctx in self.contexts.lock().iter() {
            ctx.stop();
            ctx.clear();
        }
        for handle in self.root_aborts.lock().drain(..) {
            handle.abort();
        }
    }
}

/// Owns the process-wide crawl singleton: at most one active run.
pub struct CrawlService {
    store: Arc<Store>,
    indexer: Arc<PageIndexer>,
    config: CrawlConfig,
    sites: Vec<SiteConfig>,
    current: Arc<Mutex<Option<Arc<RunState>>>>,
}

impl CrawlService {
    pub fn new(
        store: Arc<Store>,
        indexer: Arc<PageIndexer>,
        config: CrawlConfig,
        sites: Vec<SiteConfig>,
    ) -> Self {
        Self {
            store,
            indexer,
            config,
            sites,
            current: Arc::new(Mutex::new(None)),
        }
    }

    pub fn sites(&self) -> &[SiteConfig] {
        &self.sites
    }

    /// Starts a crawl run over every configured site. Returns false if a run
    /// is already active or seeding fails; a partial seed is rolled back to
    /// stopped/FAILED state.
    pub fn start_run(&self) -> bool {
        let mut current = self.current.lock();
        if current.as_ref().map_or(false, |r| r.is_active()) {
            warn!("indexing already in progress");
            return false;
        }
        match self.seed_run() {
            Ok(run) => {
                *current = Some(run);
                true
            }
            Err(e) => {
                error!(error = %e, "error starting indexing");
                self.store.fail_indexing_sites(&format!("Indexing start failed: {e}"));
                false
            }
        }
    }

    /// Signals every stop flag, best-effort cancels unstarted root tasks, and
    /// fails every site still INDEXING. Returns false if no run is active.
    pub fn stop_run(&self) -> bool {
        let current = self.current.lock();
        let Some(run) = current.as_ref().filter(|r| r.is_active()).cloned() else {
            warn!("indexing is not running");
            return false;
        };
        drop(current);
        run.stop();
        let failed = self.store.fail_indexing_sites("Indexing stopped by user");
        info!(failed, "indexing stopped by user");
        true
    }

    /// True while a run exists that has neither been stopped nor drained.
    pub fn is_running(&self) -> bool {
        self.current.lock().as_ref().map_or(false, |r| r.is_active())
    }

    fn seed_run(&self) -> Result<Arc<RunState>> {
        let client = reqwest::Client::builder()
            .user_agent(&self.config.user_agent)
            .redirect(redirect::Policy::limited(5))
            .timeout(self.config.timeout)
            .build()?;
        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        let run = Arc::new(RunState {
            store: self.store.clone(),
            indexer: self.indexer.clone(),
            config: self.config.clone(),
            client,
            fetch_slots: Semaphore::new(parallelism),
            stopped: AtomicBool::new(false),
            drained: AtomicBool::new(false),
            contexts: Mutex::new(Vec::new()),
            root_aborts: Mutex::new(Vec::new()),
        });

        let mut roots: Vec<JoinHandle<()>> = Vec::with_capacity(self.sites.len());
        for cfg in &self.sites {
            let site = self.seed_site(cfg);
            let ctx = Arc::new(SiteContext::new(site.id, cfg.root_url().to_string()));
            run.contexts.lock().push(ctx.clone());
            let task = CrawlTask {
                url: ctx.root_url.clone(),
                site: ctx,
                run: run.clone(),
            };
            let handle = task.spawn();
            run.root_aborts.lock().push(handle.abort_handle());
            roots.push(handle);
        }
        info!(sites = roots.len(), parallelism, "indexing started");

        tokio::spawn(monitor(run.clone(), roots, self.current.clone()));
        Ok(run)
    }

    /// Reuses or creates the Site row for a run: prior pages/lemmas/postings
    /// are cleared, status becomes INDEXING with a fresh timestamp.
    fn seed_site(&self, cfg: &SiteConfig) -> Site {
        let mut txn = self.store.write();
        let mut site = match txn.site_by_url(&cfg.url).cloned() {
            Some(existing) => {
                txn.clear_site_data(existing.id);
                existing
            }
            None => txn.create_site(&cfg.url, &cfg.name, SiteStatus::Indexing),
        };
        site.name = cfg.name.clone();
        site.status = SiteStatus::Indexing;
        site.status_time = sitesearch_core::model::now_ts();
        site.last_error = None;
        txn.update_site(&site);
        site
    }
}

/// Background loop: heartbeats status_time while the pool is busy, then on
/// drain transitions this run's still-INDEXING sites to INDEXED, persists a
/// snapshot and releases the run slot.
async fn monitor(
    run: Arc<RunState>,
    roots: Vec<JoinHandle<()>>,
    current: Arc<Mutex<Option<Arc<RunState>>>>,
) {
    let mut ticker = tokio::time::interval(MONITOR_INTERVAL);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if roots.iter().all(|h| h.is_finished()) {
            break;
        }
        run.store.touch_indexing_sites();
    }

    if !run.is_stopped() {
        let completed = complete_run_sites(&run);
        info!(completed, "indexing completed successfully");
    }
    if let Err(e) = run.store.save() {
        error!(error = %e, "failed to persist index snapshot");
    }
    for ctx in run.contexts.lock().iter() {
        ctx.clear();
    }
    run.drained.store(true, Ordering::SeqCst);

    let mut slot = current.lock();
    if slot.as_ref().map_or(false, |r| Arc::ptr_eq(r, &run)) {
        *slot = None;
    }
}

fn complete_run_sites(run: &RunState) -> usize {
    let mut txn = run.store.write();
    let mut n = 0;
    for ctx in run.contexts.lock().iter() {
        if txn.site(ctx.site_id).map(|s| s.status) == Some(SiteStatus::Indexing) {
            txn.set_site_status(ctx.site_id, SiteStatus::Indexed, None);
            n += 1;
        }
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(sites: Vec<SiteConfig>, config: CrawlConfig) -> (Arc<Store>, CrawlService) {
        let store = Arc::new(Store::in_memory());
        let indexer = Arc::new(PageIndexer::new(store.clone()));
        let service = CrawlService::new(store.clone(), indexer, config, sites);
        (store, service)
    }

    fn unreachable_site() -> SiteConfig {
        // Discard port; connections are refused immediately.
        SiteConfig {
            url: "http://127.0.0.1:9".to_string(),
            name: "Unreachable".to_string(),
        }
    }

    #[tokio::test]
    async fn a_seen_url_is_skipped_without_side_effects() {
        let (store, _service) = service(vec![], CrawlConfig::default());
        let indexer = Arc::new(PageIndexer::new(store.clone()));
        let site = store
            .write()
            .create_site("http://127.0.0.1:9", "Unreachable", SiteStatus::Indexing);
        let run = Arc::new(RunState {
            store: store.clone(),
            indexer,
            config: CrawlConfig::default(),
            client: reqwest::Client::new(),
            fetch_slots: Semaphore::new(1),
            stopped: AtomicBool::new(false),
            drained: AtomicBool::new(false),
            contexts: Mutex::new(Vec::new()),
            root_aborts: Mutex::new(Vec::new()),
        });
        let ctx = Arc::new(SiteContext::new(site.id, "http://127.0.0.1:9".to_string()));
        assert!(ctx.mark_seen("http://127.0.0.1:9"));

        let task = CrawlTask {
            url: "http://127.0.0.1:9".to_string(),
            site: ctx,
            run,
        };
        task.spawn().await.unwrap();

        // The dedup guard returned before fetching: nothing failed, nothing
        // was written.
        let after = store.site(site.id).unwrap();
        assert_eq!(after.status, SiteStatus::Indexing);
        assert_eq!(store.count_pages(site.id), 0);
    }

    #[tokio::test]
    async fn stop_without_active_run_is_rejected() {
        let (_store, service) = service(vec![], CrawlConfig::default());
        assert!(!service.stop_run());
        assert!(!service.is_running());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_fetch_marks_the_site_failed() {
        let config = CrawlConfig {
            delay: Duration::from_millis(0),
            ..CrawlConfig::default()
        };
        let (store, service) = service(vec![unreachable_site()], config);
        assert!(service.start_run());

        for _ in 0..100 {
            if !service.is_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(!service.is_running());

        let site = store.site_by_url("http://127.0.0.1:9").unwrap();
        assert_eq!(site.status, SiteStatus::Failed);
        assert!(site.last_error.as_deref().unwrap().starts_with("Indexing error:"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn only_one_run_at_a_time_and_stop_fails_indexing_sites() {
        let config = CrawlConfig {
            // Long politeness delay keeps the root task parked so the run
            // stays observably active.
            delay: Duration::from_secs(30),
            ..CrawlConfig::default()
        };
        let (store, service) = service(vec![unreachable_site()], config);

        assert!(service.start_run());
        assert!(service.is_running());
        assert!(!service.start_run());

        assert!(service.stop_run());
        assert!(!service.is_running());
        assert!(!service.stop_run());

        let site = store.site_by_url("http://127.0.0.1:9").unwrap();
        assert_eq!(site.status, SiteStatus::Failed);
        assert_eq!(site.last_error.as_deref(), Some("Indexing stopped by user"));
        assert!(store.sites_by_status(SiteStatus::Indexing).is_empty());
    }
}
