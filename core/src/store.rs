//! In-memory entity store behind a single reader-writer lock.
//!
//! All multi-step mutations (a page's replace-index sequence, clearing a site)
//! run under one write guard, so readers never observe a partially applied
//! update. Callers that only need a single operation use the convenience
//! wrappers on [`Store`]; callers composing several operations take an
//! explicit guard via [`Store::read`] / [`Store::write`].

use crate::model::*;
use crate::persist;
use anyhow::Result;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

#[derive(Default, Serialize, Deserialize)]
pub struct StoreInner {
    pub(crate) sites: HashMap<SiteId, Site>,
    pub(crate) pages: HashMap<PageId, Page>,
    pub(crate) lemmas: HashMap<LemmaId, Lemma>,
    pub(crate) postings: HashMap<PostingId, Posting>,
    pub(crate) next_site_id: SiteId,
    pub(crate) next_page_id: PageId,
    pub(crate) next_lemma_id: LemmaId,
    pub(crate) next_posting_id: PostingId,
}

impl StoreInner {
    // --- sites ---

    pub fn site(&self, id: SiteId) -> Option<&Site> {
        self.sites.get(&id)
    }

    /// First site with the given root URL, lowest id winning.
    pub fn site_by_url(&self, url: &str) -> Option<&Site> {
        self.sites
            .values()
            .filter(|s| s.url == url)
            .min_by_key(|s| s.id)
    }

    pub fn sites(&self) -> Vec<Site> {
        let mut all: Vec<Site> = self.sites.values().cloned().collect();
        all.sort_by_key(|s| s.id);
        all
    }

    pub fn sites_by_status(&self, status: SiteStatus) -> Vec<Site> {
        let mut hits: Vec<Site> = self
            .sites
            .values()
            .filter(|s| s.status == status)
            .cloned()
            .collect();
        hits.sort_by_key(|s| s.id);
        hits
    }

    pub fn create_site(&mut self, url: &str, name: &str, status: SiteStatus) -> Site {
        let site = Site {
            id: self.next_site_id,
            url: url.to_string(),
            name: name.to_string(),
            status,
            status_time: now_ts(),
            last_error: None,
        };
        self.next_site_id += 1;
        self.sites.insert(site.id, site.clone());
        site
    }

    pub fn update_site(&mut self, site: &Site) {
        self.sites.insert(site.id, site.clone());
    }

    pub fn set_site_status(&mut self, id: SiteId, status: SiteStatus, last_error: Option<&str>) {
        if let Some(site) = self.sites.get_mut(&id) {
            site.status = status;
            site.status_time = now_ts();
            site.last_error = last_error.map(str::to_string);
        }
    }

    /// Bumps status_time of every site currently INDEXING.
    pub fn touch_indexing_sites(&mut self) {
        let now = now_ts();
        for site in self.sites.values_mut() {
            if site.status == SiteStatus::Indexing {
                site.status_time = now;
            }
        }
    }

    /// Transitions every INDEXING site to FAILED with the given error.
    pub fn fail_indexing_sites(&mut self, error: &str) -> usize {
        let now = now_ts();
        let mut n = 0;
        for site in self.sites.values_mut() {
            if site.status == SiteStatus::Indexing {
                site.status = SiteStatus::Failed;
                site.status_time = now;
                site.last_error = Some(error.to_string());
                n += 1;
            }
        }
        n
    }

    /// Transitions every INDEXING site to INDEXED.
    pub fn complete_indexing_sites(&mut self) -> usize {
        let now = now_ts();
        let mut n = 0;
        for site in self.sites.values_mut() {
            if site.status == SiteStatus::Indexing {
                site.status = SiteStatus::Indexed;
                site.status_time = now;
                site.last_error = None;
                n += 1;
            }
        }
        n
    }

    /// Deletes everything the site owns, in dependency order:
    /// postings first, then lemmas, then pages. The site row stays.
    pub fn clear_site_data(&mut self, site_id: SiteId) {
        let page_ids: HashSet<PageId> = self
            .pages
            .values()
            .filter(|p| p.site_id == site_id)
            .map(|p| p.id)
            .collect();
        self.postings.retain(|_, ix| !page_ids.contains(&ix.page_id));
        self.lemmas.retain(|_, l| l.site_id != site_id);
        self.pages.retain(|_, p| p.site_id != site_id);
    }

    // --- pages ---

    pub fn page(&self, id: PageId) -> Option<&Page> {
        self.pages.get(&id)
    }

    pub fn page_by_path(&self, site_id: SiteId, path: &str) -> Option<&Page> {
        self.pages
            .values()
            .find(|p| p.site_id == site_id && p.path == path)
    }

    pub fn page_exists(&self, site_id: SiteId, path: &str) -> bool {
        self.page_by_path(site_id, path).is_some()
    }

    pub fn count_pages(&self, site_id: SiteId) -> usize {
        self.pages.values().filter(|p| p.site_id == site_id).count()
    }

    pub fn create_page(&mut self, site_id: SiteId, path: &str, code: u16, content: &str) -> Page {
        let page = Page {
            id: self.next_page_id,
            site_id,
            path: path.to_string(),
            code,
            content: content.to_string(),
        };
        self.next_page_id += 1;
        self.pages.insert(page.id, page.clone());
        page
    }

    pub fn delete_page(&mut self, id: PageId) {
        self.pages.remove(&id);
    }

    // --- lemmas ---

    pub fn lemma(&self, id: LemmaId) -> Option<&Lemma> {
        self.lemmas.get(&id)
    }

    pub fn lemma_by_site_text(&self, site_id: SiteId, text: &str) -> Option<&Lemma> {
        self.lemmas
            .values()
            .find(|l| l.site_id == site_id && l.text == text)
    }

    /// Lemma rows matching a text, optionally scoped to one site, ordered by id.
    pub fn lemmas_by_text(&self, text: &str, site_id: Option<SiteId>) -> Vec<Lemma> {
        let mut hits: Vec<Lemma> = self
            .lemmas
            .values()
            .filter(|l| l.text == text && site_id.map_or(true, |s| l.site_id == s))
            .cloned()
            .collect();
        hits.sort_by_key(|l| l.id);
        hits
    }

    pub fn count_lemmas(&self, site_id: SiteId) -> usize {
        self.lemmas
            .values()
            .filter(|l| l.site_id == site_id)
            .count()
    }

    pub fn find_or_create_lemma(&mut self, site_id: SiteId, text: &str) -> LemmaId {
        if let Some(lemma) = self.lemma_by_site_text(site_id, text) {
            return lemma.id;
        }
        let lemma = Lemma {
            id: self.next_lemma_id,
            site_id,
            text: text.to_string(),
            frequency: 0,
        };
        self.next_lemma_id += 1;
        let id = lemma.id;
        self.lemmas.insert(id, lemma);
        id
    }

    pub fn increment_lemma_frequency(&mut self, id: LemmaId) {
        if let Some(lemma) = self.lemmas.get_mut(&id) {
            lemma.frequency += 1;
        }
    }

    /// Undoes one page's document-frequency contribution: every lemma
    /// referenced by the page's postings loses one count.
    pub fn decrement_frequencies_for_page(&mut self, page_id: PageId) {
        let lemma_ids: Vec<LemmaId> = self
            .postings
            .values()
            .filter(|ix| ix.page_id == page_id)
            .map(|ix| ix.lemma_id)
            .collect();
        for lemma_id in lemma_ids {
            if let Some(lemma) = self.lemmas.get_mut(&lemma_id) {
                lemma.frequency = lemma.frequency.saturating_sub(1);
            }
        }
    }

    // --- postings ---

    pub fn create_posting(&mut self, page_id: PageId, lemma_id: LemmaId, rank: u32) -> PostingId {
        let posting = Posting {
            id: self.next_posting_id,
            page_id,
            lemma_id,
            rank,
        };
        self.next_posting_id += 1;
        let id = posting.id;
        self.postings.insert(id, posting);
        id
    }

    pub fn delete_postings_by_page(&mut self, page_id: PageId) {
        self.postings.retain(|_, ix| ix.page_id != page_id);
    }

    pub fn postings_by_page(&self, page_id: PageId) -> Vec<Posting> {
        let mut hits: Vec<Posting> = self
            .postings
            .values()
            .filter(|ix| ix.page_id == page_id)
            .cloned()
            .collect();
        hits.sort_by_key(|ix| ix.id);
        hits
    }

    /// Ids of pages referencing the lemma, ascending.
    pub fn pages_by_lemma(&self, lemma_id: LemmaId) -> Vec<PageId> {
        let mut ids: Vec<PageId> = self
            .postings
            .values()
            .filter(|ix| ix.lemma_id == lemma_id)
            .map(|ix| ix.page_id)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Subset of `within` whose pages also reference the lemma, input order kept.
    pub fn pages_by_lemma_within(&self, lemma_id: LemmaId, within: &[PageId]) -> Vec<PageId> {
        let referenced: HashSet<PageId> = self
            .postings
            .values()
            .filter(|ix| ix.lemma_id == lemma_id)
            .map(|ix| ix.page_id)
            .collect();
        within
            .iter()
            .copied()
            .filter(|id| referenced.contains(id))
            .collect()
    }

    /// Sum of posting ranks for a page, restricted to lemmas whose text is in
    /// the given set.
    pub fn sum_ranks_for_page(&self, page_id: PageId, lemma_texts: &[String]) -> u32 {
        self.postings
            .values()
            .filter(|ix| ix.page_id == page_id)
            .filter(|ix| {
                self.lemmas
                    .get(&ix.lemma_id)
                    .map_or(false, |l| lemma_texts.iter().any(|t| *t == l.text))
            })
            .map(|ix| ix.rank)
            .sum()
    }

    pub fn total_counts(&self) -> (usize, usize, usize, usize) {
        (
            self.sites.len(),
            self.pages.len(),
            self.lemmas.len(),
            self.postings.len(),
        )
    }
}

pub struct Store {
    inner: RwLock<StoreInner>,
    dir: Option<PathBuf>,
}

impl Store {
    pub fn in_memory() -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            dir: None,
        }
    }

    /// Opens a store rooted at `dir`, loading the snapshot if one exists.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let inner = if persist::snapshot_exists(&dir) {
            persist::load(&dir)?
        } else {
            StoreInner::default()
        };
        Ok(Self {
            inner: RwLock::new(inner),
            dir: Some(dir),
        })
    }

    pub fn read(&self) -> RwLockReadGuard<'_, StoreInner> {
        self.inner.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, StoreInner> {
        self.inner.write()
    }

    /// Persists a snapshot to the store directory; no-op for in-memory stores.
    pub fn save(&self) -> Result<()> {
        if let Some(dir) = &self.dir {
            persist::save(dir, &self.inner.read())?;
        }
        Ok(())
    }

    // Single-operation conveniences.

    pub fn site(&self, id: SiteId) -> Option<Site> {
        self.read().site(id).cloned()
    }

    pub fn site_by_url(&self, url: &str) -> Option<Site> {
        self.read().site_by_url(url).cloned()
    }

    pub fn sites_by_status(&self, status: SiteStatus) -> Vec<Site> {
        self.read().sites_by_status(status)
    }

    pub fn count_pages(&self, site_id: SiteId) -> usize {
        self.read().count_pages(site_id)
    }

    pub fn mark_site_failed(&self, id: SiteId, error: &str) {
        self.write()
            .set_site_status(id, SiteStatus::Failed, Some(error));
    }

    pub fn fail_indexing_sites(&self, error: &str) -> usize {
        self.write().fail_indexing_sites(error)
    }

    pub fn complete_indexing_sites(&self) -> usize {
        self.write().complete_indexing_sites()
    }

    pub fn touch_indexing_sites(&self) {
        self.write().touch_indexing_sites()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(store: &Store) -> Site {
        store
            .write()
            .create_site("https://example.com", "Example", SiteStatus::Indexing)
    }

    #[test]
    fn site_by_url_prefers_lowest_id() {
        let store = Store::in_memory();
        let first = site(&store);
        store
            .write()
            .create_site("https://example.com", "Example", SiteStatus::Indexed);
        assert_eq!(store.site_by_url("https://example.com").unwrap().id, first.id);
    }

    #[test]
    fn find_or_create_lemma_is_idempotent() {
        let store = Store::in_memory();
        let s = site(&store);
        let mut txn = store.write();
        let a = txn.find_or_create_lemma(s.id, "rust");
        let b = txn.find_or_create_lemma(s.id, "rust");
        assert_eq!(a, b);
        assert_eq!(txn.lemma(a).unwrap().frequency, 0);
    }

    #[test]
    fn decrement_undoes_page_contribution() {
        let store = Store::in_memory();
        let s = site(&store);
        let mut txn = store.write();
        let page = txn.create_page(s.id, "/", 200, "<html></html>");
        let lemma = txn.find_or_create_lemma(s.id, "rust");
        txn.increment_lemma_frequency(lemma);
        txn.create_posting(page.id, lemma, 3);
        txn.decrement_frequencies_for_page(page.id);
        assert_eq!(txn.lemma(lemma).unwrap().frequency, 0);
    }

    #[test]
    fn pages_by_lemma_within_keeps_order() {
        let store = Store::in_memory();
        let s = site(&store);
        let mut txn = store.write();
        let p1 = txn.create_page(s.id, "/a", 200, "").id;
        let p2 = txn.create_page(s.id, "/b", 200, "").id;
        let p3 = txn.create_page(s.id, "/c", 200, "").id;
        let lemma = txn.find_or_create_lemma(s.id, "rust");
        txn.create_posting(p1, lemma, 1);
        txn.create_posting(p3, lemma, 1);
        assert_eq!(txn.pages_by_lemma_within(lemma, &[p3, p2, p1]), vec![p3, p1]);
    }

    #[test]
    fn sum_ranks_restricted_to_lemma_texts() {
        let store = Store::in_memory();
        let s = site(&store);
        let mut txn = store.write();
        let page = txn.create_page(s.id, "/", 200, "").id;
        let dog = txn.find_or_create_lemma(s.id, "dog");
        let cat = txn.find_or_create_lemma(s.id, "cat");
        txn.create_posting(page, dog, 2);
        txn.create_posting(page, cat, 5);
        let sum = txn.sum_ranks_for_page(page, &["dog".to_string()]);
        assert_eq!(sum, 2);
    }

    #[test]
    fn clear_site_data_is_scoped_to_the_site() {
        let store = Store::in_memory();
        let s1 = site(&store);
        let mut txn = store.write();
        let s2 = txn.create_site("https://other.com", "Other", SiteStatus::Indexing);
        let p1 = txn.create_page(s1.id, "/", 200, "").id;
        let p2 = txn.create_page(s2.id, "/", 200, "").id;
        let l1 = txn.find_or_create_lemma(s1.id, "rust");
        let l2 = txn.find_or_create_lemma(s2.id, "rust");
        txn.create_posting(p1, l1, 1);
        txn.create_posting(p2, l2, 1);
        txn.clear_site_data(s1.id);
        assert_eq!(txn.count_pages(s1.id), 0);
        assert_eq!(txn.count_lemmas(s1.id), 0);
        assert!(txn.pages_by_lemma(l2) == vec![p2]);
        assert!(txn.site(s1.id).is_some());
    }

    #[test]
    fn fail_indexing_sites_leaves_other_statuses_alone() {
        let store = Store::in_memory();
        let s1 = site(&store);
        let s2 = store
            .write()
            .create_site("https://done.com", "Done", SiteStatus::Indexed);
        let n = store.fail_indexing_sites("Indexing stopped by user");
        assert_eq!(n, 1);
        assert_eq!(store.site(s1.id).unwrap().status, SiteStatus::Failed);
        assert_eq!(
            store.site(s1.id).unwrap().last_error.as_deref(),
            Some("Indexing stopped by user")
        );
        assert_eq!(store.site(s2.id).unwrap().status, SiteStatus::Indexed);
        assert!(store.sites_by_status(SiteStatus::Indexing).is_empty());
    }
}
