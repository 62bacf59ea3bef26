//! Snapshot persistence for the store: one bincode file per entity map plus a
//! small JSON meta file carrying the id counters.

use crate::model::{Lemma, LemmaId, Page, PageId, Posting, PostingId, Site, SiteId};
use crate::store::StoreInner;
use anyhow::Result;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{create_dir_all, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize)]
pub struct MetaFile {
    pub version: u32,
    pub created_at: String,
    pub next_site_id: SiteId,
    pub next_page_id: PageId,
    pub next_lemma_id: LemmaId,
    pub next_posting_id: PostingId,
}

pub const SNAPSHOT_VERSION: u32 = 1;

struct SnapshotPaths {
    root: PathBuf,
}

impl SnapshotPaths {
    fn new(root: &Path) -> Self {
        Self { root: root.to_path_buf() }
    }
    fn sites(&self) -> PathBuf { self.root.join("sites.bin") }
    fn pages(&self) -> PathBuf { self.root.join("pages.bin") }
    fn lemmas(&self) -> PathBuf { self.root.join("lemmas.bin") }
    fn postings(&self) -> PathBuf { self.root.join("postings.bin") }
    fn meta(&self) -> PathBuf { self.root.join("meta.json") }
}

pub fn snapshot_exists(dir: &Path) -> bool {
    SnapshotPaths::new(dir).meta().is_file()
}

fn write_bin<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut f = File::create(path)?;
    let bytes = bincode::serialize(value)?;
    f.write_all(&bytes)?;
    Ok(())
}

fn read_bin<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let mut f = File::open(path)?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    Ok(bincode::deserialize(&buf)?)
}

pub fn save(dir: &Path, inner: &StoreInner) -> Result<()> {
    let paths = SnapshotPaths::new(dir);
    create_dir_all(&paths.root)?;
    write_bin(&paths.sites(), &inner.sites)?;
    write_bin(&paths.pages(), &inner.pages)?;
    write_bin(&paths.lemmas(), &inner.lemmas)?;
    write_bin(&paths.postings(), &inner.postings)?;

    let meta = MetaFile {
        version: SNAPSHOT_VERSION,
        created_at: crate::model::format_ts(crate::model::now_ts()),
        next_site_id: inner.next_site_id,
        next_page_id: inner.next_page_id,
        next_lemma_id: inner.next_lemma_id,
        next_posting_id: inner.next_posting_id,
    };
    let mut f = File::create(paths.meta())?;
    f.write_all(serde_json::to_string_pretty(&meta)?.as_bytes())?;
    Ok(())
}

pub fn load(dir: &Path) -> Result<StoreInner> {
    let paths = SnapshotPaths::new(dir);
    let mut f = File::open(paths.meta())?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let meta: MetaFile = serde_json::from_str(&buf)?;

    let sites: HashMap<SiteId, Site> = read_bin(&paths.sites())?;
    let pages: HashMap<PageId, Page> = read_bin(&paths.pages())?;
    let lemmas: HashMap<LemmaId, Lemma> = read_bin(&paths.lemmas())?;
    let postings: HashMap<PostingId, Posting> = read_bin(&paths.postings())?;

    Ok(StoreInner {
        sites,
        pages,
        lemmas,
        postings,
        next_site_id: meta.next_site_id,
        next_page_id: meta.next_page_id,
        next_lemma_id: meta.next_lemma_id,
        next_posting_id: meta.next_posting_id,
    })
}

#[cfg(test)]
mod tests {
    use crate::model::SiteStatus;
    use crate::store::Store;
    use tempfile::tempdir;

    #[test]
    fn snapshot_round_trip() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        {
            let mut txn = store.write();
            let site = txn.create_site("https://example.com", "Example", SiteStatus::Indexed);
            let page = txn.create_page(site.id, "/", 200, "<html>rust</html>");
            let lemma = txn.find_or_create_lemma(site.id, "rust");
            txn.increment_lemma_frequency(lemma);
            txn.create_posting(page.id, lemma, 1);
        }
        store.save().unwrap();

        let reloaded = Store::open(dir.path()).unwrap();
        let txn = reloaded.read();
        let site = txn.site_by_url("https://example.com").unwrap();
        assert_eq!(site.status, SiteStatus::Indexed);
        assert_eq!(txn.count_pages(site.id), 1);
        let lemma = txn.lemma_by_site_text(site.id, "rust").unwrap();
        assert_eq!(lemma.frequency, 1);
        // Fresh ids must not collide with persisted rows.
        let site_id = site.id;
        drop(txn);
        let next = reloaded.write().create_site("https://new.com", "New", SiteStatus::Indexing);
        assert!(next.id > site_id);
    }
}
