use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub type SiteId = u32;
pub type PageId = u32;
pub type LemmaId = u32;
pub type PostingId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SiteStatus {
    Indexing,
    Indexed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    pub id: SiteId,
    /// Canonical root URL, compared with no trailing slash.
    pub url: String,
    pub name: String,
    pub status: SiteStatus,
    /// Unix seconds of the last status transition.
    pub status_time: i64,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub id: PageId,
    pub site_id: SiteId,
    /// Site-relative path, always starting with "/".
    pub path: String,
    pub code: u16,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lemma {
    pub id: LemmaId,
    pub site_id: SiteId,
    pub text: String,
    /// Number of pages on this site containing the lemma at least once.
    pub frequency: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Posting {
    pub id: PostingId,
    pub page_id: PageId,
    pub lemma_id: LemmaId,
    /// Occurrence count of the lemma within the page.
    pub rank: u32,
}

pub fn now_ts() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

pub fn format_ts(ts: i64) -> String {
    OffsetDateTime::from_unix_timestamp(ts)
        .ok()
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_default()
}
