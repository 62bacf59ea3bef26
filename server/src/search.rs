//! The search query engine: lemmatized query -> document-frequency filtered
//! lemmas -> postings intersection -> summed-rank relevance -> paginated,
//! snippet-annotated results.

use anyhow::Result;
use serde::Serialize;
use sitesearch_core::html::{clean_html, extract_title};
use sitesearch_core::{lemmatizer, Lemma, PageId, Store};
use std::sync::Arc;
use tracing::{debug, error};

/// Lemmas present on at least this share of a site's pages are considered
/// noise and excluded from the intersection filter.
pub const MAX_FREQUENCY_RATIO: f64 = 0.8;
/// Hard cap on snippet length, in characters.
pub const SNIPPET_MAX_CHARS: usize = 250;

const UNTITLED: &str = "Untitled";

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub result: bool,
    pub count: usize,
    pub data: Vec<SearchItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SearchResponse {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            result: false,
            count: 0,
            data: Vec::new(),
            error: Some(message.into()),
        }
    }

    fn empty() -> Self {
        Self {
            result: true,
            count: 0,
            data: Vec::new(),
            error: None,
        }
    }

    fn success(count: usize, data: Vec<SearchItem>) -> Self {
        Self {
            result: true,
            count,
            data,
            error: None,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchItem {
    pub site: String,
    pub site_name: String,
    pub uri: String,
    pub title: String,
    pub snippet: String,
    /// Relative to the best hit of this result set, in (0, 1].
    pub relevance: f64,
}

pub struct SearchEngine {
    store: Arc<Store>,
}

impl SearchEngine {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Never propagates: internal errors come back as a failure response.
    pub fn search(
        &self,
        query: &str,
        site_url: Option<&str>,
        offset: usize,
        limit: usize,
    ) -> SearchResponse {
        if query.trim().is_empty() {
            return SearchResponse::failure("Empty search query");
        }
        match self.run_query(query, site_url, offset, limit) {
            Ok(response) => response,
            Err(e) => {
                error!(query, error = %e, "search failed");
                SearchResponse::failure(format!("Search error: {e}"))
            }
        }
    }

    fn run_query(
        &self,
        query: &str,
        site_url: Option<&str>,
        offset: usize,
        limit: usize,
    ) -> Result<SearchResponse> {
        let query_lemmas = lemmatizer::lemma_list(query);
        if query_lemmas.is_empty() {
            // Stop-words and short tokens only: a valid empty match set.
            return Ok(SearchResponse::empty());
        }

        let txn = self.store.read();
        let site_id = site_url.and_then(|u| txn.site_by_url(u)).map(|s| s.id);

        // Keep only lemmas rare enough to discriminate, rarest first.
        let mut filtered: Vec<Lemma> = Vec::new();
        for text in &query_lemmas {
            for lemma in txn.lemmas_by_text(text, site_id) {
                let total_pages = txn.count_pages(lemma.site_id);
                if total_pages == 0 {
                    continue;
                }
                let ratio = lemma.frequency as f64 / total_pages as f64;
                if ratio < MAX_FREQUENCY_RATIO {
                    filtered.push(lemma);
                }
            }
        }
        if filtered.is_empty() {
            return Ok(SearchResponse::empty());
        }
        filtered.sort_by_key(|l| l.frequency);

        // Pages containing every surviving lemma.
        let mut pages: Vec<PageId> = txn.pages_by_lemma(filtered[0].id);
        for lemma in filtered.iter().skip(1) {
            if pages.is_empty() {
                break;
            }
            pages = txn.pages_by_lemma_within(lemma.id, &pages);
        }
        debug!(
            query,
            lemmas = filtered.len(),
            matches = pages.len(),
            "intersection complete"
        );

        // The reported count is the full match-set size, not the page size.
        let count = pages.len();

        // Relevance sums ranks over the original query lemmas, not just the
        // filtered survivors.
        let mut scored: Vec<(PageId, u32)> = Vec::new();
        let mut max_relevance: u32 = 0;
        for page_id in &pages {
            let relevance = txn.sum_ranks_for_page(*page_id, &query_lemmas);
            if relevance > 0 {
                max_relevance = max_relevance.max(relevance);
                scored.push((*page_id, relevance));
            }
        }
        scored.sort_by(|a, b| b.1.cmp(&a.1));

        let mut data = Vec::new();
        for (page_id, relevance) in scored.into_iter().skip(offset).take(limit) {
            let Some(page) = txn.page(page_id) else { continue };
            let Some(site) = txn.site(page.site_id) else { continue };
            data.push(SearchItem {
                site: site.url.clone(),
                site_name: site.name.clone(),
                uri: page.path.clone(),
                title: extract_title(&page.content).unwrap_or_else(|| UNTITLED.to_string()),
                snippet: generate_snippet(&page.content, &query_lemmas),
                relevance: relevance as f64 / max_relevance as f64,
            });
        }
        Ok(SearchResponse::success(count, data))
    }
}

/// Picks the sentence containing the most distinct query lemmas (first-best
/// wins; a sentence matching all of them short-circuits), falls back to the
/// head of the cleaned text, highlights lemma occurrences, truncates.
fn generate_snippet(content: &str, query_lemmas: &[String]) -> String {
    let clean = clean_html(content);

    let mut best: Option<&str> = None;
    let mut best_matches = 0;
    for sentence in split_sentences(&clean) {
        let lower = sentence.to_lowercase();
        let matches = query_lemmas
            .iter()
            .filter(|l| lower.contains(&l.to_lowercase()))
            .count();
        if matches > best_matches {
            best_matches = matches;
            best = Some(sentence);
            if matches == query_lemmas.len() {
                break;
            }
        }
    }

    let snippet = match best {
        Some(sentence) => sentence.to_string(),
        None => clean.chars().take(SNIPPET_MAX_CHARS).collect(),
    };
    truncate_chars(&highlight_lemmas(&snippet, query_lemmas), SNIPPET_MAX_CHARS)
}

/// Splits on `.`, `!`, `?` followed by whitespace; terminators stay attached.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, ch)) = chars.next() {
        if !matches!(ch, '.' | '!' | '?') {
            continue;
        }
        let end = i + ch.len_utf8();
        let mut next_start = end;
        let mut saw_whitespace = false;
        while let Some(&(j, c)) = chars.peek() {
            if !c.is_whitespace() {
                break;
            }
            saw_whitespace = true;
            next_start = j + c.len_utf8();
            chars.next();
        }
        if saw_whitespace {
            out.push(&text[start..end]);
            start = next_start;
        }
    }
    if start < text.len() {
        out.push(text[start..].trim_end());
    }
    out
}

/// Wraps every case-insensitive lemma occurrence in `<b>` markers.
fn highlight_lemmas(snippet: &str, lemmas: &[String]) -> String {
    let mut out = snippet.to_string();
    for lemma in lemmas {
        if lemma.trim().is_empty() {
            continue;
        }
        let pattern = regex::RegexBuilder::new(&regex::escape(lemma))
            .case_insensitive(true)
            .build()
            .expect("escaped lemma is a valid pattern");
        out = pattern.replace_all(&out, "<b>$0</b>").to_string();
    }
    out
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let head: String = s.chars().take(max).collect();
        format!("{head}...")
    } else {
        s.to_string()
    }
}
