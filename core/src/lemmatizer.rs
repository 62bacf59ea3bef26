//! Text normalization: reduces free text to counted word stems ("lemmas").
//!
//! NFKC normalization, lowercasing, stopword removal and English stemming;
//! stems shorter than three characters are discarded. Deterministic and
//! side-effect free, so both the indexer and the query engine can call it.

use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::{HashMap, HashSet};
use unicode_normalization::UnicodeNormalization;

/// Stems shorter than this carry no signal and are dropped.
pub const MIN_LEMMA_LEN: usize = 3;

lazy_static! {
    static ref RE: Regex = Regex::new(r"(?u)\p{L}[\p{L}\p{N}_']*").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","aren't","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","can't","cannot","could","couldn't",
            "did","didn't","do","does","doesn't","doing","don't","down","during",
            "each","few","for","from","further",
            "had","hadn't","has","hasn't","have","haven't","having","he","he'd","he'll","he's","her","here","here's","hers","herself","him","himself","his","how","how's",
            "i","i'd","i'll","i'm","i've","if","in","into","is","isn't","it","it's","its","itself",
            "let's","me","more","most","mustn't","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "same","she","she'd","she'll","she's","should","shouldn't","so","some","such",
            "than","that","that's","the","their","theirs","them","themselves","then","there","there's","these","they","they'd","they'll","they're","they've","this","those","through","to","too",
            "under","until","up","very",
            "was","wasn't","we","we'd","we'll","we're","we've","were","weren't","what","what's","when","when's","where","where's","which","while","who","who's","whom","why","why's","with","won't","would","wouldn't",
            "you","you'd","you'll","you're","you've","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(token)
}

fn stems(text: &str) -> impl Iterator<Item = String> + '_ {
    let normalized = text.nfkc().collect::<String>().to_lowercase();
    // The regex borrows the normalized buffer, so collect eagerly.
    let tokens: Vec<String> = RE
        .find_iter(&normalized)
        .map(|m| m.as_str().to_string())
        .collect();
    tokens.into_iter().filter_map(|token| {
        if is_stopword(&token) {
            return None;
        }
        let stem = STEMMER.stem(&token).to_string();
        if stem.chars().count() < MIN_LEMMA_LEN {
            return None;
        }
        Some(stem)
    })
}

/// Maps each lemma to its occurrence count within `text`.
pub fn lemmatize(text: &str) -> HashMap<String, u32> {
    let mut counts: HashMap<String, u32> = HashMap::new();
    for stem in stems(text) {
        *counts.entry(stem).or_insert(0) += 1;
    }
    counts
}

/// Distinct lemmas of `text` in first-seen order.
pub fn lemma_list(text: &str) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();
    for stem in stems(text) {
        if seen.insert(stem.clone()) {
            out.push(stem);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_occurrences_per_lemma() {
        let counts = lemmatize("Running, runner's run! Dogs run.");
        assert!(counts["run"] >= 2);
        assert_eq!(counts["dog"], 1);
    }

    #[test]
    fn lemma_list_keeps_first_seen_order() {
        let lemmas = lemma_list("dogs swim, dogs bark");
        assert_eq!(lemmas, vec!["dog", "swim", "bark"]);
    }
}
