use sitesearch_core::lemmatizer::{lemma_list, lemmatize};

#[test]
fn it_normalizes_and_stems() {
    let counts = lemmatize("Running Runners RUN! The café's menu.");
    // Stemming folds the inflections of "run" together.
    assert!(counts.contains_key("run"));
    // Unicode normalization: café -> cafe
    assert!(counts.keys().any(|w| w.starts_with("caf")));
}

#[test]
fn it_filters_stopwords_and_short_stems() {
    let counts = lemmatize("The quick brown fox and the lazy ox");
    assert!(!counts.contains_key("the"));
    assert!(!counts.contains_key("and"));
    // "ox" survives the stopword list but is below the length floor.
    assert!(!counts.contains_key("ox"));
    assert!(counts.contains_key("quick"));
}

#[test]
fn stopword_only_text_yields_nothing() {
    assert!(lemma_list("the of and to").is_empty());
}
