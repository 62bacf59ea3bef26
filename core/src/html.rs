//! HTML text extraction used by the indexer and the query engine.

use lazy_static::lazy_static;
use regex::Regex;
use scraper::{Html, Selector};

lazy_static! {
    static ref RE_NON_CONTENT: Regex = Regex::new(
        r"(?is)<script\b[^>]*>.*?</script>|<style\b[^>]*>.*?</style>|<noscript\b[^>]*>.*?</noscript>"
    )
    .expect("valid regex");
}

/// Visible text of an HTML document: script/style/noscript stripped, tags
/// removed, whitespace collapsed to single spaces.
pub fn clean_html(html: &str) -> String {
    let stripped = RE_NON_CONTENT.replace_all(html, " ");
    let doc = Html::parse_document(&stripped);
    let text = doc.root_element().text().collect::<Vec<_>>().join(" ");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Content of the first `<title>` element, if any.
pub fn extract_title(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let selector = Selector::parse("title").expect("valid selector");
    doc.select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_and_scripts() {
        let html = "<html><head><style>body{color:red}</style></head>\
                    <body><p>Cats run.</p><script>var x = 1;</script><p>Dogs swim.</p></body></html>";
        let text = clean_html(html);
        assert_eq!(text, "Cats run. Dogs swim.");
    }

    #[test]
    fn title_extraction() {
        let html = "<html><head><title> Home | Example </title></head><body></body></html>";
        assert_eq!(extract_title(html).as_deref(), Some("Home | Example"));
        assert_eq!(extract_title("<html><body>no title</body></html>"), None);
    }
}
