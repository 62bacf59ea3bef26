//! Link normalization and the in-scope URL policy.
//!
//! The policy keeps the frontier bounded to indexable HTML: same-site prefix,
//! no known binary/document/script extensions, no fragments, no feed/amp
//! endpoints, no query strings.

use lazy_static::lazy_static;
use regex::Regex;
use url::Url;

lazy_static! {
    static ref RE_RESOURCE: Regex =
        Regex::new(r"(?i)\.(pdf|jpe?g|png|gif|zip|docx?|xlsx?|pptx?|js|css|xml|json)$")
            .expect("valid regex");
    static ref RE_FEED: Regex = Regex::new(r"/feed/?$").expect("valid regex");
    static ref RE_AMP: Regex = Regex::new(r"/amp/?$").expect("valid regex");
}

/// Resolves a raw href against the page it appeared on and canonicalizes it:
/// absolute URL, fragment stripped, redundant slashes collapsed. Returns
/// `None` for non-http(s) or unparseable links.
pub fn normalize_link(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    let mut resolved = Url::parse(href).or_else(|_| base.join(href)).ok()?;
    if !resolved.scheme().starts_with("http") {
        return None;
    }
    resolved.set_fragment(None);
    Some(collapse_slashes(resolved.as_str()))
}

/// Collapses runs of '/' everywhere except the scheme separator.
fn collapse_slashes(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let mut out = String::with_capacity(url.len());
    out.push_str(scheme);
    out.push_str("://");
    let mut prev_slash = false;
    for ch in rest.chars() {
        if ch == '/' {
            if prev_slash {
                continue;
            }
            prev_slash = true;
        } else {
            prev_slash = false;
        }
        out.push(ch);
    }
    out
}

/// Whether a normalized candidate link is in crawl scope for a site root
/// (given without a trailing slash).
pub fn is_valid_url(url: &str, site_root: &str) -> bool {
    url.starts_with(site_root)
        && !RE_RESOURCE.is_match(url)
        && !url.contains('#')
        && !RE_FEED.is_match(url)
        && !RE_AMP.is_match(url)
        && !url.contains('?')
}

/// Site-relative path of an in-scope URL; the empty path normalizes to "/".
pub fn site_relative_path(url: &str, site_root: &str) -> String {
    let path = url.strip_prefix(site_root).unwrap_or(url);
    if path.is_empty() {
        "/".to_string()
    } else if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}
