//! Canonical identity for shared content.
//!
//! Links are identified by their normalized URL; images by the SHA-256 of
//! their bytes. Both functions are total: a URL that cannot be parsed
//! degrades to its trimmed raw text rather than failing the pipeline.

use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::LazyLock;
use url::Url;

/// Query parameters that only carry campaign/click attribution.
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
];

static RE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:https?://|www\.)\S+").expect("valid URL regex"));

static RE_SCHEME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.-]*://").expect("valid scheme regex"));

/// Normalize a raw URL into its canonical key.
///
/// Forces `https`, drops tracking parameters and the fragment, and removes
/// trailing slashes from the path. The remaining query is re-encoded in
/// `application/x-www-form-urlencoded` form. A missing scheme is treated as
/// `https://`.
///
/// ```rust
/// use lockin::canonical::normalize_url;
///
/// assert_eq!(
///     normalize_url("http://example.com/post/?utm_source=tw#top"),
///     "https://example.com/post"
/// );
/// ```
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let candidate = if RE_SCHEME.is_match(trimmed) {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let mut url = match Url::parse(&candidate) {
        Ok(url) => url,
        Err(_) => return trimmed.to_string(),
    };

    // Non-special schemes cannot be switched; they keep their own.
    let _ = url.set_scheme("https");
    canonicalize_query(&mut url);
    url.set_fragment(None);
    trim_trailing_slashes(&mut url);

    let serialized = String::from(url);
    match serialized.strip_suffix('/') {
        Some(without) => without.to_string(),
        None => serialized,
    }
}

fn is_tracking_param(key: &str) -> bool {
    TRACKING_PARAMS
        .iter()
        .any(|param| param.eq_ignore_ascii_case(key))
}

fn canonicalize_query(url: &mut Url) {
    match url.query() {
        None => return,
        Some("") => {
            url.set_query(None);
            return;
        }
        Some(_) => {}
    }

    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let kept: Vec<&(String, String)> = pairs
        .iter()
        .filter(|(k, _)| !is_tracking_param(k))
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }
}

fn trim_trailing_slashes(url: &mut Url) {
    if url.cannot_be_a_base() {
        return;
    }
    let trimmed = url.path().trim_end_matches('/').to_string();
    if trimmed.len() == url.path().len() {
        return;
    }
    url.set_path(if trimmed.is_empty() { "/" } else { trimmed.as_str() });
}

/// Find URL-like tokens in free text, left to right.
///
/// Matches `http://`, `https://` and `www.` prefixed runs up to the next
/// whitespace, with trailing `)`, `,` and `.` removed. Duplicates are kept.
pub fn extract_urls(text: &str) -> Vec<String> {
    RE_URL
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches([')', ',', '.']).to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// SHA-256 of the raw bytes as 64 lowercase hex characters.
pub fn hash_content(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
