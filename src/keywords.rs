//! Keyword fingerprints.
//!
//! A recall-oriented bag of words: lowercase ASCII alphanumeric runs longer
//! than two characters, deduplicated in first-seen order. No stemming and
//! no stopword list.

use std::collections::HashSet;
use url::Url;

/// Minimum token length kept by [`extract_keywords`] is this plus one.
const MIN_TOKEN_LEN: usize = 2;

/// Split already-lowercased text into `[a-z0-9]+` runs.
///
/// This is the character-class rule shared by keyword extraction and the
/// fallback scorer's message tokenizer.
pub fn tokenize(lowercased: &str) -> impl Iterator<Item = &str> {
    lowercased
        .split(|c: char| !(c.is_ascii_lowercase() || c.is_ascii_digit()))
        .filter(|t| !t.is_empty())
}

/// Extract keywords from free text.
///
/// ```rust
/// use lockin::keywords::extract_keywords;
///
/// let kw = extract_keywords("Rust 2024 edition-guide");
/// assert_eq!(kw, vec!["rust", "2024", "edition", "guide"]);
/// ```
pub fn extract_keywords(text: &str) -> Vec<String> {
    let lowered = text
        .to_lowercase()
        .replace("https://", "")
        .replace("http://", "");

    let mut seen = HashSet::new();
    tokenize(&lowered)
        .filter(|t| t.len() > MIN_TOKEN_LEN)
        .filter(|t| seen.insert(*t))
        .map(str::to_string)
        .collect()
}

/// Extract keywords from a URL's host labels and path segments.
///
/// Query and fragment are ignored. Falls back to [`extract_keywords`] on
/// the raw string when it does not parse.
pub fn keywords_from_url(url: &str) -> Vec<String> {
    let parsed = match Url::parse(url) {
        Ok(parsed) => parsed,
        Err(_) => return extract_keywords(url),
    };

    let mut parts: Vec<&str> = Vec::new();
    if let Some(host) = parsed.host_str() {
        parts.extend(host.split('.').filter(|p| !p.is_empty()));
    }
    if let Some(segments) = parsed.path_segments() {
        parts.extend(segments.filter(|s| !s.is_empty()));
    }

    extract_keywords(&parts.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(words: &[&str]) -> HashSet<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_extract_from_text_with_url() {
        let kw: HashSet<String> = extract_keywords("Check out https://Example.com/Cool-Stuff")
            .into_iter()
            .collect();
        assert_eq!(kw, set(&["check", "out", "example", "com", "cool", "stuff"]));
    }

    #[test]
    fn test_short_tokens_dropped() {
        assert!(extract_keywords("a an to of is").is_empty());
        assert_eq!(extract_keywords("go big or go home"), vec!["big", "home"]);
    }

    #[test]
    fn test_deduplicates() {
        assert_eq!(extract_keywords("Launch launch LAUNCH day"), vec!["launch", "day"]);
    }

    #[test]
    fn test_punctuation_and_unicode_become_separators() {
        assert_eq!(
            extract_keywords("café_menu!!prices/2024.pdf"),
            vec!["caf", "menu", "prices", "2024", "pdf"]
        );
    }

    #[test]
    fn test_empty_input() {
        assert!(extract_keywords("").is_empty());
        assert!(keywords_from_url("").is_empty());
    }

    #[test]
    fn test_keywords_from_url_host_and_path() {
        let kw = keywords_from_url("https://www.example.com/blog/product-launch?utm_source=x#top");
        assert_eq!(kw, vec!["www", "example", "com", "blog", "product", "launch"]);
    }

    #[test]
    fn test_keywords_from_url_ignores_query() {
        let kw = keywords_from_url("https://docs.rs/tokio?search=runtime");
        assert_eq!(kw, vec!["docs", "tokio"]);
    }

    #[test]
    fn test_keywords_from_unparseable_url() {
        assert_eq!(keywords_from_url("not-a-url really"), vec!["not", "url", "really"]);
    }

    #[test]
    fn test_tokenize_keeps_short_tokens() {
        let tokens: Vec<&str> = tokenize("what's the ux link?").collect();
        assert_eq!(tokens, vec!["what", "s", "the", "ux", "link"]);
    }
}
