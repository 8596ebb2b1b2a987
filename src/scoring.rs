//! Relevance scoring between an incoming message and a shared item.
//!
//! Two strategies implement [`Scorer`]; exactly one is chosen per
//! resurfacing evaluation:
//!
//! | Strategy | Score | Default threshold (triggered) |
//! |----------|-------|-------------------------------|
//! | [`SemanticScorer`] | cosine similarity of embeddings | 0.75 (0.6) |
//! | [`FallbackScorer`] | `2·overlap + recency + popularity` | 4 (2) |
//!
//! Scorers are pure: the evaluation instant is an explicit input.

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::embedding::cosine_similarity;
use crate::keywords::tokenize;
use crate::models::SharedItem;

const MS_PER_DAY: f64 = 86_400_000.0;
const MAX_RECENCY_BOOST: f64 = 5.0;
const MAX_SHARE_BOOST: i64 = 5;

/// Fractional days from `earlier` to `later` (negative if reversed).
pub fn days_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    (later - earlier).num_milliseconds() as f64 / MS_PER_DAY
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Semantic,
    Fallback,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Semantic => "semantic",
            Strategy::Fallback => "fallback",
        }
    }
}

/// Acceptance thresholds for one strategy. A trigger phrase in the message
/// switches to the (lower or equal) `triggered` threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub base: f64,
    pub triggered: f64,
}

impl Thresholds {
    pub fn effective(&self, triggered: bool) -> f64 {
        if triggered {
            self.triggered
        } else {
            self.base
        }
    }
}

pub trait Scorer {
    fn strategy(&self) -> Strategy;

    /// `None` means the item cannot be scored by this strategy and is
    /// never a candidate.
    fn score(&self, item: &SharedItem) -> Option<f64>;

    fn thresholds(&self) -> Thresholds;
}

/// Cosine similarity, or `None` if either vector is absent or the two are
/// not comparable (empty or different lengths).
pub fn score_semantic(query: Option<&[f32]>, item: Option<&[f32]>) -> Option<f64> {
    let (query, item) = (query?, item?);
    if query.is_empty() || query.len() != item.len() {
        return None;
    }
    Some(cosine_similarity(query, item))
}

/// Keyword/recency/popularity heuristic.
///
/// `lowercased_message` must already be lowercased. Each boost is capped at 5;
/// a `last_shared_at` in the future counts as "just now".
pub fn score_fallback(
    keywords: &[String],
    lowercased_message: &str,
    share_count: i64,
    last_shared_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> f64 {
    let tokens: HashSet<&str> = tokenize(lowercased_message).collect();
    let overlap = keywords
        .iter()
        .filter(|k| tokens.contains(k.as_str()))
        .count();

    let days_since = days_between(last_shared_at, now).max(0.0);
    let recency_boost = (MAX_RECENCY_BOOST - days_since).max(0.0);
    let share_boost = share_count.clamp(0, MAX_SHARE_BOOST) as f64;

    2.0 * overlap as f64 + recency_boost + share_boost
}

pub struct SemanticScorer {
    query: Vec<f32>,
    thresholds: Thresholds,
}

impl SemanticScorer {
    pub fn new(query: Vec<f32>, thresholds: Thresholds) -> Self {
        Self { query, thresholds }
    }
}

impl Scorer for SemanticScorer {
    fn strategy(&self) -> Strategy {
        Strategy::Semantic
    }

    fn score(&self, item: &SharedItem) -> Option<f64> {
        score_semantic(Some(&self.query), item.embedding.as_deref())
    }

    fn thresholds(&self) -> Thresholds {
        self.thresholds
    }
}

pub struct FallbackScorer {
    message: String,
    now: DateTime<Utc>,
    thresholds: Thresholds,
}

impl FallbackScorer {
    pub fn new(message: &str, now: DateTime<Utc>, thresholds: Thresholds) -> Self {
        Self {
            message: message.to_lowercase(),
            now,
            thresholds,
        }
    }
}

impl Scorer for FallbackScorer {
    fn strategy(&self) -> Strategy {
        Strategy::Fallback
    }

    fn score(&self, item: &SharedItem) -> Option<f64> {
        Some(score_fallback(
            &item.keywords,
            &self.message,
            item.share_count,
            item.last_shared_at,
            self.now,
        ))
    }

    fn thresholds(&self) -> Thresholds {
        self.thresholds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn kw(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_fallback_product_launch() {
        let now = Utc::now();
        let score = score_fallback(
            &kw(&["product", "launch"]),
            "what's the product launch link",
            3,
            now,
            now,
        );
        // overlap 2 → 4, recency 5, shares 3
        assert_eq!(score, 12.0);
    }

    #[test]
    fn test_fallback_caps() {
        let now = Utc::now();
        let old = now - Duration::days(30);
        assert_eq!(score_fallback(&kw(&[]), "", 100, old, now), 5.0);
        assert_eq!(score_fallback(&kw(&[]), "", 0, now, now), 5.0);
        let future = now + Duration::days(3);
        assert_eq!(score_fallback(&kw(&[]), "", 0, future, now), 5.0);
    }

    #[test]
    fn test_fallback_recency_is_fractional() {
        let now = Utc::now();
        let half_day = now - Duration::hours(12);
        assert!((score_fallback(&kw(&[]), "", 0, half_day, now) - 4.5).abs() < 1e-9);
    }

    #[test]
    fn test_fallback_overlap_uses_message_tokens() {
        let now = Utc::now();
        let old = now - Duration::days(10);
        let keywords = kw(&["rust", "async", "tokio"]);
        assert_eq!(score_fallback(&keywords, "rust-async! tokio?", 0, old, now), 6.0);
        // substrings do not count
        assert_eq!(score_fallback(&keywords, "rustacean tokios", 0, old, now), 0.0);
    }

    #[test]
    fn test_fallback_scorer_lowercases_message() {
        let now = Utc::now();
        let old = now - Duration::days(10);
        let scorer = FallbackScorer::new(
            "The ROADMAP doc",
            now,
            Thresholds {
                base: 4.0,
                triggered: 2.0,
            },
        );
        let item = crate::models::NewSharedItem::link("https://x.com/roadmap", kw(&["roadmap"]))
            .into_item("1".into(), old);
        // overlap 1 → 2, stale, shared once
        assert_eq!(scorer.score(&item), Some(3.0));
        assert_eq!(scorer.strategy(), Strategy::Fallback);
    }

    #[test]
    fn test_semantic_none_when_missing_or_malformed() {
        let v = vec![1.0f32, 0.0];
        assert_eq!(score_semantic(None, Some(&v)), None);
        assert_eq!(score_semantic(Some(&v), None), None);
        assert_eq!(score_semantic(Some(&v), Some(&[1.0])), None);
        assert_eq!(score_semantic(Some(&[]), Some(&[])), None);
    }

    #[test]
    fn test_semantic_is_cosine() {
        let a = vec![1.0f32, 1.0];
        let b = vec![1.0f32, 0.0];
        let s = score_semantic(Some(&a), Some(&b)).unwrap();
        assert!((s - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-6);
    }

    #[test]
    fn test_thresholds_effective() {
        let t = Thresholds {
            base: 0.75,
            triggered: 0.6,
        };
        assert_eq!(t.effective(false), 0.75);
        assert_eq!(t.effective(true), 0.6);
    }
}
