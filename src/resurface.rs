//! Resurfacing: pick at most one earlier share that a new message is about.
//!
//! Each evaluation moves through `NoCandidate → Scored → {Suppressed | Resurfaced}`:
//!
//! 1. Load a bounded, most-recent-first candidate set.
//! 2. Choose the strategy once: semantic if the gateway is enabled and the
//!    message embeds, otherwise the keyword fallback.
//! 3. Keep the highest-scoring candidate (strict `>`, so the first of a tie wins).
//! 4. Accept it if `score >= threshold`. A trigger phrase lowers the
//!    threshold; it never produces a match on its own.
//!
//! [`select_top_match`] is pure; [`evaluate`] adds the store and gateway
//! I/O and [`apply`] performs the side effects of a match.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::config::ResurfaceConfig;
use crate::embedding::EmbeddingGateway;
use crate::error::StoreError;
use crate::models::{ChatMessage, NewMessage, SharedItem, SortOrder};
use crate::scoring::{FallbackScorer, Scorer, SemanticScorer, Strategy, Thresholds};
use crate::store::{MessageStore, SharedItemStore};

/// Case-insensitive substring match against the configured phrases.
/// Blank phrases never match.
pub fn contains_trigger_phrase(text: &str, phrases: &[String]) -> bool {
    let lowered = text.to_lowercase();
    phrases.iter().any(|p| {
        let phrase = p.trim().to_lowercase();
        !phrase.is_empty() && lowered.contains(&phrase)
    })
}

/// Outcome of scoring one message against its candidates.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// No candidate could be scored.
    NoCandidate,
    /// The best candidate scored below the threshold.
    Suppressed {
        best: SharedItem,
        score: f64,
        threshold: f64,
    },
    /// The best candidate cleared the threshold.
    Matched {
        item: SharedItem,
        score: f64,
        threshold: f64,
    },
}

impl Selection {
    pub fn matched(&self) -> Option<&SharedItem> {
        match self {
            Selection::Matched { item, .. } => Some(item),
            _ => None,
        }
    }
}

/// Score every candidate and decide on the single best one.
pub fn select_top_match(
    scorer: &dyn Scorer,
    candidates: &[SharedItem],
    triggered: bool,
) -> Selection {
    let mut best: Option<(&SharedItem, f64)> = None;
    for item in candidates {
        // NaN would never be beaten under strict `>`
        let Some(score) = scorer.score(item).filter(|s| s.is_finite()) else {
            continue;
        };
        let replace = match best {
            None => true,
            Some((_, current)) => score > current,
        };
        if replace {
            best = Some((item, score));
        }
    }

    let Some((item, score)) = best else {
        return Selection::NoCandidate;
    };
    let threshold = scorer.thresholds().effective(triggered);
    if score >= threshold {
        Selection::Matched {
            item: item.clone(),
            score,
            threshold,
        }
    } else {
        Selection::Suppressed {
            best: item.clone(),
            score,
            threshold,
        }
    }
}

/// A finished evaluation, kept for logging and tests.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub strategy: Strategy,
    pub triggered: bool,
    pub candidates: usize,
    pub selection: Selection,
}

/// Pick the scoring strategy for one evaluation.
///
/// `query` is the message embedding, if one was obtained.
pub fn build_scorer(
    query: Option<Vec<f32>>,
    message: &str,
    now: DateTime<Utc>,
    config: &ResurfaceConfig,
) -> Box<dyn Scorer + Send + Sync> {
    match query {
        Some(vector) => Box::new(SemanticScorer::new(
            vector,
            Thresholds {
                base: config.semantic_threshold,
                triggered: config.trigger_semantic_threshold,
            },
        )),
        None => Box::new(FallbackScorer::new(
            message,
            now,
            Thresholds {
                base: config.fallback_threshold,
                triggered: config.trigger_fallback_threshold,
            },
        )),
    }
}

/// Gather candidates and score `message` against them.
///
/// Items whose ids are in `exclude` (those the message itself just shared)
/// are not candidates.
pub async fn evaluate(
    items: &dyn SharedItemStore,
    gateway: &EmbeddingGateway,
    config: &ResurfaceConfig,
    message: &str,
    exclude: &[String],
    now: DateTime<Utc>,
) -> Result<Evaluation, StoreError> {
    let candidates: Vec<SharedItem> = items
        .list_recent(None, SortOrder::Recency, config.candidate_limit)
        .await?
        .into_iter()
        .filter(|item| !exclude.contains(&item.id))
        .collect();

    let triggered = contains_trigger_phrase(message, &config.trigger_phrases);
    if candidates.is_empty() {
        return Ok(Evaluation {
            strategy: Strategy::Fallback,
            triggered,
            candidates: 0,
            selection: Selection::NoCandidate,
        });
    }

    let query = if gateway.is_enabled() {
        gateway.embed(message).await
    } else {
        None
    };
    let scorer = build_scorer(query, message, now, config);
    let selection = select_top_match(scorer.as_ref(), &candidates, triggered);

    let evaluation = Evaluation {
        strategy: scorer.strategy(),
        triggered,
        candidates: candidates.len(),
        selection,
    };
    log_evaluation(&evaluation);
    Ok(evaluation)
}

fn log_evaluation(evaluation: &Evaluation) {
    let strategy = evaluation.strategy.as_str();
    match &evaluation.selection {
        Selection::NoCandidate => debug!(strategy, "no scorable candidate"),
        Selection::Suppressed {
            best,
            score,
            threshold,
        } => debug!(
            strategy,
            item = %best.id,
            score,
            threshold,
            triggered = evaluation.triggered,
            "best candidate below threshold"
        ),
        Selection::Matched {
            item,
            score,
            threshold,
        } => debug!(
            strategy,
            item = %item.id,
            score,
            threshold,
            triggered = evaluation.triggered,
            candidates = evaluation.candidates,
            "candidate accepted"
        ),
    }
}

/// Record a match: bump the item's reference count and post one bot
/// message pointing at it. Does nothing for a non-match.
pub async fn apply(
    items: &dyn SharedItemStore,
    messages: &dyn MessageStore,
    bot_name: &str,
    selection: &Selection,
    now: DateTime<Utc>,
) -> Result<Option<ChatMessage>, StoreError> {
    let Some(matched) = selection.matched() else {
        return Ok(None);
    };

    let updated = items.increment_reference_count(&matched.id).await?;
    let text = format!("Resurfacing: {}", updated.display_label());
    let message = messages
        .append(
            NewMessage::bot(bot_name, text).referencing(Some(updated.id.clone())),
            now,
        )
        .await?;

    info!(
        item = %updated.id,
        reference_count = updated.reference_count,
        "resurfaced shared item"
    );
    Ok(Some(message))
}
