//! Repeat-share detection.
//!
//! [`find_or_create`] resolves one canonical key against the shared-item
//! store. A lookup is tried first so repeats skip fingerprinting, but
//! creation itself is always "insert, and on a uniqueness conflict re-read
//! and record a share", so two concurrent first shares of the same key end
//! up as one item with `share_count == 2`.

use chrono::{DateTime, Utc};
use std::future::Future;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::models::{NewSharedItem, SharedItem};
use crate::scoring::days_between;
use crate::store::SharedItemStore;

/// Who first shared an item and how long ago, relative to a repeat share.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepeatNotice {
    pub sharer: String,
    pub days_ago: i64,
    pub when: String,
}

impl RepeatNotice {
    /// Build the notice for `item` being shared again by `poster` at `now`.
    pub fn new(item: &SharedItem, poster: &str, now: DateTime<Utc>) -> Self {
        let days_ago = whole_days_ago(item.first_shared_at, now);
        let sharer = match item.shared_by.as_deref() {
            Some(original) if original != poster => original.to_string(),
            _ => "someone".to_string(),
        };
        Self {
            sharer,
            days_ago,
            when: relative_phrase(days_ago),
        }
    }

    /// Text of the bot notification.
    pub fn text(&self) -> String {
        format!(
            "Heads up: this was already shared by {} {}.",
            self.sharer, self.when
        )
    }
}

/// Rounded whole days from `first` to `now`, never negative.
pub fn whole_days_ago(first: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    days_between(first, now).round().max(0.0) as i64
}

pub fn relative_phrase(days_ago: i64) -> String {
    match days_ago {
        i64::MIN..=0 => "earlier today".to_string(),
        1 => "yesterday".to_string(),
        n => format!("{} days ago", n),
    }
}

/// Result of resolving one canonical key.
#[derive(Debug, Clone)]
pub enum DedupOutcome {
    /// First observation; the item was just created.
    Created(SharedItem),
    /// The key already existed; its share was recorded.
    Repeat {
        item: SharedItem,
        notice: RepeatNotice,
    },
}

impl DedupOutcome {
    pub fn item(&self) -> &SharedItem {
        match self {
            DedupOutcome::Created(item) => item,
            DedupOutcome::Repeat { item, .. } => item,
        }
    }

    pub fn notice(&self) -> Option<&RepeatNotice> {
        match self {
            DedupOutcome::Created(_) => None,
            DedupOutcome::Repeat { notice, .. } => Some(notice),
        }
    }
}

/// Resolve `key`: record a repeat share, or create the item built by
/// `build`. `build` runs only when no item exists at lookup time; its
/// failure aborts without touching the store.
pub async fn find_or_create<F, Fut, E>(
    store: &dyn SharedItemStore,
    key: &str,
    poster: &str,
    now: DateTime<Utc>,
    build: F,
) -> Result<DedupOutcome, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<NewSharedItem, E>>,
    E: From<StoreError>,
{
    if let Some(existing) = store.find_by_canonical_key(key).await? {
        return Ok(record_repeat(store, &existing.id, poster, now).await?);
    }

    let new_item = build().await?;
    match store.create(new_item, now).await {
        Ok(item) => {
            info!(
                item = %item.id,
                kind = %item.kind,
                key = %item.canonical_key,
                keywords = item.keywords.len(),
                embedded = item.embedding.is_some(),
                "shared item created"
            );
            Ok(DedupOutcome::Created(item))
        }
        Err(StoreError::Conflict(_)) => {
            debug!(key, "lost create race, recording as repeat");
            let existing = store
                .find_by_canonical_key(key)
                .await?
                .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
            Ok(record_repeat(store, &existing.id, poster, now).await?)
        }
        Err(e) => Err(e.into()),
    }
}

async fn record_repeat(
    store: &dyn SharedItemStore,
    id: &str,
    poster: &str,
    now: DateTime<Utc>,
) -> Result<DedupOutcome, StoreError> {
    let item = store.record_share(id, now).await?;
    let notice = RepeatNotice::new(&item, poster, now);
    info!(
        item = %item.id,
        share_count = item.share_count,
        days_ago = notice.days_ago,
        "repeat share"
    );
    Ok(DedupOutcome::Repeat { item, notice })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use chrono::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_relative_phrases() {
        assert_eq!(relative_phrase(0), "earlier today");
        assert_eq!(relative_phrase(1), "yesterday");
        assert_eq!(relative_phrase(2), "2 days ago");
        assert_eq!(relative_phrase(30), "30 days ago");
    }

    #[test]
    fn test_days_ago_rounds() {
        let now = Utc::now();
        assert_eq!(whole_days_ago(now - Duration::hours(11), now), 0);
        assert_eq!(whole_days_ago(now - Duration::hours(13), now), 1);
        assert_eq!(whole_days_ago(now - Duration::hours(60), now), 3);
        assert_eq!(whole_days_ago(now + Duration::hours(30), now), 0);
    }

    #[test]
    fn test_notice_attribution() {
        let now = Utc::now();
        let item = NewSharedItem::link("https://x.com", vec![])
            .with_shared_by("ava")
            .into_item("1".into(), now - Duration::days(1));

        let other = RepeatNotice::new(&item, "milo", now);
        assert_eq!(other.text(), "Heads up: this was already shared by ava yesterday.");

        let same = RepeatNotice::new(&item, "ava", now);
        assert_eq!(same.sharer, "someone");

        let anonymous = NewSharedItem::link("https://y.com", vec![]).into_item("2".into(), now);
        assert_eq!(
            RepeatNotice::new(&anonymous, "milo", now).text(),
            "Heads up: this was already shared by someone earlier today."
        );
    }

    #[tokio::test]
    async fn test_first_then_repeat() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let first = find_or_create(&store, "https://x.com", "ava", now, || async {
            Ok::<_, StoreError>(
                NewSharedItem::link("https://x.com", vec!["x".into()]).with_shared_by("ava"),
            )
        })
        .await
        .unwrap();
        assert!(matches!(first, DedupOutcome::Created(_)));

        let builds = AtomicUsize::new(0);
        let later = now + Duration::days(3);
        let second = find_or_create(&store, "https://x.com", "milo", later, || async {
            builds.fetch_add(1, Ordering::SeqCst);
            Ok::<_, StoreError>(NewSharedItem::link("https://x.com", vec![]))
        })
        .await
        .unwrap();

        assert_eq!(builds.load(Ordering::SeqCst), 0);
        let item = second.item();
        assert_eq!(item.share_count, 2);
        assert_eq!(item.last_shared_at, later);
        assert_eq!(item.first_shared_at, now);
        assert_eq!(item.keywords, vec!["x"]);
        assert_eq!(
            second.notice().unwrap().text(),
            "Heads up: this was already shared by ava 3 days ago."
        );
    }

    #[tokio::test]
    async fn test_concurrent_first_shares_converge() {
        let store = Arc::new(InMemoryStore::new());
        let now = Utc::now();

        let mut handles = Vec::new();
        for poster in ["ava", "milo", "zoe", "kai"] {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                find_or_create(store.as_ref(), "hash-1", poster, now, || async move {
                    tokio::task::yield_now().await;
                    Ok::<_, StoreError>(
                        NewSharedItem::image("hash-1", "/uploads/hash-1.png", vec![])
                            .with_shared_by(poster),
                    )
                })
                .await
            }));
        }

        let mut created = 0;
        for handle in handles {
            if let DedupOutcome::Created(_) = handle.await.unwrap().unwrap() {
                created += 1;
            }
        }
        assert_eq!(created, 1);

        let item = store.find_by_canonical_key("hash-1").await.unwrap().unwrap();
        assert_eq!(item.share_count, 4);
    }
}
