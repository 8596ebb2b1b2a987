//! Storage abstraction for shared items and chat messages.
//!
//! The engine talks to its collaborators only through these traits:
//!
//! | Trait | Implementations |
//! |-------|-----------------|
//! | [`SharedItemStore`] | [`SqliteStore`], [`InMemoryStore`] |
//! | [`MessageStore`] | [`SqliteStore`], [`InMemoryStore`] |
//!
//! Implementations must enforce uniqueness of `canonical_key` themselves:
//! [`SharedItemStore::create`] is the only arbiter of creation races and
//! reports a lost race as [`StoreError::Conflict`]. Counter updates are
//! single-record atomic increments.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::models::{ChatMessage, ItemKind, NewMessage, NewSharedItem, SharedItem, SortOrder};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

#[async_trait]
pub trait SharedItemStore: Send + Sync {
    async fn find_by_canonical_key(&self, key: &str) -> Result<Option<SharedItem>, StoreError>;

    async fn get(&self, id: &str) -> Result<Option<SharedItem>, StoreError>;

    /// Insert a new item with `share_count = 1`, `reference_count = 0` and
    /// both timestamps at `now`.
    ///
    /// Fails with [`StoreError::Conflict`] if the canonical key exists.
    async fn create(&self, item: NewSharedItem, now: DateTime<Utc>)
        -> Result<SharedItem, StoreError>;

    /// Atomically increment `share_count` and set `last_shared_at = at`.
    async fn record_share(&self, id: &str, at: DateTime<Utc>) -> Result<SharedItem, StoreError>;

    /// Atomically increment `reference_count`.
    async fn increment_reference_count(&self, id: &str) -> Result<SharedItem, StoreError>;

    /// Items ordered by `sort`, optionally filtered by kind, at most `limit`.
    async fn list_recent(
        &self,
        kind: Option<ItemKind>,
        sort: SortOrder,
        limit: i64,
    ) -> Result<Vec<SharedItem>, StoreError>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Append to the log; the store assigns `id` and `seq`.
    async fn append(&self, message: NewMessage, at: DateTime<Utc>)
        -> Result<ChatMessage, StoreError>;

    /// Messages with `seq > after_seq`, oldest first, at most `limit`.
    async fn list_since(&self, after_seq: i64, limit: i64) -> Result<Vec<ChatMessage>, StoreError>;
}
