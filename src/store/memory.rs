//! In-memory store for tests and embedding hosts without SQLite.
//!
//! Items and messages live behind `std::sync::RwLock`. The canonical-key
//! index is updated under the same write lock as the item map, so
//! [`create`](SharedItemStore::create) has the same conflict semantics as
//! the SQLite unique constraint.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{MessageStore, SharedItemStore};
use crate::error::StoreError;
use crate::models::{ChatMessage, ItemKind, NewMessage, NewSharedItem, SharedItem, SortOrder};

#[derive(Default)]
struct Items {
    by_id: HashMap<String, (u64, SharedItem)>,
    by_key: HashMap<String, String>,
    next_order: u64,
}

/// In-memory implementation of both store traits.
#[derive(Default)]
pub struct InMemoryStore {
    items: RwLock<Items>,
    messages: RwLock<Vec<ChatMessage>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace an item wholesale. Lets tests arrange timestamps and counters.
    pub fn put_item(&self, item: SharedItem) {
        let mut items = self.items.write().unwrap();
        let order = items.next_order;
        items.next_order += 1;
        items
            .by_key
            .insert(item.canonical_key.clone(), item.id.clone());
        items.by_id.insert(item.id.clone(), (order, item));
    }

    fn update<F>(&self, id: &str, f: F) -> Result<SharedItem, StoreError>
    where
        F: FnOnce(&mut SharedItem),
    {
        let mut items = self.items.write().unwrap();
        let (_, item) = items
            .by_id
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        f(item);
        Ok(item.clone())
    }
}

#[async_trait]
impl SharedItemStore for InMemoryStore {
    async fn find_by_canonical_key(&self, key: &str) -> Result<Option<SharedItem>, StoreError> {
        let items = self.items.read().unwrap();
        Ok(items
            .by_key
            .get(key)
            .and_then(|id| items.by_id.get(id))
            .map(|(_, item)| item.clone()))
    }

    async fn get(&self, id: &str) -> Result<Option<SharedItem>, StoreError> {
        let items = self.items.read().unwrap();
        Ok(items.by_id.get(id).map(|(_, item)| item.clone()))
    }

    async fn create(
        &self,
        item: NewSharedItem,
        now: DateTime<Utc>,
    ) -> Result<SharedItem, StoreError> {
        let mut items = self.items.write().unwrap();
        if items.by_key.contains_key(&item.canonical_key) {
            return Err(StoreError::Conflict(item.canonical_key));
        }

        let created = item.into_item(Uuid::new_v4().to_string(), now);
        let order = items.next_order;
        items.next_order += 1;
        items
            .by_key
            .insert(created.canonical_key.clone(), created.id.clone());
        items
            .by_id
            .insert(created.id.clone(), (order, created.clone()));
        Ok(created)
    }

    async fn record_share(&self, id: &str, at: DateTime<Utc>) -> Result<SharedItem, StoreError> {
        self.update(id, |item| {
            item.share_count += 1;
            item.last_shared_at = at;
        })
    }

    async fn increment_reference_count(&self, id: &str) -> Result<SharedItem, StoreError> {
        self.update(id, |item| item.reference_count += 1)
    }

    async fn list_recent(
        &self,
        kind: Option<ItemKind>,
        sort: SortOrder,
        limit: i64,
    ) -> Result<Vec<SharedItem>, StoreError> {
        let items = self.items.read().unwrap();
        let mut rows: Vec<&(u64, SharedItem)> = items
            .by_id
            .values()
            .filter(|(_, item)| kind.map_or(true, |k| item.kind == k))
            .collect();

        // Ties fall back to newest insertion first, matching the SQLite rowid order
        match sort {
            SortOrder::Recency => rows.sort_by(|(oa, a), (ob, b)| {
                b.last_shared_at
                    .cmp(&a.last_shared_at)
                    .then_with(|| ob.cmp(oa))
            }),
            SortOrder::Popularity => rows.sort_by(|(oa, a), (ob, b)| {
                b.share_count
                    .cmp(&a.share_count)
                    .then_with(|| b.last_shared_at.cmp(&a.last_shared_at))
                    .then_with(|| ob.cmp(oa))
            }),
        }

        Ok(rows
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|(_, item)| item.clone())
            .collect())
    }
}

#[async_trait]
impl MessageStore for InMemoryStore {
    async fn append(
        &self,
        message: NewMessage,
        at: DateTime<Utc>,
    ) -> Result<ChatMessage, StoreError> {
        let mut messages = self.messages.write().unwrap();
        let seq = messages.last().map(|m| m.seq + 1).unwrap_or(1);
        let stored = ChatMessage {
            id: Uuid::new_v4().to_string(),
            seq,
            author: message.author,
            text: message.text,
            is_bot: message.is_bot,
            created_at: at,
            shared_item_id: message.shared_item_id,
        };
        messages.push(stored.clone());
        Ok(stored)
    }

    async fn list_since(&self, after_seq: i64, limit: i64) -> Result<Vec<ChatMessage>, StoreError> {
        let messages = self.messages.read().unwrap();
        Ok(messages
            .iter()
            .filter(|m| m.seq > after_seq)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}
