//! Core data models used throughout LockIn.
//!
//! These types represent shared items (deduplicated links and images) and
//! chat messages as they flow between the engine and its stores. JSON field
//! names are camelCase to match the chat client's API contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What kind of content a [`SharedItem`] refers to. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Link,
    Image,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Link => "link",
            ItemKind::Image => "image",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "link" => Ok(ItemKind::Link),
            "image" => Ok(ItemKind::Image),
            other => Err(format!("unknown item type: '{}'. Use link or image.", other)),
        }
    }
}

/// Ordering for [`list_recent`](crate::store::SharedItemStore::list_recent).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Most recently shared first.
    Recency,
    /// Highest share count first.
    Popularity,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "recent" | "recency" => Ok(SortOrder::Recency),
            "shared" | "popular" | "popularity" => Ok(SortOrder::Popularity),
            other => Err(format!("unknown sort: '{}'. Use recent or shared.", other)),
        }
    }
}

/// A deduplicated reference to one piece of shared content.
///
/// Exactly one of `url` / `image_path` is populated, matching `kind`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedItem {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    pub canonical_key: String,
    pub url: Option<String>,
    pub image_path: Option<String>,
    pub title: Option<String>,
    pub shared_by: Option<String>,
    pub keywords: Vec<String>,
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
    pub share_count: i64,
    pub reference_count: i64,
    pub first_shared_at: DateTime<Utc>,
    pub last_shared_at: DateTime<Utc>,
}

impl SharedItem {
    /// Human-readable label used in bot messages.
    pub fn display_label(&self) -> &str {
        self.title
            .as_deref()
            .or(self.url.as_deref())
            .or(self.image_path.as_deref())
            .unwrap_or("Shared item")
    }
}

/// Fields for creating a [`SharedItem`]. Counters and timestamps are
/// assigned by the store.
#[derive(Debug, Clone)]
pub struct NewSharedItem {
    pub kind: ItemKind,
    pub canonical_key: String,
    pub url: Option<String>,
    pub image_path: Option<String>,
    pub title: Option<String>,
    pub shared_by: Option<String>,
    pub keywords: Vec<String>,
    pub embedding: Option<Vec<f32>>,
}

impl NewSharedItem {
    pub fn link(canonical_url: impl Into<String>, keywords: Vec<String>) -> Self {
        let url = canonical_url.into();
        Self {
            kind: ItemKind::Link,
            canonical_key: url.clone(),
            url: Some(url),
            image_path: None,
            title: None,
            shared_by: None,
            keywords,
            embedding: None,
        }
    }

    pub fn image(
        content_hash: impl Into<String>,
        image_path: impl Into<String>,
        keywords: Vec<String>,
    ) -> Self {
        Self {
            kind: ItemKind::Image,
            canonical_key: content_hash.into(),
            url: None,
            image_path: Some(image_path.into()),
            title: None,
            shared_by: None,
            keywords,
            embedding: None,
        }
    }

    pub fn with_shared_by(mut self, who: impl Into<String>) -> Self {
        self.shared_by = Some(who.into());
        self
    }

    pub fn with_embedding(mut self, embedding: Option<Vec<f32>>) -> Self {
        self.embedding = embedding;
        self
    }

    /// Materialize the record as the store would on first observation.
    pub fn into_item(self, id: String, now: DateTime<Utc>) -> SharedItem {
        SharedItem {
            id,
            kind: self.kind,
            canonical_key: self.canonical_key,
            url: self.url,
            image_path: self.image_path,
            title: self.title,
            shared_by: self.shared_by,
            keywords: self.keywords,
            embedding: self.embedding,
            share_count: 1,
            reference_count: 0,
            first_shared_at: now,
            last_shared_at: now,
        }
    }
}

/// A chat message in the append-only log.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    /// Position in the log; strictly increasing, used as a `list_since` cursor.
    pub seq: i64,
    pub author: String,
    pub text: String,
    pub is_bot: bool,
    pub created_at: DateTime<Utc>,
    pub shared_item_id: Option<String>,
}

/// Fields for appending a [`ChatMessage`].
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub author: String,
    pub text: String,
    pub is_bot: bool,
    pub shared_item_id: Option<String>,
}

impl NewMessage {
    pub fn user(author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            text: text.into(),
            is_bot: false,
            shared_item_id: None,
        }
    }

    pub fn bot(author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            text: text.into(),
            is_bot: true,
            shared_item_id: None,
        }
    }

    pub fn referencing(mut self, item_id: Option<String>) -> Self {
        self.shared_item_id = item_id;
        self
    }
}
