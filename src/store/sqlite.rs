//! SQLite-backed store.
//!
//! Maps each trait operation to one statement against the `shared_items`
//! and `messages` tables created by [`crate::migrate`]. Keywords are stored
//! as a JSON array of strings and embeddings as little-endian `f32` BLOBs.
//! Timestamps are Unix milliseconds.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::warn;
use uuid::Uuid;

use super::{MessageStore, SharedItemStore};
use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::StoreError;
use crate::models::{ChatMessage, ItemKind, NewMessage, NewSharedItem, SharedItem, SortOrder};

const ITEM_COLUMNS: &str = "id, kind, canonical_key, url, image_path, title, shared_by, \
     keywords_json, embedding, share_count, reference_count, first_shared_at, last_shared_at";

const MESSAGE_COLUMNS: &str = "seq, id, author, text, is_bot, created_at, shared_item_id";

/// SQLite implementation of [`SharedItemStore`] and [`MessageStore`].
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn ts_from_millis(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp out of range: {}", ms)))
}

fn row_to_item(row: &SqliteRow) -> Result<SharedItem, StoreError> {
    let id: String = row.try_get("id")?;
    let kind: String = row.try_get("kind")?;
    let kind = kind
        .parse::<ItemKind>()
        .map_err(|e| StoreError::Corrupt(format!("{}: {}", id, e)))?;

    let keywords_json: String = row.try_get("keywords_json")?;
    let keywords: Vec<String> = serde_json::from_str(&keywords_json).unwrap_or_else(|e| {
        warn!(item = %id, error = %e, "unreadable keywords, treating as empty");
        Vec::new()
    });

    let embedding: Option<Vec<u8>> = row.try_get("embedding")?;
    let embedding = embedding.and_then(|blob| {
        let decoded = blob_to_vec(&blob);
        if decoded.is_none() {
            warn!(item = %id, bytes = blob.len(), "malformed embedding blob ignored");
        }
        decoded
    });

    Ok(SharedItem {
        kind,
        canonical_key: row.try_get("canonical_key")?,
        url: row.try_get("url")?,
        image_path: row.try_get("image_path")?,
        title: row.try_get("title")?,
        shared_by: row.try_get("shared_by")?,
        keywords,
        embedding,
        share_count: row.try_get("share_count")?,
        reference_count: row.try_get("reference_count")?,
        first_shared_at: ts_from_millis(row.try_get("first_shared_at")?)?,
        last_shared_at: ts_from_millis(row.try_get("last_shared_at")?)?,
        id,
    })
}

fn row_to_message(row: &SqliteRow) -> Result<ChatMessage, StoreError> {
    Ok(ChatMessage {
        seq: row.try_get("seq")?,
        id: row.try_get("id")?,
        author: row.try_get("author")?,
        text: row.try_get("text")?,
        is_bot: row.try_get("is_bot")?,
        created_at: ts_from_millis(row.try_get("created_at")?)?,
        shared_item_id: row.try_get("shared_item_id")?,
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

#[async_trait]
impl SharedItemStore for SqliteStore {
    async fn find_by_canonical_key(&self, key: &str) -> Result<Option<SharedItem>, StoreError> {
        let sql = format!(
            "SELECT {} FROM shared_items WHERE canonical_key = ?",
            ITEM_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_item).transpose()
    }

    async fn get(&self, id: &str) -> Result<Option<SharedItem>, StoreError> {
        let sql = format!("SELECT {} FROM shared_items WHERE id = ?", ITEM_COLUMNS);
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(row_to_item).transpose()
    }

    async fn create(
        &self,
        item: NewSharedItem,
        now: DateTime<Utc>,
    ) -> Result<SharedItem, StoreError> {
        let id = Uuid::new_v4().to_string();
        let keywords_json = serde_json::to_string(&item.keywords)
            .map_err(|e| StoreError::Corrupt(format!("keywords not serializable: {}", e)))?;
        let blob = item.embedding.as_deref().map(vec_to_blob);
        let ts = now.timestamp_millis();

        let result = sqlx::query(
            r#"
            INSERT INTO shared_items (id, kind, canonical_key, url, image_path, title, shared_by,
                                      keywords_json, embedding, share_count, reference_count,
                                      first_shared_at, last_shared_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 1, 0, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(item.kind.as_str())
        .bind(&item.canonical_key)
        .bind(&item.url)
        .bind(&item.image_path)
        .bind(&item.title)
        .bind(&item.shared_by)
        .bind(&keywords_json)
        .bind(&blob)
        .bind(ts)
        .bind(ts)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(StoreError::Conflict(item.canonical_key));
            }
            Err(e) => return Err(e.into()),
        }

        // Millisecond precision is what a re-read would return
        let stored_now = ts_from_millis(ts)?;
        Ok(item.into_item(id, stored_now))
    }

    async fn record_share(&self, id: &str, at: DateTime<Utc>) -> Result<SharedItem, StoreError> {
        let sql = format!(
            "UPDATE shared_items SET share_count = share_count + 1, last_shared_at = ? \
             WHERE id = ? RETURNING {}",
            ITEM_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(at.timestamp_millis())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => row_to_item(&row),
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    async fn increment_reference_count(&self, id: &str) -> Result<SharedItem, StoreError> {
        let sql = format!(
            "UPDATE shared_items SET reference_count = reference_count + 1 \
             WHERE id = ? RETURNING {}",
            ITEM_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => row_to_item(&row),
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    async fn list_recent(
        &self,
        kind: Option<ItemKind>,
        sort: SortOrder,
        limit: i64,
    ) -> Result<Vec<SharedItem>, StoreError> {
        let order_by = match sort {
            SortOrder::Recency => "last_shared_at DESC, rowid DESC",
            SortOrder::Popularity => "share_count DESC, last_shared_at DESC, rowid DESC",
        };
        let sql = format!(
            "SELECT {} FROM shared_items WHERE (? IS NULL OR kind = ?) ORDER BY {} LIMIT ?",
            ITEM_COLUMNS, order_by
        );
        let kind_str = kind.map(|k| k.as_str());

        let rows = sqlx::query(&sql)
            .bind(kind_str)
            .bind(kind_str)
            .bind(limit.max(0))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_item).collect()
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn append(
        &self,
        message: NewMessage,
        at: DateTime<Utc>,
    ) -> Result<ChatMessage, StoreError> {
        let id = Uuid::new_v4().to_string();
        let sql = format!(
            "INSERT INTO messages (id, author, text, is_bot, created_at, shared_item_id) \
             VALUES (?, ?, ?, ?, ?, ?) RETURNING {}",
            MESSAGE_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(&id)
            .bind(&message.author)
            .bind(&message.text)
            .bind(message.is_bot)
            .bind(at.timestamp_millis())
            .bind(&message.shared_item_id)
            .fetch_one(&self.pool)
            .await?;
        row_to_message(&row)
    }

    async fn list_since(&self, after_seq: i64, limit: i64) -> Result<Vec<ChatMessage>, StoreError> {
        let sql = format!(
            "SELECT {} FROM messages WHERE seq > ? ORDER BY seq ASC LIMIT ?",
            MESSAGE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(after_seq)
            .bind(limit.max(0))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_message).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate;
    use chrono::Duration;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_store() -> SqliteStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        migrate::run_migrations(&pool).await.unwrap();
        SqliteStore::new(pool)
    }

    #[tokio::test]
    async fn test_create_and_find_roundtrip() {
        let store = memory_store().await;
        let now = Utc::now();
        let created = store
            .create(
                NewSharedItem::link("https://x.com/a", vec!["x".into(), "com".into()])
                    .with_shared_by("ava")
                    .with_embedding(Some(vec![0.25, -1.5, 3.0])),
                now,
            )
            .await
            .unwrap();

        let found = store
            .find_by_canonical_key("https://x.com/a")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found, created);
        assert_eq!(found.embedding, Some(vec![0.25, -1.5, 3.0]));
        assert_eq!(found.keywords, vec!["x", "com"]);
        assert_eq!(found.share_count, 1);
        assert_eq!(found.reference_count, 0);
        assert_eq!(found.shared_by.as_deref(), Some("ava"));

        assert_eq!(store.get(&created.id).await.unwrap(), Some(created));
        assert_eq!(store.find_by_canonical_key("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unique_key_conflict() {
        let store = memory_store().await;
        let now = Utc::now();
        store
            .create(NewSharedItem::image("abc", "/uploads/abc.png", vec![]), now)
            .await
            .unwrap();
        let err = store
            .create(NewSharedItem::image("abc", "/uploads/abc.jpg", vec![]), now)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_atomic_increments() {
        let store = memory_store().await;
        let now = Utc::now();
        let item = store
            .create(NewSharedItem::link("https://x.com", vec![]), now)
            .await
            .unwrap();
        let later = now + Duration::minutes(5);
        let updated = store.record_share(&item.id, later).await.unwrap();
        assert_eq!(updated.share_count, 2);
        assert_eq!(updated.last_shared_at.timestamp_millis(), later.timestamp_millis());
        assert_eq!(updated.first_shared_at, item.first_shared_at);

        let referenced = store.increment_reference_count(&item.id).await.unwrap();
        assert_eq!(referenced.reference_count, 1);
        assert_eq!(referenced.share_count, 2);

        assert!(matches!(
            store.increment_reference_count("missing").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_malformed_embedding_reads_as_none() {
        let store = memory_store().await;
        let item = store
            .create(NewSharedItem::link("https://x.com", vec![]), Utc::now())
            .await
            .unwrap();
        sqlx::query("UPDATE shared_items SET embedding = ? WHERE id = ?")
            .bind(vec![1u8, 2, 3])
            .bind(&item.id)
            .execute(store.pool())
            .await
            .unwrap();
        let read = store.get(&item.id).await.unwrap().unwrap();
        assert_eq!(read.embedding, None);
    }

    #[tokio::test]
    async fn test_list_recent_sort_and_filter() {
        let store = memory_store().await;
        let now = Utc::now();
        let old = store
            .create(NewSharedItem::link("https://old.com", vec![]), now - Duration::days(3))
            .await
            .unwrap();
        let fresh = store
            .create(NewSharedItem::image("h1", "/uploads/h1.png", vec![]), now)
            .await
            .unwrap();
        store.record_share(&old.id, now - Duration::days(2)).await.unwrap();

        let recent = store.list_recent(None, SortOrder::Recency, 50).await.unwrap();
        assert_eq!(
            recent.iter().map(|i| i.id.as_str()).collect::<Vec<_>>(),
            vec![fresh.id.as_str(), old.id.as_str()]
        );

        let popular = store.list_recent(None, SortOrder::Popularity, 50).await.unwrap();
        assert_eq!(popular[0].id, old.id);

        let links = store
            .list_recent(Some(ItemKind::Link), SortOrder::Recency, 50)
            .await
            .unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].kind, ItemKind::Link);

        assert_eq!(store.list_recent(None, SortOrder::Recency, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_message_log() {
        let store = memory_store().await;
        let now = Utc::now();
        let first = store.append(NewMessage::user("ava", "hello"), now).await.unwrap();
        let second = store
            .append(
                NewMessage::bot("LockIn Bot", "Resurfacing: x").referencing(Some("item".into())),
                now,
            )
            .await
            .unwrap();
        assert!(second.seq > first.seq);
        assert!(second.is_bot);
        assert_eq!(second.shared_item_id.as_deref(), Some("item"));

        let since = store.list_since(first.seq, 10).await.unwrap();
        assert_eq!(since.len(), 1);
        assert_eq!(since[0].id, second.id);
    }
}
