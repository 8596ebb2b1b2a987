//! The chat pipeline.
//!
//! [`ChatEngine`] owns the collaborators (stores, blob storage, embedding
//! gateway) and runs one request sequentially:
//!
//! ```text
//! post_message:  extract URLs → canonicalize → find-or-create → append
//!                message → repeat notices → resurfacing scan
//! upload_image:  hash bytes → find-or-create (blob written on create)
//!                → append message → repeat notice
//! ```
//!
//! Requests run in parallel; the store's unique canonical key settles
//! creation races.

use chrono::Utc;
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::blob::{extension_of, BlobStore, FsBlobStore};
use crate::canonical::{extract_urls, hash_content, normalize_url};
use crate::config::{Config, ResurfaceConfig};
use crate::db;
use crate::dedup::{find_or_create, DedupOutcome};
use crate::embedding::{build_embed_input, EmbeddingGateway};
use crate::error::{EngineError, StoreError};
use crate::keywords::{extract_keywords, keywords_from_url};
use crate::migrate;
use crate::models::{ChatMessage, ItemKind, NewMessage, NewSharedItem, SharedItem, SortOrder};
use crate::resurface::{self, Evaluation};
use crate::store::{MessageStore, SharedItemStore, SqliteStore};

const DEFAULT_AUTHOR: &str = "Anonymous";
const IMAGE_MESSAGE_TEXT: &str = "shared an image";

/// Result of posting one chat message.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostOutcome {
    pub message: ChatMessage,
    /// One "already shared" bot message per repeated link.
    pub notices: Vec<ChatMessage>,
    pub bot_message: Option<ChatMessage>,
    #[serde(skip)]
    pub shares: Vec<DedupOutcome>,
    #[serde(skip)]
    pub evaluation: Evaluation,
}

/// Result of uploading one image.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOutcome {
    pub shared_item: SharedItem,
    pub message: ChatMessage,
    pub notice: Option<ChatMessage>,
}

/// An image as received from a client.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub author: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub caption: Option<String>,
}

pub struct ChatEngine {
    items: Arc<dyn SharedItemStore>,
    messages: Arc<dyn MessageStore>,
    blobs: Arc<dyn BlobStore>,
    gateway: EmbeddingGateway,
    resurface: ResurfaceConfig,
    bot_name: String,
}

impl ChatEngine {
    pub fn new(
        items: Arc<dyn SharedItemStore>,
        messages: Arc<dyn MessageStore>,
        blobs: Arc<dyn BlobStore>,
        gateway: EmbeddingGateway,
        resurface: ResurfaceConfig,
        bot_name: impl Into<String>,
    ) -> Self {
        Self {
            items,
            messages,
            blobs,
            gateway,
            resurface,
            bot_name: bot_name.into(),
        }
    }

    /// Open the SQLite database (migrating it) and wire every collaborator
    /// from configuration.
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        let pool = db::connect(config).await?;
        migrate::run_migrations(&pool).await?;
        let store = Arc::new(SqliteStore::new(pool));

        let gateway = EmbeddingGateway::from_config(&config.embedding);
        info!(
            db = %config.db.path.display(),
            embeddings = gateway.is_enabled(),
            "chat engine ready"
        );

        Ok(Self::new(
            store.clone(),
            store,
            Arc::new(FsBlobStore::new(
                config.uploads.dir.clone(),
                config.uploads.public_prefix.as_str(),
            )),
            gateway,
            config.resurface.clone(),
            config.bot.name.as_str(),
        ))
    }

    pub fn bot_name(&self) -> &str {
        &self.bot_name
    }

    /// Post a user message: record every link it shares, announce repeats,
    /// then try to resurface one earlier share.
    pub async fn post_message(&self, author: &str, text: &str) -> Result<PostOutcome, EngineError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EngineError::InvalidInput("Message is required".into()));
        }
        let author = author_or_default(author);
        let now = Utc::now();

        let mut seen = HashSet::new();
        let mut shares = Vec::new();
        for raw in extract_urls(text) {
            let key = normalize_url(&raw);
            if key.is_empty() || !seen.insert(key.clone()) {
                continue;
            }
            let outcome = find_or_create(self.items.as_ref(), &key, author, now, || {
                self.fingerprint_link(&key, author, text)
            })
            .await?;
            shares.push(outcome);
        }

        // Read-only, so a failed candidate scan leaves the log untouched.
        let exclude: Vec<String> = shares.iter().map(|s| s.item().id.clone()).collect();
        let evaluation = resurface::evaluate(
            self.items.as_ref(),
            &self.gateway,
            &self.resurface,
            text,
            &exclude,
            now,
        )
        .await?;

        let first_item = shares.first().map(|s| s.item().id.clone());
        let message = self
            .messages
            .append(NewMessage::user(author, text).referencing(first_item), now)
            .await?;

        let mut notices = Vec::new();
        for share in &shares {
            if let Some(notice) = share.notice() {
                let posted = self
                    .messages
                    .append(
                        NewMessage::bot(&self.bot_name, notice.text())
                            .referencing(Some(share.item().id.clone())),
                        now,
                    )
                    .await?;
                notices.push(posted);
            }
        }

        let bot_message = resurface::apply(
            self.items.as_ref(),
            self.messages.as_ref(),
            &self.bot_name,
            &evaluation.selection,
            now,
        )
        .await?;

        debug!(
            msg = %message.id,
            links = shares.len(),
            notices = notices.len(),
            resurfaced = bot_message.is_some(),
            "message processed"
        );

        Ok(PostOutcome {
            message,
            notices,
            bot_message,
            shares,
            evaluation,
        })
    }

    async fn fingerprint_link(
        &self,
        url: &str,
        author: &str,
        message_text: &str,
    ) -> Result<NewSharedItem, EngineError> {
        let keywords = keywords_from_url(url);
        let embedding = if self.gateway.is_enabled() {
            let input = build_embed_input(Some(url), None, &keywords, None, Some(message_text));
            self.gateway.embed(&input).await
        } else {
            None
        };

        Ok(NewSharedItem::link(url, keywords)
            .with_shared_by(author)
            .with_embedding(embedding))
    }

    /// Upload an image. Identical bytes resolve to the same shared item;
    /// the file is only written when the item is first created.
    pub async fn upload_image(&self, upload: ImageUpload) -> Result<UploadOutcome, EngineError> {
        if upload.bytes.is_empty() {
            return Err(EngineError::InvalidInput("File required".into()));
        }
        let author = author_or_default(&upload.author);
        let caption = upload
            .caption
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());
        let hash = hash_content(&upload.bytes);
        let now = Utc::now();

        let outcome = find_or_create(self.items.as_ref(), &hash, author, now, || {
            self.fingerprint_image(&hash, &upload.file_name, &upload.bytes, author, caption)
        })
        .await?;

        let text = caption.unwrap_or(IMAGE_MESSAGE_TEXT);
        let message = self
            .messages
            .append(
                NewMessage::user(author, text).referencing(Some(outcome.item().id.clone())),
                now,
            )
            .await?;

        let notice = match outcome.notice() {
            Some(notice) => Some(
                self.messages
                    .append(
                        NewMessage::bot(&self.bot_name, notice.text())
                            .referencing(Some(outcome.item().id.clone())),
                        now,
                    )
                    .await?,
            ),
            None => None,
        };

        let shared_item = match outcome {
            DedupOutcome::Created(item) => item,
            DedupOutcome::Repeat { item, .. } => item,
        };
        Ok(UploadOutcome {
            shared_item,
            message,
            notice,
        })
    }

    async fn fingerprint_image(
        &self,
        hash: &str,
        file_name: &str,
        bytes: &[u8],
        author: &str,
        caption: Option<&str>,
    ) -> Result<NewSharedItem, EngineError> {
        let locator = self.blobs.put(hash, &extension_of(file_name), bytes).await?;
        let keywords = image_keywords(file_name, caption);

        let embedding = if self.gateway.is_enabled() {
            let input = build_embed_input(None, None, &keywords, Some(file_name), caption);
            self.gateway.embed(&input).await
        } else {
            None
        };

        Ok(NewSharedItem::image(hash, locator, keywords)
            .with_shared_by(author)
            .with_embedding(embedding))
    }

    pub async fn list_messages(
        &self,
        after_seq: i64,
        limit: i64,
    ) -> Result<Vec<ChatMessage>, EngineError> {
        Ok(self.messages.list_since(after_seq, limit).await?)
    }

    pub async fn list_shared(
        &self,
        kind: Option<ItemKind>,
        sort: SortOrder,
        limit: i64,
    ) -> Result<Vec<SharedItem>, EngineError> {
        Ok(self.items.list_recent(kind, sort, limit).await?)
    }

    pub async fn get_shared(&self, id: &str) -> Result<SharedItem, EngineError> {
        self.items
            .get(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()).into())
    }
}

fn author_or_default(author: &str) -> &str {
    let trimmed = author.trim();
    if trimmed.is_empty() {
        DEFAULT_AUTHOR
    } else {
        trimmed
    }
}

/// `image`, `upload`, then tokens from the file stem and caption.
pub fn image_keywords(file_name: &str, caption: Option<&str>) -> Vec<String> {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();

    let mut keywords = vec!["image".to_string(), "upload".to_string()];
    let extra = extract_keywords(stem)
        .into_iter()
        .chain(caption.map(extract_keywords).unwrap_or_default());
    for word in extra {
        if !keywords.contains(&word) {
            keywords.push(word);
        }
    }
    keywords
}
