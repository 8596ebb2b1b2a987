use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Create the database file (if needed) and apply the schema.
pub async fn init_database(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    run_migrations(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Apply the schema. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // canonical_key UNIQUE is the sole arbiter of find-or-create races
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS shared_items (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL CHECK (kind IN ('link', 'image')),
            canonical_key TEXT NOT NULL UNIQUE,
            url TEXT,
            image_path TEXT,
            title TEXT,
            shared_by TEXT,
            keywords_json TEXT NOT NULL DEFAULT '[]',
            embedding BLOB,
            share_count INTEGER NOT NULL DEFAULT 1,
            reference_count INTEGER NOT NULL DEFAULT 0,
            first_shared_at INTEGER NOT NULL,
            last_shared_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            author TEXT NOT NULL,
            text TEXT NOT NULL,
            is_bot INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            shared_item_id TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_shared_items_last_shared ON shared_items(last_shared_at DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_shared_items_share_count ON shared_items(share_count DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_messages_shared_item ON messages(shared_item_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
