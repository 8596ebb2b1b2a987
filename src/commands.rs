//! CLI entry points. Each opens the engine from configuration, runs one
//! operation and prints the result to stdout.

use anyhow::{Context, Result};
use std::path::Path;

use crate::config::Config;
use crate::engine::{ChatEngine, ImageUpload};
use crate::models::{ChatMessage, ItemKind, SharedItem, SortOrder};

pub async fn run_post(config: &Config, user: &str, text: &str) -> Result<()> {
    let engine = ChatEngine::open(config).await?;
    let outcome = engine.post_message(user, text).await?;

    print_message(&outcome.message);
    for notice in &outcome.notices {
        print_message(notice);
    }
    if let Some(ref bot) = outcome.bot_message {
        print_message(bot);
    }
    Ok(())
}

pub async fn run_upload(
    config: &Config,
    user: &str,
    path: &Path,
    caption: Option<String>,
) -> Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let engine = ChatEngine::open(config).await?;
    let outcome = engine
        .upload_image(ImageUpload {
            author: user.to_string(),
            file_name,
            bytes,
            caption,
        })
        .await?;

    print_message(&outcome.message);
    if let Some(ref notice) = outcome.notice {
        print_message(notice);
    }
    println!();
    print_item(&outcome.shared_item);
    Ok(())
}

pub async fn run_shared(
    config: &Config,
    kind: Option<&str>,
    sort: &str,
    limit: i64,
) -> Result<()> {
    let kind = kind
        .map(str::parse::<ItemKind>)
        .transpose()
        .map_err(anyhow::Error::msg)?;
    let sort: SortOrder = sort.parse().map_err(anyhow::Error::msg)?;

    let engine = ChatEngine::open(config).await?;
    let items = engine.list_shared(kind, sort, limit).await?;

    if items.is_empty() {
        println!("No shared items.");
        return Ok(());
    }
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            println!();
        }
        print_item(item);
    }
    Ok(())
}

pub async fn run_messages(config: &Config, after: i64, limit: i64) -> Result<()> {
    let engine = ChatEngine::open(config).await?;
    let messages = engine.list_messages(after, limit).await?;

    if messages.is_empty() {
        println!("No messages.");
        return Ok(());
    }
    for message in &messages {
        print_message(message);
    }
    Ok(())
}

fn print_message(message: &ChatMessage) {
    let tag = if message.is_bot { " [bot]" } else { "" };
    println!(
        "#{} {}{}: {}",
        message.seq, message.author, tag, message.text
    );
}

fn print_item(item: &SharedItem) {
    println!("{} [{}] {}", item.id, item.kind, item.display_label());
    println!(
        "  shares: {}  references: {}  last shared: {}",
        item.share_count,
        item.reference_count,
        item.last_shared_at.format("%Y-%m-%d %H:%M")
    );
    if let Some(ref who) = item.shared_by {
        println!("  first shared by: {}", who);
    }
    if !item.keywords.is_empty() {
        println!("  keywords: {}", item.keywords.join(", "));
    }
}
