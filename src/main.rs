//! # LockIn CLI (`lockin`)
//!
//! Post messages and images into the chat log, inspect what has been
//! shared, and run the HTTP API.
//!
//! ## Usage
//!
//! ```bash
//! lockin --config ./config/lockin.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lockin init` | Create the SQLite database and run schema migrations |
//! | `lockin post --user <u> "<text>"` | Post a message; prints notices and any resurfacing |
//! | `lockin upload --user <u> <path>` | Upload an image file |
//! | `lockin shared` | List shared links and images |
//! | `lockin messages` | Print the chat log |
//! | `lockin serve` | Start the HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! lockin post --user ava "launch deck: https://example.com/launch?utm_source=x"
//! lockin post --user milo "https://example.com/launch/"
//! lockin shared --sort shared --limit 5
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use lockin::{commands, config, migrate, server};

/// LockIn: group-chat link and image deduplication with automatic
/// resurfacing of earlier shares.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/lockin.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "lockin",
    about = "LockIn: deduplicate shared links and images and resurface earlier shares",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/lockin.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Post a chat message as a user.
    ///
    /// Links in the text are deduplicated; a repeat share prints a notice,
    /// and a related earlier share may be resurfaced by the bot.
    Post {
        /// Author of the message.
        #[arg(long)]
        user: String,

        /// Message text.
        text: String,
    },

    /// Upload an image file as a user.
    Upload {
        #[arg(long)]
        user: String,

        /// Optional caption, used as the message text.
        #[arg(long)]
        caption: Option<String>,

        /// Path to the image file.
        path: PathBuf,
    },

    /// List shared items.
    Shared {
        /// Only `link` or `image` items.
        #[arg(long = "type")]
        kind: Option<String>,

        /// `recent` (last shared first) or `shared` (most shared first).
        #[arg(long, default_value = "recent")]
        sort: String,

        #[arg(long, default_value_t = 20)]
        limit: i64,
    },

    /// Print chat messages after a sequence cursor.
    Messages {
        #[arg(long, default_value_t = 0)]
        after: i64,

        #[arg(long, default_value_t = 100)]
        limit: i64,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("lockin=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::init_database(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Post { user, text } => {
            commands::run_post(&cfg, &user, &text).await?;
        }
        Commands::Upload {
            user,
            caption,
            path,
        } => {
            commands::run_upload(&cfg, &user, &path, caption).await?;
        }
        Commands::Shared { kind, sort, limit } => {
            commands::run_shared(&cfg, kind.as_deref(), &sort, limit).await?;
        }
        Commands::Messages { after, limit } => {
            commands::run_messages(&cfg, after, limit).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
