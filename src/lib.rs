//! # LockIn
//!
//! A group-chat backend that deduplicates the links and images people
//! share and has a bot resurface an earlier share when a new message looks
//! related to it.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌─────────────┐
//! │  message   │──▶│ canonicalize │──▶│ find-or-    │──▶ repeat notice
//! │  / upload  │   │  + keywords  │   │ create      │
//! └────────────┘   └──────────────┘   └──────┬──────┘
//!                                            ▼
//!                  ┌──────────────┐   ┌─────────────┐
//!                  │  embedding   │──▶│ resurfacing │──▶ bot message
//!                  │  (optional)  │   │  selector   │
//!                  └──────────────┘   └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! lockin init
//! lockin post --user ava "https://example.com/launch?utm_source=x"
//! lockin post --user milo "what's the product launch link"
//! lockin serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Shared items and chat messages |
//! | [`canonical`] | URL normalization and content hashing |
//! | [`keywords`] | Keyword extraction |
//! | [`embedding`] | Optional embedding gateway and cosine similarity |
//! | [`scoring`] | Semantic and keyword scorers |
//! | [`resurface`] | Top-match selection and bot resurfacing |
//! | [`dedup`] | First-share vs repeat detection |
//! | [`engine`] | The per-request pipeline |
//! | [`store`] | Store traits, SQLite and in-memory implementations |
//! | [`blob`] | Image file storage |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod blob;
pub mod canonical;
pub mod commands;
pub mod config;
pub mod db;
pub mod dedup;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod keywords;
pub mod migrate;
pub mod models;
pub mod resurface;
pub mod scoring;
pub mod server;
pub mod store;
