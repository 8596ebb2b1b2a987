//! TOML configuration.
//!
//! The configuration is read once at startup by [`load_config`]. The
//! embedding credential is resolved from `OPENAI_API_KEY` at the same time
//! and carried inside [`EmbeddingConfig`], so nothing downstream consults the
//! process environment.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub uploads: UploadsConfig,
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub resurface: ResurfaceConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadsConfig {
    #[serde(default = "default_upload_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_public_prefix")]
    pub public_prefix: String,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            dir: default_upload_dir(),
            public_prefix: default_public_prefix(),
        }
    }
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("./public/uploads")
}
fn default_public_prefix() -> String {
    "/uploads".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct BotConfig {
    #[serde(default = "default_bot_name")]
    pub name: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: default_bot_name(),
        }
    }
}

fn default_bot_name() -> String {
    "LockIn Bot".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
    /// Bearer credential. Never read from the file; filled from
    /// `OPENAI_API_KEY` by [`load_config`].
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            endpoint: default_endpoint(),
            timeout_secs: default_timeout_secs(),
            max_input_chars: default_max_input_chars(),
            api_key: None,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_endpoint() -> String {
    "https://api.openai.com/v1/embeddings".to_string()
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_max_input_chars() -> usize {
    8000
}

impl EmbeddingConfig {
    /// True when a provider is selected and its credential is present.
    pub fn is_enabled(&self) -> bool {
        self.provider == "openai" && self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResurfaceConfig {
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: i64,
    #[serde(default = "default_semantic_threshold")]
    pub semantic_threshold: f64,
    #[serde(default = "default_fallback_threshold")]
    pub fallback_threshold: f64,
    #[serde(default = "default_trigger_semantic_threshold")]
    pub trigger_semantic_threshold: f64,
    #[serde(default = "default_trigger_fallback_threshold")]
    pub trigger_fallback_threshold: f64,
    #[serde(default = "default_trigger_phrases")]
    pub trigger_phrases: Vec<String>,
}

impl Default for ResurfaceConfig {
    fn default() -> Self {
        Self {
            candidate_limit: default_candidate_limit(),
            semantic_threshold: default_semantic_threshold(),
            fallback_threshold: default_fallback_threshold(),
            trigger_semantic_threshold: default_trigger_semantic_threshold(),
            trigger_fallback_threshold: default_trigger_fallback_threshold(),
            trigger_phrases: default_trigger_phrases(),
        }
    }
}

fn default_candidate_limit() -> i64 {
    50
}
fn default_semantic_threshold() -> f64 {
    0.75
}
fn default_fallback_threshold() -> f64 {
    4.0
}
fn default_trigger_semantic_threshold() -> f64 {
    0.6
}
fn default_trigger_fallback_threshold() -> f64 {
    2.0
}
fn default_trigger_phrases() -> Vec<String> {
    ["that link", "send link", "what was the", "the screenshot"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Config {
    /// A config with every optional section at its default, pointing at
    /// the given database file.
    pub fn with_db_path(path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig { path: path.into() },
            server: ServerConfig::default(),
            uploads: UploadsConfig::default(),
            bot: BotConfig::default(),
            embedding: EmbeddingConfig::default(),
            resurface: ResurfaceConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    config.embedding.api_key = std::env::var("OPENAI_API_KEY").ok();
    validate(&mut config)?;

    Ok(config)
}

fn validate(config: &mut Config) -> Result<()> {
    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if config.embedding.max_input_chars == 0 {
        anyhow::bail!("embedding.max_input_chars must be > 0");
    }

    let r = &mut config.resurface;
    if r.candidate_limit < 1 {
        anyhow::bail!("resurface.candidate_limit must be >= 1");
    }
    for (name, value) in [
        ("semantic_threshold", r.semantic_threshold),
        ("trigger_semantic_threshold", r.trigger_semantic_threshold),
    ] {
        if !(-1.0..=1.0).contains(&value) {
            anyhow::bail!("resurface.{} must be in [-1.0, 1.0]", name);
        }
    }
    if r.trigger_semantic_threshold > r.semantic_threshold {
        anyhow::bail!("resurface.trigger_semantic_threshold must be <= semantic_threshold");
    }
    if r.trigger_fallback_threshold > r.fallback_threshold {
        anyhow::bail!("resurface.trigger_fallback_threshold must be <= fallback_threshold");
    }

    // Phrase matching is case-insensitive
    r.trigger_phrases = r
        .trigger_phrases
        .iter()
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let mut config: Config = toml::from_str(toml_src)?;
        validate(&mut config)?;
        Ok(config)
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse("[db]\npath = \"/tmp/x.sqlite\"\n").unwrap();
        assert_eq!(config.resurface.candidate_limit, 50);
        assert_eq!(config.resurface.fallback_threshold, 4.0);
        assert_eq!(config.resurface.semantic_threshold, 0.75);
        assert_eq!(config.embedding.max_input_chars, 8000);
        assert_eq!(config.bot.name, "LockIn Bot");
        assert!(!config.embedding.is_enabled());
    }

    #[test]
    fn test_openai_without_key_is_disabled() {
        let config = parse("[db]\npath = \"x\"\n[embedding]\nprovider = \"openai\"\n").unwrap();
        assert!(!config.embedding.is_enabled());

        let mut with_key = config.embedding.clone();
        with_key.api_key = Some("sk-test".to_string());
        assert!(with_key.is_enabled());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let err = parse("[db]\npath = \"x\"\n[embedding]\nprovider = \"magic\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn test_trigger_threshold_above_base_rejected() {
        let src = "[db]\npath = \"x\"\n[resurface]\nfallback_threshold = 4.0\ntrigger_fallback_threshold = 5.0\n";
        assert!(parse(src).is_err());
    }

    #[test]
    fn test_trigger_phrases_lowercased() {
        let src = "[db]\npath = \"x\"\n[resurface]\ntrigger_phrases = [\"That Link\", \"  \"]\n";
        let config = parse(src).unwrap();
        assert_eq!(config.resurface.trigger_phrases, vec!["that link".to_string()]);
    }
}
