//! Embedding gateway and vector utilities.
//!
//! The [`EmbeddingGateway`] wraps an optional [`EmbeddingProvider`]. It is
//! built once from [`EmbeddingConfig`] and never fails loudly: a missing
//! credential, transport error, timeout, non-success status or malformed
//! response all come back as `None`, which callers treat as "score with the
//! keyword heuristic instead".
//!
//! Also provides:
//! - [`cosine_similarity`]: similarity between two vectors
//! - [`build_embed_input`]: the canonical text an item is embedded from
//! - [`vec_to_blob`] / [`blob_to_vec`]: little-endian `f32` BLOB codec for SQLite
//!
//! # Provider Selection
//!
//! ```rust
//! # use lockin::config::EmbeddingConfig;
//! # use lockin::embedding::EmbeddingGateway;
//! let gateway = EmbeddingGateway::from_config(&EmbeddingConfig::default());
//! assert!(!gateway.is_enabled());
//! ```

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::EmbeddingConfig;

/// A text-to-vector backend.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Embed one text. Errors are reported to the gateway, which degrades
    /// them to "unavailable".
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

// ============ OpenAI Provider ============

/// Calls an OpenAI-compatible `POST /v1/embeddings` endpoint.
///
/// One attempt per call; there is no retry.
pub struct OpenAIProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl OpenAIProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = match config.api_key.as_deref() {
            Some(key) if !key.is_empty() => key.to_string(),
            _ => bail!("OPENAI_API_KEY environment variable not set"),
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("embedding API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        parse_openai_response(&json)
    }
}

/// Extract `data[0].embedding` from an embeddings API response.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let embedding = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|d| d.first())
        .and_then(|item| item.get("embedding"))
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid embedding response: missing data[0].embedding"))?;

    let mut vec = Vec::with_capacity(embedding.len());
    for value in embedding {
        match value.as_f64().map(|v| v as f32) {
            Some(v) if v.is_finite() => vec.push(v),
            Some(_) => bail!("Invalid embedding response: component out of f32 range"),
            None => bail!("Invalid embedding response: non-numeric component"),
        }
    }
    if vec.is_empty() {
        bail!("Invalid embedding response: empty vector");
    }
    Ok(vec)
}

// ============ Gateway ============

/// Optional embedding capability with a bounded timeout.
#[derive(Clone)]
pub struct EmbeddingGateway {
    provider: Option<Arc<dyn EmbeddingProvider>>,
    timeout: Duration,
    max_input_chars: usize,
}

impl EmbeddingGateway {
    /// Build the gateway from configuration. A provider that cannot be
    /// constructed leaves the gateway disabled.
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        let provider: Option<Arc<dyn EmbeddingProvider>> = if config.is_enabled() {
            match OpenAIProvider::new(config) {
                Ok(p) => Some(Arc::new(p)),
                Err(e) => {
                    warn!(error = %e, "embedding provider unavailable, using keyword scoring");
                    None
                }
            }
        } else {
            None
        };

        Self {
            provider,
            timeout: Duration::from_secs(config.timeout_secs),
            max_input_chars: config.max_input_chars,
        }
    }

    /// A gateway that never embeds.
    pub fn disabled() -> Self {
        Self {
            provider: None,
            timeout: Duration::from_secs(10),
            max_input_chars: 8000,
        }
    }

    /// Use a custom provider (tests, other hosts).
    pub fn with_provider(provider: Arc<dyn EmbeddingProvider>, timeout: Duration) -> Self {
        Self {
            provider: Some(provider),
            timeout,
            max_input_chars: 8000,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.provider.is_some()
    }

    /// Embed `text`, truncated to the configured number of characters.
    ///
    /// Returns `None` when disabled or on any failure, including timeout.
    pub async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        let provider = self.provider.as_ref()?;
        let input: String = text.chars().take(self.max_input_chars).collect();

        match tokio::time::timeout(self.timeout, provider.embed(&input)).await {
            Ok(Ok(vec)) => {
                debug!(model = provider.model_name(), dims = vec.len(), "embedded text");
                Some(vec)
            }
            Ok(Err(e)) => {
                warn!(model = provider.model_name(), error = %e, "embedding failed");
                None
            }
            Err(_) => {
                warn!(
                    model = provider.model_name(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "embedding timed out"
                );
                None
            }
        }
    }
}

/// Assemble the text an item is embedded from.
///
/// Order is fixed: message text, title, url, keywords, file name. Absent or
/// empty parts are skipped.
pub fn build_embed_input(
    url: Option<&str>,
    title: Option<&str>,
    keywords: &[String],
    file_name: Option<&str>,
    message_text: Option<&str>,
) -> String {
    let joined_keywords = keywords.join(" ");
    let segments = [
        message_text,
        title,
        url,
        Some(joined_keywords.as_str()),
        file_name,
    ];

    segments
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB written by [`vec_to_blob`].
///
/// Returns `None` for a malformed BLOB (empty, or length not a multiple of 4).
pub fn blob_to_vec(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.is_empty() || blob.len() % 4 != 0 {
        return None;
    }
    Some(
        blob.chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}

/// Compute cosine similarity between two vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors, vectors of
/// different lengths, or when either vector has zero magnitude.
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f64::EPSILON {
        return 0.0;
    }

    (dot / denom).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingProvider {
        seen: Mutex<Vec<String>>,
        result: Option<Vec<f32>>,
        delay: Duration,
    }

    #[async_trait]
    impl EmbeddingProvider for RecordingProvider {
        fn model_name(&self) -> &str {
            "recording"
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.seen.lock().unwrap().push(text.to_string());
            tokio::time::sleep(self.delay).await;
            self.result
                .clone()
                .ok_or_else(|| anyhow::anyhow!("provider failure"))
        }
    }

    fn provider(result: Option<Vec<f32>>, delay: Duration) -> Arc<RecordingProvider> {
        Arc::new(RecordingProvider {
            seen: Mutex::new(Vec::new()),
            result,
            delay,
        })
    }

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob_to_vec(&blob), Some(vec));
    }

    #[test]
    fn test_malformed_blob() {
        assert_eq!(blob_to_vec(&[1, 2, 3]), None);
        assert_eq!(blob_to_vec(&[]), None);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_symmetric_and_scale_invariant() {
        let a = vec![0.3, -1.2, 4.0, 0.5];
        let b = vec![2.0, 0.1, 1.5, -0.7];
        let scaled: Vec<f32> = a.iter().map(|x| x * 7.5).collect();
        assert_eq!(cosine_similarity(&a, &b), cosine_similarity(&b, &a));
        assert!((cosine_similarity(&a, &b) - cosine_similarity(&scaled, &b)).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal_and_opposite() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_build_embed_input_order() {
        let keywords = vec!["product".to_string(), "launch".to_string()];
        let input = build_embed_input(
            Some("https://x.com/launch"),
            Some("Launch Day"),
            &keywords,
            Some("slide.png"),
            Some("look at this"),
        );
        assert_eq!(
            input,
            "look at this Launch Day https://x.com/launch product launch slide.png"
        );
    }

    #[test]
    fn test_build_embed_input_skips_absent() {
        assert_eq!(build_embed_input(None, None, &[], None, None), "");
        assert_eq!(
            build_embed_input(Some("https://x.com"), None, &[], None, Some("  hi ")),
            "hi  https://x.com"
        );
    }

    #[test]
    fn test_parse_response() {
        let json = serde_json::json!({ "data": [{ "embedding": [0.5, -0.25] }] });
        assert_eq!(parse_openai_response(&json).unwrap(), vec![0.5, -0.25]);
        assert!(parse_openai_response(&serde_json::json!({ "data": [] })).is_err());
        assert!(parse_openai_response(&serde_json::json!({ "error": "x" })).is_err());
    }

    #[test]
    fn test_parse_response_rejects_overflowing_component() {
        let json = serde_json::json!({ "data": [{ "embedding": [0.5, 1e300] }] });
        let err = parse_openai_response(&json).unwrap_err();
        assert!(err.to_string().contains("out of f32 range"));
    }

    #[tokio::test]
    async fn test_disabled_gateway_returns_none() {
        let gateway = EmbeddingGateway::disabled();
        assert!(!gateway.is_enabled());
        assert_eq!(gateway.embed("anything").await, None);
    }

    #[tokio::test]
    async fn test_gateway_truncates_input() {
        let p = provider(Some(vec![1.0]), Duration::ZERO);
        let gateway = EmbeddingGateway::with_provider(p.clone(), Duration::from_secs(5));
        let long = "é".repeat(9000);
        assert_eq!(gateway.embed(&long).await, Some(vec![1.0]));
        let seen = p.seen.lock().unwrap();
        assert_eq!(seen[0].chars().count(), 8000);
    }

    #[tokio::test]
    async fn test_gateway_failure_degrades_to_none() {
        let gateway =
            EmbeddingGateway::with_provider(provider(None, Duration::ZERO), Duration::from_secs(5));
        assert_eq!(gateway.embed("text").await, None);
    }

    #[tokio::test]
    async fn test_gateway_timeout_degrades_to_none() {
        let gateway = EmbeddingGateway::with_provider(
            provider(Some(vec![1.0]), Duration::from_secs(5)),
            Duration::from_millis(20),
        );
        assert_eq!(gateway.embed("text").await, None);
    }

    #[test]
    fn test_from_config_without_key_is_disabled() {
        let config = EmbeddingConfig {
            provider: "openai".to_string(),
            ..EmbeddingConfig::default()
        };
        assert!(!EmbeddingGateway::from_config(&config).is_enabled());
    }
}
