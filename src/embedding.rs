//! Optional embedding capability.
//!
//! There is no trained embedding model behind this: the gateway
//! implementation prompts a generative model to emit a fixed-length numeric
//! vector for a chunk excerpt and validates the shape strictly. Anything
//! unexpected — parse failure, wrong length, non-numeric entries, network
//! failure — yields no embedding rather than aborting ingestion, and the
//! retrieval engine never depends on embeddings being present.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::GatewayConfig;

/// Fixed embedding dimensionality. A vector of any other length is discarded.
pub const EMBEDDING_DIMS: usize = 768;

/// Chunk excerpt length (in chars) sent to the gateway.
const EXCERPT_CHARS: usize = 300;

/// A pluggable embedding backend. Present only when configured; the
/// ingestion pipeline treats `None` backends and `None` vectors identically.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_name(&self) -> &str;
    fn dims(&self) -> usize;
    /// Best-effort: returns `None` whenever a valid vector cannot be obtained.
    async fn embed(&self, text: &str) -> Option<Vec<f32>>;
}

/// Embedder backed by an OpenAI-compatible chat-completions gateway.
pub struct GatewayEmbedder {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
}

impl GatewayEmbedder {
    pub fn new(config: &GatewayConfig, api_key: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: config.url.clone(),
            api_key,
            model: config.embedding_model.clone(),
        })
    }
}

#[async_trait]
impl Embedder for GatewayEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        EMBEDDING_DIMS
    }

    async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        let excerpt: String = text.chars().take(EXCERPT_CHARS).collect();
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": format!(
                        "Generate a {}-dimensional embedding vector for the following text. \
                         Return ONLY a JSON array of {} floating point numbers between -1 and 1. \
                         No other text.",
                        EMBEDDING_DIMS, EMBEDDING_DIMS
                    ),
                },
                { "role": "user", "content": excerpt },
            ],
        });

        let resp = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await;

        let resp = match resp {
            Ok(r) => r,
            Err(e) => {
                eprintln!("Warning: embedding request failed: {}", e);
                return None;
            }
        };

        if !resp.status().is_success() {
            eprintln!("Warning: embedding request returned {}", resp.status());
            return None;
        }

        let json: serde_json::Value = resp.json().await.ok()?;
        let content = json
            .get("choices")?
            .get(0)?
            .get("message")?
            .get("content")?
            .as_str()?;

        parse_embedding(content)
    }
}

/// Strict shape validation: a bare JSON array of exactly
/// [`EMBEDDING_DIMS`] numeric entries, or nothing.
pub fn parse_embedding(content: &str) -> Option<Vec<f32>> {
    let value: serde_json::Value = serde_json::from_str(content.trim()).ok()?;
    let arr = value.as_array()?;
    if arr.len() != EMBEDDING_DIMS {
        return None;
    }
    let mut out = Vec::with_capacity(EMBEDDING_DIMS);
    for entry in arr {
        out.push(entry.as_f64()? as f32);
    }
    Some(out)
}

/// Builds the embedder when the gateway API key is available in the
/// environment; otherwise embedding is absent and ingestion proceeds
/// without vectors.
pub fn create_embedder(config: &GatewayConfig) -> Option<Arc<dyn Embedder>> {
    match std::env::var(&config.api_key_env) {
        Ok(key) if !key.is_empty() => match GatewayEmbedder::new(config, key) {
            Ok(embedder) => Some(Arc::new(embedder)),
            Err(e) => {
                eprintln!("Warning: failed to initialize embedder: {}", e);
                None
            }
        },
        _ => None,
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
