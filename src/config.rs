use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Root directory for uploaded document blobs.
    pub root: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    500
}
fn default_chunk_overlap() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Candidate pool cap for the lexical-match path.
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: i64,
    /// Maximum chunks returned to the orchestrator.
    #[serde(default = "default_final_limit")]
    pub final_limit: i64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            candidate_limit: default_candidate_limit(),
            final_limit: default_final_limit(),
        }
    }
}

fn default_candidate_limit() -> i64 {
    15
}
fn default_final_limit() -> i64 {
    10
}

/// OpenAI-compatible streaming completions gateway used for both chat and
/// the best-effort embedding capability. The API key is read from the
/// environment at startup; embeddings are silently disabled without it.
#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_url")]
    pub url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: default_gateway_url(),
            api_key_env: default_api_key_env(),
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_gateway_url() -> String {
    "https://ai.gateway.lovable.dev/v1/chat/completions".to_string()
}
fn default_api_key_env() -> String {
    "AI_GATEWAY_API_KEY".to_string()
}
fn default_chat_model() -> String {
    "google/gemini-3-flash-preview".to_string()
}
fn default_embedding_model() -> String {
    "google/gemini-2.5-flash-lite".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_messages: default_max_messages(),
            max_message_chars: default_max_message_chars(),
        }
    }
}

fn default_max_messages() -> usize {
    100
}
fn default_max_message_chars() -> usize {
    10_000
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AuthConfig {
    /// Service-level credential used by out-of-band jobs. Presenting it on a
    /// user endpoint is rejected outright.
    pub service_token: Option<String>,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.overlap must be smaller than chunking.chunk_size");
    }

    if config.retrieval.final_limit < 1 {
        anyhow::bail!("retrieval.final_limit must be >= 1");
    }
    if config.retrieval.candidate_limit < config.retrieval.final_limit {
        anyhow::bail!("retrieval.candidate_limit must be >= retrieval.final_limit");
    }

    if config.limits.max_messages == 0 || config.limits.max_message_chars == 0 {
        anyhow::bail!("limits.max_messages and limits.max_message_chars must be > 0");
    }

    if config.gateway.url.is_empty() {
        anyhow::bail!("gateway.url must not be empty");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(body.as_bytes()).unwrap();
        f
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let f = write_config(
            r#"[db]
path = "/tmp/askbase.sqlite"

[storage]
root = "/tmp/blobs"

[server]
bind = "127.0.0.1:8080"
"#,
        );
        let cfg = load_config(f.path()).unwrap();
        assert_eq!(cfg.chunking.chunk_size, 500);
        assert_eq!(cfg.chunking.overlap, 50);
        assert_eq!(cfg.retrieval.candidate_limit, 15);
        assert_eq!(cfg.retrieval.final_limit, 10);
        assert_eq!(cfg.limits.max_messages, 100);
        assert_eq!(cfg.limits.max_message_chars, 10_000);
        assert!(cfg.auth.service_token.is_none());
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let f = write_config(
            r#"[db]
path = "/tmp/askbase.sqlite"

[storage]
root = "/tmp/blobs"

[chunking]
chunk_size = 100
overlap = 100

[server]
bind = "127.0.0.1:8080"
"#,
        );
        assert!(load_config(f.path()).is_err());
    }
}
