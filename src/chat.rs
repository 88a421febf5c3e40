//! Streaming chat orchestrator.
//!
//! Builds a system instruction embedding the retrieved context, opens a
//! streaming completion against the gateway, and forwards the token stream
//! to the caller with one injected citation frame ahead of model output.
//!
//! The forwarding pipe is single-producer/single-consumer and bounded:
//! a slow caller suspends the upstream read rather than buffering
//! unboundedly, and a disconnected caller drops the upstream response,
//! cancelling the request. Upstream handshake failures are mapped before
//! any streaming begins; a failure after headers is surfaced to consumers
//! as a close without the terminal marker.
//!
//! Conversation turns are persisted by the calling layer, not here: the
//! user message before invocation, the assistant message after the stream
//! completes.

use anyhow::{anyhow, Result};
use futures::channel::mpsc;
use futures::{SinkExt, Stream, StreamExt};
use sqlx::SqlitePool;
use std::time::Duration;

use crate::config::Config;
use crate::models::{ChatMessage, Role, Source};
use crate::retrieval::{self, RetrievedChunk};
use crate::stream::{ChatStreamReader, StreamEvent};

/// Capacity of the forwarding channel. Small on purpose: backpressure on
/// the caller side must propagate to the upstream read.
const FORWARD_CHANNEL_CAPACITY: usize = 16;

/// Failure opening the chat stream, detected at the initial handshake.
#[derive(Debug)]
pub enum ChatError {
    /// Upstream throttled the request (retryable).
    RateLimited,
    /// Upstream billing/quota exhausted (not retryable without action).
    QuotaExceeded,
    /// Any other upstream failure; detail belongs in server-side logs only.
    Upstream(String),
    Internal(anyhow::Error),
}

impl std::fmt::Display for ChatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatError::RateLimited => write!(f, "rate limit exceeded"),
            ChatError::QuotaExceeded => write!(f, "usage quota exhausted"),
            ChatError::Upstream(detail) => write!(f, "upstream failure: {}", detail),
            ChatError::Internal(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ChatError {}

/// An open chat stream: the deduplicated citation list plus the raw frame
/// receiver (sources frame first, then upstream bytes verbatim).
pub struct ChatStream {
    pub sources: Vec<Source>,
    pub frames: mpsc::Receiver<Vec<u8>>,
}

/// System instruction for the model, embedding the retrieved context or an
/// explicit no-documents notice.
pub fn build_system_prompt(chunks: &[RetrievedChunk]) -> String {
    if chunks.is_empty() {
        return "You are an enterprise knowledge assistant. No documents have been uploaded \
                yet, or no relevant documents were found for this query. Let the user know \
                they may need to upload relevant documents first."
            .to_string();
    }

    let context = chunks
        .iter()
        .map(|c| format!("[Source: {}]\n{}", c.source_title, c.content))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");

    format!(
        "You are an enterprise knowledge assistant. Use the following document excerpts \
         to answer the user's question. Always cite which document(s) you used. If the \
         documents don't contain relevant information, say so honestly.\n\n\
         DOCUMENT CONTEXT:\n{}",
        context
    )
}

/// Retrieve context for the caller's role, open the streaming completion,
/// and spawn the forwarding pipe. Returns once upstream headers are in;
/// token delivery happens through [`ChatStream::frames`].
pub async fn stream_chat(
    config: &Config,
    pool: &SqlitePool,
    role: Role,
    messages: &[ChatMessage],
) -> Result<ChatStream, ChatError> {
    let api_key = std::env::var(&config.gateway.api_key_env).map_err(|_| {
        ChatError::Internal(anyhow!(
            "gateway API key is not configured (set {})",
            config.gateway.api_key_env
        ))
    })?;

    let query = messages.last().map(|m| m.content.as_str()).unwrap_or("");
    let retrieved = retrieval::retrieve(pool, &config.retrieval, role, query)
        .await
        .map_err(ChatError::Internal)?;
    let sources = retrieval::dedupe_sources(&retrieved);
    let system_prompt = build_system_prompt(&retrieved);

    let mut payload_messages =
        vec![serde_json::json!({ "role": "system", "content": system_prompt })];
    for message in messages {
        payload_messages
            .push(serde_json::json!({ "role": message.role, "content": message.content }));
    }

    // Connect timeout only: a total-request timeout would cut long streams.
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(config.gateway.timeout_secs))
        .build()
        .map_err(|e| ChatError::Internal(e.into()))?;

    let response = client
        .post(&config.gateway.url)
        .header("Authorization", format!("Bearer {}", api_key))
        .header("Content-Type", "application/json")
        .json(&serde_json::json!({
            "model": config.gateway.chat_model,
            "messages": payload_messages,
            "stream": true,
        }))
        .send()
        .await
        .map_err(|e| ChatError::Upstream(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(match status.as_u16() {
            429 => ChatError::RateLimited,
            402 => ChatError::QuotaExceeded,
            _ => {
                let detail = response.text().await.unwrap_or_default();
                ChatError::Upstream(format!("status {}: {}", status, detail))
            }
        });
    }

    let (tx, rx) = mpsc::channel::<Vec<u8>>(FORWARD_CHANNEL_CAPACITY);
    let upstream = Box::pin(response.bytes_stream());
    let task_sources = sources.clone();
    tokio::spawn(async move {
        forward_stream(&task_sources, upstream, tx).await;
    });

    Ok(ChatStream {
        sources,
        frames: rx,
    })
}

/// The forwarding pipe: one injected sources frame first (only when
/// non-empty), then every upstream chunk verbatim until upstream closes.
/// Upstream payloads are not re-parsed or re-buffered here.
pub async fn forward_stream<S, B, E>(
    sources: &[Source],
    mut upstream: S,
    mut tx: mpsc::Sender<Vec<u8>>,
) where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    if !sources.is_empty() {
        let frame = format!("data: {}\n\n", serde_json::json!({ "sources": sources }));
        if tx.send(frame.into_bytes()).await.is_err() {
            return;
        }
    }

    while let Some(item) = upstream.next().await {
        match item {
            Ok(bytes) => {
                if tx.send(bytes.as_ref().to_vec()).await.is_err() {
                    // Caller disconnected; dropping the upstream stream
                    // cancels the in-flight request.
                    return;
                }
            }
            Err(e) => {
                // The caller-facing stream closes without a terminal marker,
                // which consumers treat as a failure.
                eprintln!("Warning: upstream stream error: {}", e);
                return;
            }
        }
    }
}

/// CLI entry point — asks a question through the full pipeline and prints
/// sources, then the streamed answer.
pub async fn run_ask(config: &Config, query: &str, role: &str) -> Result<()> {
    use std::io::Write;

    let role = Role::parse(role);
    let pool = crate::db::connect(config).await?;

    let messages = vec![ChatMessage {
        role: "user".to_string(),
        content: query.to_string(),
    }];

    let chat = match stream_chat(config, &pool, role, &messages).await {
        Ok(chat) => chat,
        Err(e) => {
            pool.close().await;
            return Err(anyhow!("{}", e));
        }
    };

    let mut frames = chat.frames;
    let mut reader = ChatStreamReader::new();
    let mut stdout = std::io::stdout();

    while let Some(bytes) = frames.next().await {
        for event in reader.push(&bytes) {
            match event {
                StreamEvent::Sources(sources) => {
                    println!("Sources:");
                    for source in &sources {
                        println!("  - {} [{}]", source.title, source.category);
                    }
                    println!();
                }
                StreamEvent::Delta(text) => {
                    print!("{}", text);
                    stdout.flush().ok();
                }
                StreamEvent::Done => {}
            }
        }
    }
    println!();

    pool.close().await;

    if !reader.is_done() {
        anyhow::bail!("response stream closed without a terminal marker");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;

    fn chunk(title: &str, content: &str) -> RetrievedChunk {
        RetrievedChunk {
            content: content.to_string(),
            source_title: title.to_string(),
            source_category: Category::General,
        }
    }

    #[test]
    fn empty_context_prompt_mentions_missing_documents() {
        let prompt = build_system_prompt(&[]);
        assert!(prompt.contains("No documents have been uploaded"));
    }

    #[test]
    fn context_prompt_tags_each_excerpt_with_its_source() {
        let prompt = build_system_prompt(&[
            chunk("Handbook", "PTO accrues monthly."),
            chunk("Runbook", "Restart the ingest worker."),
        ]);
        assert!(prompt.contains("[Source: Handbook]\nPTO accrues monthly."));
        assert!(prompt.contains("[Source: Runbook]\nRestart the ingest worker."));
        assert!(prompt.contains("DOCUMENT CONTEXT:"));
        // Excerpts are separated, not concatenated.
        assert!(prompt.contains("\n\n---\n\n"));
    }
}
