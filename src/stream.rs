//! Chat stream consumer state machine.
//!
//! The chat endpoint emits server-sent-event frames: an optional sources
//! frame first, then the upstream model's incremental deltas, then the
//! `[DONE]` terminal marker. This module parses that byte stream with an
//! explicit state machine over a buffered byte stream — no regex scanning
//! of raw text — and is shared by the server-side assistant-turn
//! accumulator and the `askbase ask` CLI consumer.
//!
//! A stream that closes without the terminal marker is a failure the
//! consumer must surface; [`ChatStreamReader::is_done`] reports whether the
//! marker was seen.

use crate::models::Source;

/// Typed event produced by the reader.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// The injected citation frame, emitted at most once, first.
    Sources(Vec<Source>),
    /// One incremental content fragment from the model.
    Delta(String),
    /// The terminal marker. Nothing follows.
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReaderState {
    /// Nothing parsed yet; the next data frame may be the sources frame.
    AwaitingFrame,
    /// Sources frame consumed; everything further is deltas.
    HaveSources,
    /// At least one delta forwarded.
    ForwardingDeltas,
    /// Terminal marker seen; remaining input is ignored.
    Done,
}

/// Incremental SSE frame parser. Feed it raw bytes as they arrive; it
/// buffers partial frames internally and emits complete events.
#[derive(Debug)]
pub struct ChatStreamReader {
    buffer: Vec<u8>,
    state: ReaderState,
}

impl Default for ChatStreamReader {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatStreamReader {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            state: ReaderState::AwaitingFrame,
        }
    }

    /// True once the terminal marker has been parsed. A closed stream with
    /// `is_done() == false` means the upstream ended abnormally.
    pub fn is_done(&self) -> bool {
        self.state == ReaderState::Done
    }

    /// Consume a slice of incoming bytes and return every event completed
    /// by it. Frames are delimited by a blank line; the delimiter is ASCII,
    /// so multi-byte content split across reads is reassembled safely.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(end) = find_frame_boundary(&self.buffer) {
            let frame: Vec<u8> = self.buffer.drain(..end + 2).collect();
            if self.state == ReaderState::Done {
                continue;
            }
            if let Some(event) = self.parse_frame(&frame[..end]) {
                events.push(event);
            }
        }
        events
    }

    fn parse_frame(&mut self, frame: &[u8]) -> Option<StreamEvent> {
        let text = String::from_utf8_lossy(frame);
        for line in text.lines() {
            let Some(payload) = line.strip_prefix("data:") else {
                continue;
            };
            let payload = payload.trim();

            if payload == "[DONE]" {
                self.state = ReaderState::Done;
                return Some(StreamEvent::Done);
            }

            let Ok(value) = serde_json::from_str::<serde_json::Value>(payload) else {
                continue;
            };

            // The sources frame is only recognized in first position; a
            // model payload mentioning "sources" later stays a delta.
            if self.state == ReaderState::AwaitingFrame {
                if let Some(sources) = value.get("sources") {
                    if let Ok(sources) = serde_json::from_value::<Vec<Source>>(sources.clone()) {
                        self.state = ReaderState::HaveSources;
                        return Some(StreamEvent::Sources(sources));
                    }
                }
            }

            let delta = value
                .get("choices")
                .and_then(|c| c.get(0))
                .and_then(|c| c.get("delta"))
                .and_then(|d| d.get("content"))
                .and_then(|c| c.as_str());

            if let Some(delta) = delta {
                self.state = ReaderState::ForwardingDeltas;
                return Some(StreamEvent::Delta(delta.to_string()));
            }
        }
        None
    }
}

/// Index of the first `\n\n` frame delimiter, if a complete frame is buffered.
fn find_frame_boundary(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}
