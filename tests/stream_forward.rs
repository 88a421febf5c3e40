//! Forwarding-pipe properties against a mocked upstream.
//!
//! The upstream emits K sources, N delta frames, then closes. The forwarded
//! stream must carry exactly one injected sources frame (when K > 0)
//! followed by the upstream bytes verbatim, and a consumer driving the
//! state machine must see the same events regardless of how the bytes are
//! split across reads.

use futures::channel::mpsc;
use futures::{stream, StreamExt};
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use askbase::chat::forward_stream;
use askbase::models::{Category, Source};
use askbase::stream::{ChatStreamReader, StreamEvent};

fn delta_frame(content: &str) -> Vec<u8> {
    format!(
        "data: {}\n\n",
        serde_json::json!({ "choices": [{ "delta": { "content": content } }] })
    )
    .into_bytes()
}

fn done_frame() -> Vec<u8> {
    b"data: [DONE]\n\n".to_vec()
}

fn sample_sources() -> Vec<Source> {
    vec![
        Source {
            title: "Handbook".to_string(),
            category: Category::Hr,
        },
        Source {
            title: "Runbook".to_string(),
            category: Category::Technical,
        },
    ]
}

async fn run_forward(sources: Vec<Source>, upstream_frames: Vec<Vec<u8>>) -> Vec<Vec<u8>> {
    let (tx, rx) = mpsc::channel(4);
    let upstream = stream::iter(upstream_frames.into_iter().map(Ok::<_, Infallible>));
    let task = tokio::spawn(async move {
        forward_stream(&sources, upstream, tx).await;
    });
    let collected: Vec<Vec<u8>> = rx.collect().await;
    task.await.unwrap();
    collected
}

#[tokio::test]
async fn sources_frame_precedes_verbatim_upstream() {
    let sources = sample_sources();
    let upstream_frames = vec![delta_frame("Hel"), delta_frame("lo"), done_frame()];
    let upstream_bytes: usize = upstream_frames.iter().map(|f| f.len()).sum();

    let collected = run_forward(sources.clone(), upstream_frames.clone()).await;

    assert_eq!(collected.len(), upstream_frames.len() + 1);

    let expected_header = format!(
        "data: {}\n\n",
        serde_json::json!({ "sources": sources })
    )
    .into_bytes();
    assert_eq!(collected[0], expected_header);

    // Upstream frames are forwarded verbatim, frame for frame, in order.
    assert_eq!(&collected[1..], &upstream_frames[..]);

    // Byte count (excluding the injected frame) equals upstream's.
    let forwarded: usize = collected[1..].iter().map(|f| f.len()).sum();
    assert_eq!(forwarded, upstream_bytes);
}

#[tokio::test]
async fn no_sources_frame_when_nothing_was_retrieved() {
    let upstream_frames = vec![delta_frame("answer"), done_frame()];
    let collected = run_forward(Vec::new(), upstream_frames.clone()).await;
    assert_eq!(collected, upstream_frames);
}

#[tokio::test]
async fn consumer_sees_sources_then_deltas_then_done() {
    let sources = sample_sources();
    let upstream_frames = vec![delta_frame("One"), delta_frame(" two"), done_frame()];
    let collected = run_forward(sources.clone(), upstream_frames).await;

    let mut reader = ChatStreamReader::new();
    let mut events = Vec::new();
    for frame in &collected {
        events.extend(reader.push(frame));
    }

    assert_eq!(
        events,
        vec![
            StreamEvent::Sources(sources),
            StreamEvent::Delta("One".to_string()),
            StreamEvent::Delta(" two".to_string()),
            StreamEvent::Done,
        ]
    );
    assert!(reader.is_done());
}

#[tokio::test]
async fn consumer_reassembles_arbitrarily_split_forwarded_bytes() {
    let upstream_frames = vec![delta_frame("split me"), done_frame()];
    let collected = run_forward(sample_sources(), upstream_frames).await;
    let bytes: Vec<u8> = collected.concat();

    let mut reader = ChatStreamReader::new();
    let mut events = Vec::new();
    for piece in bytes.chunks(7) {
        events.extend(reader.push(piece));
    }

    assert_eq!(events.len(), 3); // sources + one delta + done
    assert!(matches!(events[0], StreamEvent::Sources(_)));
    assert_eq!(events[1], StreamEvent::Delta("split me".to_string()));
    assert_eq!(events[2], StreamEvent::Done);
}

#[tokio::test]
async fn close_without_terminal_marker_is_a_consumer_failure() {
    // Upstream dies after one delta and never sends [DONE].
    let collected = run_forward(Vec::new(), vec![delta_frame("partial")]).await;

    let mut reader = ChatStreamReader::new();
    for frame in &collected {
        reader.push(frame);
    }
    assert!(!reader.is_done());
}

#[tokio::test]
async fn dropped_caller_stops_the_upstream_read() {
    let pulled = Arc::new(AtomicUsize::new(0));
    let counter = pulled.clone();

    let frames: Vec<Vec<u8>> = (0..100).map(|i| delta_frame(&format!("d{}", i))).collect();
    let upstream = stream::iter(frames)
        .inspect(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .map(Ok::<_, Infallible>);

    let (tx, rx) = mpsc::channel(1);
    drop(rx);

    forward_stream(&[], upstream, tx).await;

    // The first failed send ends the pipe; the upstream is not drained.
    assert!(pulled.load(Ordering::SeqCst) <= 2);
}
