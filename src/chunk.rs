//! Sliding-window text chunker.
//!
//! Splits extracted document text into fixed-size overlapping windows, the
//! unit of retrieval. Windows are measured in characters and sliced on char
//! boundaries, so multi-byte input never splits a code point.

/// Default window size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 500;
/// Default overlap carried into the next window.
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;

/// Split `text` into ordered overlapping windows of up to `size` chars,
/// advancing `size - overlap` per step. The final window may be shorter.
/// Empty input yields no chunks.
///
/// Requires `size > overlap` to guarantee forward progress (validated at
/// config load).
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    assert!(size > overlap, "chunk size must exceed overlap");

    if text.is_empty() {
        return Vec::new();
    }

    // Byte offset of each char boundary, plus the end of the text.
    let mut bounds: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    bounds.push(text.len());
    let char_count = bounds.len() - 1;

    let step = size - overlap;
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < char_count {
        let end = (start + size).min(char_count);
        chunks.push(text[bounds[start]..bounds[end]].to_string());
        start += step;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk_text("", 500, 50).is_empty());
    }

    #[test]
    fn short_text_yields_single_chunk() {
        let chunks = chunk_text("hello", 500, 50);
        assert_eq!(chunks, vec!["hello".to_string()]);
    }

    #[test]
    fn twelve_hundred_chars_yield_three_windows() {
        let text = "a".repeat(1200);
        let chunks = chunk_text(&text, 500, 50);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], text[0..500]);
        assert_eq!(chunks[1], text[450..950]);
        assert_eq!(chunks[2], text[900..1200]);
    }

    #[test]
    fn chunk_count_matches_closed_form() {
        // ceil(len / (size - overlap)) windows for non-empty input
        for len in [1, 49, 450, 451, 500, 899, 900, 901, 1200, 5000] {
            let text = "x".repeat(len);
            let chunks = chunk_text(&text, 500, 50);
            let expected = len.div_ceil(450);
            assert_eq!(chunks.len(), expected, "len={}", len);
        }
    }

    #[test]
    fn prefixes_reconstruct_original_text() {
        let text: String = (0..1337).map(|i| ((i % 26) as u8 + b'a') as char).collect();
        let size = 500;
        let overlap = 50;
        let chunks = chunk_text(&text, size, overlap);

        let mut rebuilt = String::new();
        for (i, chunk) in chunks.iter().enumerate() {
            if i + 1 == chunks.len() {
                rebuilt.push_str(chunk);
            } else {
                let prefix: String = chunk.chars().take(size - overlap).collect();
                rebuilt.push_str(&prefix);
            }
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn windows_split_on_char_boundaries() {
        let text = "é".repeat(20);
        let chunks = chunk_text(&text, 8, 2);
        assert_eq!(chunks[0].chars().count(), 8);
        let rebuilt: String = chunks
            .iter()
            .enumerate()
            .map(|(i, c)| {
                if i + 1 == chunks.len() {
                    c.clone()
                } else {
                    c.chars().take(6).collect()
                }
            })
            .collect();
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = "the quick brown fox ".repeat(60);
        assert_eq!(chunk_text(&text, 500, 50), chunk_text(&text, 500, 50));
    }
}
