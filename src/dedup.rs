//! Content-hash deduplication index.
//!
//! Detects byte-identical or same-named re-uploads before any storage write.
//! The check is best-effort: no lock spans the check-then-act window, so two
//! near-simultaneous identical uploads can both pass.

use anyhow::Result;
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};

/// Deterministic, collision-resistant digest of a file's raw bytes.
pub fn compute_content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Which predicate(s) matched the first duplicate hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    Hash,
    Name,
    Both,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Hash => "content",
            MatchType::Name => "file name",
            MatchType::Both => "content and file name",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DuplicateMatch {
    pub id: String,
    pub title: String,
    pub file_path: String,
    pub match_type: MatchType,
}

/// Looks up an existing document whose content hash or file name matches the
/// candidate upload. Returns the first hit with its match classification.
pub async fn find_duplicate(
    pool: &SqlitePool,
    content_hash: &str,
    file_name: &str,
) -> Result<Option<DuplicateMatch>> {
    let row = sqlx::query(
        r#"
        SELECT id, title, file_path, content_hash, file_name
        FROM documents
        WHERE content_hash = ? OR file_name = ?
        LIMIT 1
        "#,
    )
    .bind(content_hash)
    .bind(file_name)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let existing_hash: String = row.get("content_hash");
    let existing_name: String = row.get("file_name");
    let match_type = match (existing_hash == content_hash, existing_name == file_name) {
        (true, true) => MatchType::Both,
        (true, false) => MatchType::Hash,
        _ => MatchType::Name,
    };

    Ok(Some(DuplicateMatch {
        id: row.get("id"),
        title: row.get("title"),
        file_path: row.get("file_path"),
        match_type,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let a = compute_content_hash(b"the same bytes");
        let b = compute_content_hash(b"the same bytes");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn single_byte_difference_changes_hash() {
        let a = compute_content_hash(b"payload A");
        let b = compute_content_hash(b"payload B");
        assert_ne!(a, b);
    }

    #[test]
    fn empty_input_hashes() {
        // SHA-256 of the empty string is a fixed, well-known digest.
        assert_eq!(
            compute_content_hash(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
