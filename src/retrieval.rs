//! Role-scoped lexical retrieval.
//!
//! Retrieval is keyword matching over chunk content, restricted to the
//! document categories the caller's role permits, with a recency fallback
//! that guarantees grounding whenever any permitted document exists.
//! Ranking is existence-of-match, not relevance-scored — a documented
//! limitation (no semantic ranking).

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::config::RetrievalConfig;
use crate::models::{Category, Role, Source};

/// Maximum query tokens kept after sanitization.
const MAX_QUERY_TOKENS: usize = 8;
/// Tokens at or below this length are discarded.
const MIN_TOKEN_CHARS: usize = 2;

/// One retrieved excerpt with its citation metadata.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub content: String,
    pub source_title: String,
    pub source_category: Category,
}

/// Reduce free text to an FTS5 AND-conjunction: strip syntax-sensitive
/// characters, drop short tokens, cap the token count, quote each term.
/// Returns `None` when nothing usable remains.
pub fn sanitize_query(query: &str) -> Option<String> {
    let cleaned: String = query
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    let tokens: Vec<&str> = cleaned
        .split_whitespace()
        .filter(|t| t.chars().count() > MIN_TOKEN_CHARS)
        .take(MAX_QUERY_TOKENS)
        .collect();

    if tokens.is_empty() {
        return None;
    }

    Some(
        tokens
            .iter()
            .map(|t| format!("\"{}\"", t))
            .collect::<Vec<_>>()
            .join(" AND "),
    )
}

/// Retrieve chunks for a query, restricted to the categories `role` may see.
///
/// Primary path: lexical match over chunk content, candidate pool capped at
/// `candidate_limit`, top `final_limit` returned. Fallback on zero hits:
/// the most recently ingested chunks within the same category restriction.
pub async fn retrieve(
    pool: &SqlitePool,
    config: &RetrievalConfig,
    role: Role,
    query: &str,
) -> Result<Vec<RetrievedChunk>> {
    let categories = role.allowed_categories();
    let placeholders = vec!["?"; categories.len()].join(", ");

    if let Some(match_expr) = sanitize_query(query) {
        let sql = format!(
            r#"
            SELECT chunks_fts.content AS content, d.title AS title, d.category AS category
            FROM chunks_fts
            JOIN documents d ON d.id = chunks_fts.document_id
            WHERE chunks_fts MATCH ? AND d.category IN ({})
            LIMIT ?
            "#,
            placeholders
        );

        let mut q = sqlx::query(&sql).bind(&match_expr);
        for category in categories {
            q = q.bind(category.as_str());
        }
        let rows = q.bind(config.candidate_limit).fetch_all(pool).await?;

        if !rows.is_empty() {
            let mut chunks = rows_to_chunks(&rows)?;
            chunks.truncate(config.final_limit as usize);
            return Ok(chunks);
        }
    }

    // Recency fallback: chunks are written only by the ingestion pipeline,
    // so insertion order is ingestion order.
    let sql = format!(
        r#"
        SELECT c.content AS content, d.title AS title, d.category AS category
        FROM chunks c
        JOIN documents d ON d.id = c.document_id
        WHERE d.category IN ({})
        ORDER BY c.rowid DESC
        LIMIT ?
        "#,
        placeholders
    );

    let mut q = sqlx::query(&sql);
    for category in categories {
        q = q.bind(category.as_str());
    }
    let rows = q.bind(config.final_limit).fetch_all(pool).await?;

    rows_to_chunks(&rows)
}

fn rows_to_chunks(rows: &[sqlx::sqlite::SqliteRow]) -> Result<Vec<RetrievedChunk>> {
    rows.iter()
        .map(|row| {
            let category: String = row.get("category");
            Ok(RetrievedChunk {
                content: row.get("content"),
                source_title: row.get("title"),
                source_category: Category::parse(&category)?,
            })
        })
        .collect()
}

/// Collapse retrieved chunks into the citation list: one [`Source`] per
/// distinct title, preserving first-seen order.
pub fn dedupe_sources(chunks: &[RetrievedChunk]) -> Vec<Source> {
    let mut sources: Vec<Source> = Vec::new();
    for chunk in chunks {
        if !sources.iter().any(|s| s.title == chunk.source_title) {
            sources.push(Source {
                title: chunk.source_title.clone(),
                category: chunk.source_category,
            });
        }
    }
    sources
}

/// CLI entry point — runs retrieval directly and prints the results.
pub async fn run_search(config: &crate::config::Config, query: &str, role: &str) -> Result<()> {
    let role = Role::parse(role);
    let pool = crate::db::connect(config).await?;

    let chunks = retrieve(&pool, &config.retrieval, role, query).await?;

    if chunks.is_empty() {
        println!("No results.");
        pool.close().await;
        return Ok(());
    }

    for (i, chunk) in chunks.iter().enumerate() {
        println!(
            "{}. {} [{}]",
            i + 1,
            chunk.source_title,
            chunk.source_category
        );
        let excerpt: String = chunk.content.chars().take(240).collect();
        println!("    excerpt: \"{}\"", excerpt.replace('\n', " "));
        println!();
    }

    pool.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_syntax_and_short_tokens() {
        let expr = sanitize_query("how do I \"reset\" my-password? (v2)").unwrap();
        assert_eq!(expr, "\"how\" AND \"reset\" AND \"password\"");
    }

    #[test]
    fn sanitize_caps_token_count() {
        let expr = sanitize_query(
            "alpha bravo charlie delta echo foxtrot golf hotel india juliett",
        )
        .unwrap();
        assert_eq!(expr.matches(" AND ").count(), MAX_QUERY_TOKENS - 1);
        assert!(!expr.contains("india"));
    }

    #[test]
    fn sanitize_returns_none_for_unusable_queries() {
        assert!(sanitize_query("").is_none());
        assert!(sanitize_query("a b c").is_none());
        assert!(sanitize_query("?! () **").is_none());
    }

    #[test]
    fn dedupe_keeps_first_seen_order() {
        let chunks = vec![
            RetrievedChunk {
                content: "x".into(),
                source_title: "Beta".into(),
                source_category: Category::General,
            },
            RetrievedChunk {
                content: "y".into(),
                source_title: "Alpha".into(),
                source_category: Category::Technical,
            },
            RetrievedChunk {
                content: "z".into(),
                source_title: "Beta".into(),
                source_category: Category::General,
            },
        ];
        let sources = dedupe_sources(&chunks);
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].title, "Beta");
        assert_eq!(sources[1].title, "Alpha");
    }
}
