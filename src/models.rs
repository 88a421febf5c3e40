//! Core data models used throughout askbase.
//!
//! These types represent the documents, chunks, and chat payloads that flow
//! through the ingestion and retrieval pipeline, plus the closed category
//! and role model that scopes retrieval.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Closed classification label controlling which roles may retrieve a
/// document. Loosely-typed values from storage or requests are validated
/// into this enum at the boundary; unknown values are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Hr,
    Technical,
    General,
}

impl Category {
    pub fn parse(value: &str) -> Result<Category> {
        match value {
            "hr" => Ok(Category::Hr),
            "technical" => Ok(Category::Technical),
            "general" => Ok(Category::General),
            other => bail!("unknown document category: '{}'", other),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Hr => "hr",
            Category::Technical => "technical",
            Category::General => "general",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role assigned to a user. Anything outside the three known roles maps to
/// [`Role::Unassigned`], which carries the most restrictive category set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Hr,
    Developer,
    Unassigned,
}

impl Role {
    /// Unknown or missing role names resolve to [`Role::Unassigned`] rather
    /// than an error.
    pub fn parse(value: &str) -> Role {
        match value {
            "admin" => Role::Admin,
            "hr" => Role::Hr,
            "developer" => Role::Developer,
            _ => Role::Unassigned,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Hr => "hr",
            Role::Developer => "developer",
            Role::Unassigned => "unassigned",
        }
    }

    /// Document categories this role is permitted to retrieve.
    pub fn allowed_categories(&self) -> &'static [Category] {
        match self {
            Role::Admin => &[Category::Hr, Category::Technical, Category::General],
            Role::Hr => &[Category::Hr, Category::General],
            Role::Developer => &[Category::Technical, Category::General],
            Role::Unassigned => &[Category::General],
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Document record stored in SQLite. The raw bytes live in the blob store
/// under `file_path`.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub file_name: String,
    pub file_path: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub category: Category,
    pub content_hash: String,
    pub processed: bool,
    pub uploaded_by: String,
    pub created_at: i64,
}

/// A chunk of a document's extracted text, the unit of retrieval.
/// Immutable once written; indices are gapless per document starting at 0.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub content: String,
    pub embedding: Option<Vec<f32>>,
}

/// A distinct document contributing at least one retrieved chunk to an
/// answer, surfaced for citation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub category: Category,
}

/// One turn in a conversation, as sent by the chat caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parses_known_values_only() {
        assert_eq!(Category::parse("hr").unwrap(), Category::Hr);
        assert_eq!(Category::parse("technical").unwrap(), Category::Technical);
        assert_eq!(Category::parse("general").unwrap(), Category::General);
        assert!(Category::parse("finance").is_err());
        assert!(Category::parse("").is_err());
        assert!(Category::parse("HR").is_err());
    }

    #[test]
    fn role_to_category_mapping_is_exhaustive() {
        assert_eq!(
            Role::Admin.allowed_categories(),
            &[Category::Hr, Category::Technical, Category::General]
        );
        assert_eq!(
            Role::Hr.allowed_categories(),
            &[Category::Hr, Category::General]
        );
        assert_eq!(
            Role::Developer.allowed_categories(),
            &[Category::Technical, Category::General]
        );
        assert_eq!(Role::Unassigned.allowed_categories(), &[Category::General]);
    }

    #[test]
    fn unknown_role_defaults_to_most_restrictive() {
        assert_eq!(Role::parse("intern"), Role::Unassigned);
        assert_eq!(Role::parse(""), Role::Unassigned);
        assert_eq!(Role::parse("intern").allowed_categories(), &[Category::General]);
    }

    #[test]
    fn source_serializes_with_lowercase_category() {
        let s = Source {
            title: "Handbook".to_string(),
            category: Category::Hr,
        };
        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(json, r#"{"title":"Handbook","category":"hr"}"#);
    }
}
