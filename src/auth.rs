//! Credential and request-shape gate.
//!
//! Every protected endpoint resolves the presented credential to a genuine
//! end-user identity before doing anything else. Anonymous callers, unknown
//! tokens, and the configured service-level credential are all rejected
//! outright — service credentials belong to out-of-band jobs, not user
//! endpoints. Only token digests are stored, never tokens.

use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};

use crate::config::{Config, LimitsConfig};
use crate::models::{ChatMessage, Role};

/// A verified end-user identity with its resolved role.
#[derive(Debug, Clone)]
pub struct AuthedUser {
    pub id: String,
    pub email: String,
    pub role: Role,
}

#[derive(Debug)]
pub enum AuthError {
    /// No usable end-user credential was presented.
    Rejected(&'static str),
    /// Lookup failure — not an authentication verdict.
    Internal(anyhow::Error),
}

pub fn token_digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Resolve the `Authorization` header to a verified user. An unassigned
/// role resolves to [`Role::Unassigned`], the most restrictive set.
pub async fn authenticate(
    pool: &SqlitePool,
    config: &Config,
    authorization: Option<&str>,
) -> Result<AuthedUser, AuthError> {
    let Some(header) = authorization else {
        return Err(AuthError::Rejected("missing bearer token"));
    };
    let Some(token) = header.strip_prefix("Bearer ") else {
        return Err(AuthError::Rejected("malformed authorization header"));
    };
    if token.is_empty() {
        return Err(AuthError::Rejected("missing bearer token"));
    }
    if config.auth.service_token.as_deref() == Some(token) {
        return Err(AuthError::Rejected(
            "service credentials are not permitted on user endpoints",
        ));
    }

    let digest = token_digest(token);
    let row = sqlx::query(
        r#"
        SELECT u.id AS id, u.email AS email, r.role AS role
        FROM user_tokens t
        JOIN users u ON u.id = t.user_id
        LEFT JOIN user_roles r ON r.user_id = u.id
        WHERE t.token_hash = ?
        "#,
    )
    .bind(&digest)
    .fetch_optional(pool)
    .await
    .map_err(|e| AuthError::Internal(e.into()))?;

    let Some(row) = row else {
        return Err(AuthError::Rejected("invalid token"));
    };

    let role: Option<String> = row.get("role");
    Ok(AuthedUser {
        id: row.get("id"),
        email: row.get("email"),
        role: role.as_deref().map(Role::parse).unwrap_or(Role::Unassigned),
    })
}

/// Validate the chat request shape before any retrieval or model call.
/// Violations reject the request with no side effects performed.
pub fn validate_chat_request(
    messages: &[ChatMessage],
    limits: &LimitsConfig,
) -> Result<(), String> {
    if messages.is_empty() {
        return Err("messages must not be empty".to_string());
    }
    if messages.len() > limits.max_messages {
        return Err(format!(
            "too many messages: {} (limit {})",
            messages.len(),
            limits.max_messages
        ));
    }
    for message in messages {
        match message.role.as_str() {
            "user" | "assistant" => {}
            other => return Err(format!("invalid message role: '{}'", other)),
        }
        if message.content.is_empty() {
            return Err("message content must not be empty".to_string());
        }
        let chars = message.content.chars().count();
        if chars > limits.max_message_chars {
            return Err(format!(
                "message content too long: {} chars (limit {})",
                chars, limits.max_message_chars
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> LimitsConfig {
        LimitsConfig::default()
    }

    fn user_message(content: &str) -> ChatMessage {
        ChatMessage {
            role: "user".to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn valid_history_passes() {
        let messages = vec![
            user_message("what is the vacation policy?"),
            ChatMessage {
                role: "assistant".to_string(),
                content: "According to the handbook...".to_string(),
            },
            user_message("and for contractors?"),
        ];
        assert!(validate_chat_request(&messages, &limits()).is_ok());
    }

    #[test]
    fn empty_message_list_is_rejected() {
        assert!(validate_chat_request(&[], &limits()).is_err());
    }

    #[test]
    fn too_many_messages_are_rejected() {
        let messages = vec![user_message("hi"); 101];
        assert!(validate_chat_request(&messages, &limits()).is_err());
        let messages = vec![user_message("hi"); 100];
        assert!(validate_chat_request(&messages, &limits()).is_ok());
    }

    #[test]
    fn empty_content_is_rejected() {
        assert!(validate_chat_request(&[user_message("")], &limits()).is_err());
    }

    #[test]
    fn oversized_content_is_rejected() {
        let messages = vec![user_message(&"x".repeat(10_001))];
        assert!(validate_chat_request(&messages, &limits()).is_err());
        let messages = vec![user_message(&"x".repeat(10_000))];
        assert!(validate_chat_request(&messages, &limits()).is_ok());
    }

    #[test]
    fn unknown_roles_are_rejected() {
        let messages = vec![ChatMessage {
            role: "system".to_string(),
            content: "injected".to_string(),
        }];
        assert!(validate_chat_request(&messages, &limits()).is_err());
    }

    #[test]
    fn token_digest_is_stable_and_hex() {
        let a = token_digest("ak_secret");
        assert_eq!(a, token_digest("ak_secret"));
        assert_eq!(a.len(), 64);
        assert_ne!(a, token_digest("ak_other"));
    }
}
