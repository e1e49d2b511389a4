//! Admission checks that run before a request touches the rate limiter.

use sha2::{Digest, Sha256};
use tracing::{error, warn};

use crate::error::ApiError;
use crate::metrics::AUTH_FAILURES;
use crate::models::ChatRequest;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const MAX_MESSAGE_CHARS: usize = 10_000;
pub const MAX_CONTEXT_ENTRIES: usize = 100;
pub const MAX_REQUEST_CHARS: usize = 100_000;

/// Compares fixed-length digests so the check does not leak the secret's length
/// or a matching prefix through timing.
pub fn secure_compare(provided: &str, expected: &str) -> bool {
    let a = Sha256::digest(provided.as_bytes());
    let b = Sha256::digest(expected.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

pub fn authenticate(provided: Option<&str>, secret: &str, client: &str) -> Result<(), ApiError> {
    match provided {
        Some(key) if secure_compare(key, secret) => Ok(()),
        Some(_) => {
            AUTH_FAILURES.inc();
            error!(target: "security", client, "invalid API key");
            Err(ApiError::Unauthenticated)
        }
        None => {
            AUTH_FAILURES.inc();
            error!(target: "security", client, "missing API key");
            Err(ApiError::Unauthenticated)
        }
    }
}

/// Parses the raw body and enforces the size limits. Sizes are in characters.
pub fn admit(raw: &str, client: &str) -> Result<ChatRequest, ApiError> {
    let total = raw.chars().count();
    if total > MAX_REQUEST_CHARS {
        warn!(target: "security", client, total, "request body too large");
        return Err(ApiError::TooLarge(format!(
            "Request exceeds {} characters",
            MAX_REQUEST_CHARS
        )));
    }

    let request: ChatRequest =
        serde_json::from_str(raw).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let message_len = request.message.chars().count();
    if message_len > MAX_MESSAGE_CHARS {
        warn!(target: "security", client, message_len, "message too long");
        return Err(ApiError::TooLarge(format!(
            "Message exceeds {} characters",
            MAX_MESSAGE_CHARS
        )));
    }
    if request.conversation_context.len() > MAX_CONTEXT_ENTRIES {
        warn!(
            target: "security",
            client,
            entries = request.conversation_context.len(),
            "conversation context too long"
        );
        return Err(ApiError::TooLarge(format!(
            "Conversation context exceeds {} entries",
            MAX_CONTEXT_ENTRIES
        )));
    }
    if request.message.trim().is_empty() {
        return Err(ApiError::BadRequest("message must not be empty".into()));
    }

    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(message: &str, context_len: usize) -> String {
        let context: Vec<_> = (0..context_len)
            .map(|i| json!({ "role": "user", "content": format!("turn {}", i) }))
            .collect();
        json!({ "message": message, "conversation_context": context }).to_string()
    }

    #[test]
    fn secure_compare_matches_only_equal_keys() {
        assert!(secure_compare("abc", "abc"));
        assert!(!secure_compare("abd", "abc"));
        assert!(!secure_compare("", "abc"));
    }

    #[test]
    fn wrong_or_missing_key_is_unauthenticated() {
        assert!(authenticate(Some("secret"), "secret", "a").is_ok());
        assert!(matches!(
            authenticate(Some("wrong"), "secret", "a"),
            Err(ApiError::Unauthenticated)
        ));
        assert!(matches!(
            authenticate(None, "secret", "a"),
            Err(ApiError::Unauthenticated)
        ));
    }

    #[test]
    fn message_length_boundary() {
        let ok = "x".repeat(MAX_MESSAGE_CHARS);
        assert!(admit(&body(&ok, 0), "a").is_ok());

        let too_long = "x".repeat(MAX_MESSAGE_CHARS + 1);
        assert!(matches!(
            admit(&body(&too_long, 0), "a"),
            Err(ApiError::TooLarge(_))
        ));
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        let ok = "é".repeat(MAX_MESSAGE_CHARS);
        assert!(admit(&body(&ok, 0), "a").is_ok());
    }

    #[test]
    fn context_entry_limit() {
        assert!(admit(&body("hi", MAX_CONTEXT_ENTRIES), "a").is_ok());
        assert!(matches!(
            admit(&body("hi", MAX_CONTEXT_ENTRIES + 1), "a"),
            Err(ApiError::TooLarge(_))
        ));
    }

    #[test]
    fn null_or_missing_context_means_no_history() {
        let request = admit(r#"{"message":"hi","conversation_context":null}"#, "a").unwrap();
        assert!(request.conversation_context.is_empty());

        let request = admit(r#"{"message":"hi"}"#, "a").unwrap();
        assert!(request.conversation_context.is_empty());
    }

    #[test]
    fn oversized_body_rejected_before_parsing() {
        let raw = format!("{{\"message\": \"{}\"", "y".repeat(MAX_REQUEST_CHARS));
        assert!(matches!(admit(&raw, "a"), Err(ApiError::TooLarge(_))));
    }

    #[test]
    fn malformed_body_is_bad_request() {
        assert!(matches!(admit("{\"msg\": 1}", "a"), Err(ApiError::BadRequest(_))));
        assert!(matches!(admit(&body("   ", 0), "a"), Err(ApiError::BadRequest(_))));
    }
}
