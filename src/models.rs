use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

// One prior turn sent by the client
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct ContextMessage {
    pub role: Role,
    pub content: String,
}

// POST /chat body
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub conversation_context: Vec<ContextMessage>,
}

// Absent and null both mean no history
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<ContextMessage>, D::Error>
where
    D: Deserializer<'de>,
{
    let context: Option<Vec<ContextMessage>> = Option::deserialize(deserializer)?;
    Ok(context.unwrap_or_default())
}

// POST /chat answer
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct ChatResponse {
    pub response: String,
    pub timestamp: DateTime<Utc>,
    pub tokens_used: u64,
    pub model: String,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}
