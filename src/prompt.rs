use crate::llm::ChatMessage;
use crate::models::{ContextMessage, Role};
use crate::tools::bio::Bio;

/// Most recent history entries forwarded to the model.
pub const MAX_HISTORY_MESSAGES: usize = 20;
/// Per-entry cap on forwarded history text.
pub const MAX_HISTORY_CHARS: usize = 4_000;
const MAX_BIO_CONTEXT_CHARS: usize = 3_000;

// Token accounting buffer on top of the character estimate
pub const SYSTEM_PROMPT_TOKENS: u64 = 800;
pub const TOOL_OVERHEAD_TOKENS: u64 = 500;

pub const SYSTEM_RULES: &str = "\
You are the AI agent of a developer's portfolio site and answer visitors' questions about the owner.

Rules you must follow:
1) Scope: answer about the owner, their skills, projects, repositories and related technology. For anything else, say you are limited to that and offer to steer back.
2) Honesty: if you do not know, say so and suggest how to find out, for example by looking at a repository.
3) Sources: when stating facts about code, name the repository and file path, and link pull request numbers or commit SHAs when you have them.
4) Privacy: never reveal secrets, tokens, configuration or environment values.
5) Length: keep answers short (under about ten sentences) and use bullets for lists.
6) Grounding: prefer quoting the bio or repository content over guessing. Never invent file paths.
7) Tools: use the bio tools for personal facts and the GitHub tools for code questions.
8) When asked what the owner contributed to a project, look at commits and pull requests authored by the owner's GitHub account first, and explain any ambiguity (co-authored commits, pair work).

Be friendly and precise. For large repositories, summarize and offer to go deeper on request.";

pub fn trim_text(s: &str, max_chars: usize) -> String {
    let s = s.trim();
    match s.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{} …[truncated]", &s[..cut]),
        None => s.to_string(),
    }
}

pub fn system_prompt(bio: &Bio, github_user: &str) -> String {
    let mut prompt = SYSTEM_RULES.to_string();
    if !github_user.is_empty() {
        prompt.push_str(&format!("\n\nThe owner's GitHub account is {}.", github_user));
    }
    if !bio.is_empty() {
        prompt.push_str("\n\nBIO (summary):\n");
        prompt.push_str(&trim_text(&bio.to_json(), MAX_BIO_CONTEXT_CHARS));
    }
    prompt
}

/// System prompt, then the tail of the client's history, then the new message.
/// Client-supplied system turns are dropped.
pub fn build_messages(system: &str, history: &[ContextMessage], message: &str) -> Vec<ChatMessage> {
    let kept: Vec<&ContextMessage> = history.iter().filter(|m| m.role != Role::System).collect();
    let tail = &kept[kept.len().saturating_sub(MAX_HISTORY_MESSAGES)..];

    let mut messages = Vec::with_capacity(tail.len() + 2);
    messages.push(ChatMessage::text("system", system));
    for m in tail {
        let role = match m.role {
            Role::Assistant => "assistant",
            _ => "user",
        };
        messages.push(ChatMessage::text(role, trim_text(&m.content, MAX_HISTORY_CHARS)));
    }
    messages.push(ChatMessage::text("user", message.trim()));
    messages
}

/// Rough token count for usage accounting: four characters per token plus a fixed
/// allowance for the system prompt, tool schemas and the expected answer.
pub fn estimate_tokens(message: &str, history: &[ContextMessage], max_output_tokens: u32) -> u64 {
    let chars = message.chars().count()
        + history.iter().map(|m| m.content.chars().count()).sum::<usize>();
    chars as u64 / 4 + SYSTEM_PROMPT_TOKENS + TOOL_OVERHEAD_TOKENS + max_output_tokens as u64
}
