//! Message-list construction for the completion call, and the light
//! post-processing applied to what comes back.

use regex::Regex;
use std::sync::LazyLock;

use crate::llm::{ChatMessage, ChatRole};
use crate::types::{HistoryEntry, PageContext};

/// Page content forwarded to the model is capped at this many characters.
pub const PAGE_CONTENT_LIMIT: usize = 1000;

static CODE_FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[A-Za-z0-9_+-]*[ \t]*\r?\n?").expect("code fence regex is valid"));

/// Keep only entries with a known role and non-blank content, in order.
pub fn sanitize_history(history: &[HistoryEntry]) -> Vec<ChatMessage> {
    history
        .iter()
        .filter_map(|entry| {
            let role = ChatRole::parse(entry.role.as_deref()?)?;
            let content = entry.content.as_deref()?;
            if content.trim().is_empty() {
                return None;
            }
            Some(ChatMessage { role, content: content.to_string() })
        })
        .collect()
}

/// Text of the most recent assistant turn, used to resolve location follow-ups.
pub fn previous_assistant_turn(history: &[ChatMessage]) -> Option<&str> {
    history
        .iter()
        .rev()
        .find(|m| m.role == ChatRole::Assistant)
        .map(|m| m.content.as_str())
}

/// "Visitor is currently viewing" block, or `None` when the widget sent
/// nothing usable.
pub fn page_context_block(page: &PageContext) -> Option<String> {
    fn field(value: &Option<String>) -> Option<&str> {
        value.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }

    let mut lines = Vec::new();
    if let Some(page_type) = field(&page.page_type).filter(|t| *t != "unknown") {
        lines.push(format!("Page type: {}", page_type));
    }
    if let Some(title) = field(&page.title) {
        lines.push(format!("Title: {}", title));
    }
    if let Some(url) = field(&page.url) {
        lines.push(format!("URL: {}", url));
    }
    if let Some(content) = field(&page.content) {
        let excerpt: String = content.chars().take(PAGE_CONTENT_LIMIT).collect();
        lines.push(format!("Visible content:\n{}", excerpt));
    }

    if lines.is_empty() {
        return None;
    }
    Some(format!(
        "# PAGE CONTEXT\nThe visitor is currently viewing this page. Use it when the question refers to \
         \"this page\" or its content.\n{}",
        lines.join("\n")
    ))
}

/// Join the non-empty prompt sections with blank lines.
pub fn compose_system_prompt<'a>(sections: impl IntoIterator<Item = &'a str>) -> String {
    sections
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// System turn, then prior turns in order, then the new user turn.
pub fn build_messages(system_prompt: String, history: Vec<ChatMessage>, user_message: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(system_prompt));
    messages.extend(history);
    messages.push(ChatMessage::user(user_message));
    messages
}

/// Remove literal ``` delimiters (with any language tag) so embedded HTML
/// renders in the widget instead of showing as a code block.
pub fn strip_code_fences(text: &str) -> String {
    CODE_FENCE_RE.replace_all(text, "").trim().to_string()
}
