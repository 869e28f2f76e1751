//! Deterministic classification of model replies.
//!
//! Classification is plain case-insensitive phrase matching over the reply
//! text and the tail of the conversation. [`ResponseClassifier`] is the seam
//! for replacing it with a structured signal.

use std::sync::LazyLock;

use regex::{RegexSet, RegexSetBuilder};

use crate::core::types::{Classification, ConversationEntry, EntryKind};

/// Phrases that mark a reply as cut short by the response length limit.
pub const TOKEN_LIMIT_PHRASES: &[&str] = &[
    "I reached the maximum response length",
    "maximum response length",
    "reached the token limit",
    "response is too long",
    "breaking this into smaller tasks",
    "due to length constraints",
    "response length limit",
    "token limit reached",
    "output limit exceeded",
    "maximum length exceeded",
];

/// Phrases that mark a reply as an apparent task failure.
pub const FAILURE_PHRASES: &[&str] = &[
    "I encountered an error",
    "I'm experiencing an error",
    "I cannot complete",
    "I'm unable to complete",
    "Something went wrong",
    "There was an error",
    "I'm having trouble",
    "I failed to",
    "Error occurred",
    "Task did not complete within maximum iterations",
];

/// Tool-result phrases that mean the tool did its job.
pub const TOOL_SUCCESS_PHRASES: &[&str] = &[
    "✅ success",
    "successfully wrote",
    "completed successfully",
];

/// Tool-result phrases that mean the tool failed.
pub const TOOL_FAILURE_PHRASES: &[&str] = &["❌ error", "failed:", "access denied"];

/// How many trailing conversation entries are inspected for tool outcomes.
pub const RECENT_ENTRY_WINDOW: usize = 5;

static TOKEN_LIMIT_SET: LazyLock<RegexSet> = LazyLock::new(|| phrase_set(TOKEN_LIMIT_PHRASES));
static FAILURE_SET: LazyLock<RegexSet> = LazyLock::new(|| phrase_set(FAILURE_PHRASES));
static TOOL_SUCCESS_SET: LazyLock<RegexSet> =
    LazyLock::new(|| phrase_set(TOOL_SUCCESS_PHRASES));
static TOOL_FAILURE_SET: LazyLock<RegexSet> =
    LazyLock::new(|| phrase_set(TOOL_FAILURE_PHRASES));

fn phrase_set(phrases: &[&str]) -> RegexSet {
    RegexSetBuilder::new(phrases.iter().map(|phrase| regex::escape(phrase)))
        .case_insensitive(true)
        .build()
        .expect("escaped literal phrases always compile")
}

/// Strategy deciding what a model reply means for the orchestrator.
pub trait ResponseClassifier {
    fn classify(&self, reply: &str, conversation_tail: &[ConversationEntry]) -> Classification;
}

/// Default classifier built on the fixed phrase lists above.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhraseClassifier;

impl ResponseClassifier for PhraseClassifier {
    fn classify(&self, reply: &str, conversation_tail: &[ConversationEntry]) -> Classification {
        classify_reply(reply, conversation_tail)
    }
}

/// Classify `reply` given the most recent conversation entries.
///
/// - `TokenLimitHit` wins over everything else.
/// - Empty replies are `Success`.
/// - A failure phrase yields `ErrorLike` unless the latest decisive tool
///   result in the window reported success.
pub fn classify_reply(reply: &str, conversation_tail: &[ConversationEntry]) -> Classification {
    if is_token_limit_message(reply) {
        return Classification::TokenLimitHit;
    }
    if reply.trim().is_empty() {
        return Classification::Success;
    }
    if !FAILURE_SET.is_match(reply) {
        return Classification::Success;
    }
    if has_recent_successful_tools(conversation_tail) {
        return Classification::Success;
    }
    Classification::ErrorLike
}

pub fn is_token_limit_message(reply: &str) -> bool {
    TOKEN_LIMIT_SET.is_match(reply)
}

/// Walk the last [`RECENT_ENTRY_WINDOW`] entries newest-first and report
/// whether a successful tool result is seen before a failed one.
pub fn has_recent_successful_tools(conversation_tail: &[ConversationEntry]) -> bool {
    let start = conversation_tail.len().saturating_sub(RECENT_ENTRY_WINDOW);
    for entry in conversation_tail[start..].iter().rev() {
        if entry.kind != EntryKind::ToolResult {
            continue;
        }
        if TOOL_SUCCESS_SET.is_match(&entry.content) {
            return true;
        }
        if TOOL_FAILURE_SET.is_match(&entry.content) {
            return false;
        }
    }
    false
}
