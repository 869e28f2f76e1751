//! Shared deterministic types for the agent core.
//!
//! These types define the contracts between the orchestrator, the inner agent
//! loop, the tool registry and the classifier. They carry no I/O handles.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of a single conversation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    ModelText,
    ToolCall,
    ToolResult,
}

impl EntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryKind::ModelText => "model_text",
            EntryKind::ToolCall => "tool_call",
            EntryKind::ToolResult => "tool_result",
        }
    }
}

/// One immutable step of a conversation.
///
/// Tool entries carry the tool name and the transport-assigned call id so a
/// transport can pair calls with their results when replaying history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub kind: EntryKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
}

impl ConversationEntry {
    pub fn model_text(content: impl Into<String>) -> Self {
        Self {
            kind: EntryKind::ModelText,
            content: content.into(),
            tool_name: None,
            call_id: None,
        }
    }

    pub fn tool_call(call: &ToolCall) -> Self {
        Self {
            kind: EntryKind::ToolCall,
            content: call.arguments.clone(),
            tool_name: Some(call.name.clone()),
            call_id: Some(call.id.clone()),
        }
    }

    pub fn tool_result(call: &ToolCall, result: &ToolResult) -> Self {
        Self {
            kind: EntryKind::ToolResult,
            content: result.to_conversation_text(),
            tool_name: Some(call.name.clone()),
            call_id: Some(call.id.clone()),
        }
    }
}

/// Append-only ordered record of conversation steps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversation {
    entries: Vec<ConversationEntry>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: ConversationEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[ConversationEntry] {
        &self.entries
    }

    /// The last `n` entries, oldest first.
    pub fn tail(&self, n: usize) -> &[ConversationEntry] {
        let start = self.entries.len().saturating_sub(n);
        &self.entries[start..]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Vec<ConversationEntry>> for Conversation {
    fn from(entries: Vec<ConversationEntry>) -> Self {
        Self { entries }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Serialized JSON argument object, exactly as emitted by the model.
    pub arguments: String,
}

/// Outcome of a tool invocation: a payload or an error message, never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolResult {
    Content(String),
    Error(String),
}

impl ToolResult {
    pub fn content(value: impl Into<String>) -> Self {
        ToolResult::Content(value.into())
    }

    pub fn error(message: impl Into<String>) -> Self {
        ToolResult::Error(message.into())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ToolResult::Error(_))
    }

    /// Text recorded in the conversation for this result.
    ///
    /// Errors are prefixed so that failure phrases in the classifier match them.
    pub fn to_conversation_text(&self) -> String {
        match self {
            ToolResult::Content(content) => content.clone(),
            ToolResult::Error(message) => format!("❌ Error: {message}"),
        }
    }
}

impl From<Result<String, String>> for ToolResult {
    fn from(result: Result<String, String>) -> Self {
        match result {
            Ok(content) => ToolResult::Content(content),
            Err(message) => ToolResult::Error(message),
        }
    }
}

/// Declared shape of a tool, as advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema object describing the named arguments.
    pub parameters: serde_json::Value,
}

/// Classifier verdict for a model reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Success,
    TokenLimitHit,
    ErrorLike,
}

/// Which orchestration variant drives the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Interactive,
    Unattended,
}

/// A protected region from the pre-task document that no longer appears verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreservationWarning {
    pub region: String,
}

impl fmt::Display for PreservationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Human-edited section '{}' was not preserved", self.region)
    }
}

/// Terminal outcome of a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Document changes were retained.
    Accepted { bytes: usize },
    /// The user stopped the task; the document was restored.
    Cancelled { reason: String },
    /// Retry budgets ran out or the model reported failure; the document was restored.
    Failed { detail: String },
}

/// Summary handed back to the caller once the task loop exits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    pub outcome: TaskOutcome,
    pub warnings: Vec<PreservationWarning>,
    /// Number of model turns executed.
    pub turns: u32,
}
