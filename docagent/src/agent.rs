//! Inner tool-calling loop: one prompt, as many model round-trips as the
//! model needs tools for.

use anyhow::{Context, Result};
use tracing::{debug, instrument, trace, warn};

use crate::core::types::{Conversation, ConversationEntry, ToolSpec};
use crate::io::model::{ModelRequest, ModelTransport};
use crate::io::status::StatusIndicator;
use crate::tools::ToolRegistry;

/// Final content reported when the tool loop runs out of iterations.
pub const MAX_ITERATIONS_MESSAGE: &str = "Task did not complete within maximum iterations";

/// Outcome of one [`Agent::execute_task`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
    /// Text of the last reply (or [`MAX_ITERATIONS_MESSAGE`]).
    pub final_content: String,
    /// Entries produced during this call only.
    pub conversation: Conversation,
    /// The transport cut the last reply at the length limit.
    pub truncated: bool,
    pub iterations: u32,
}

pub struct Agent<'a, M> {
    model: &'a M,
    registry: &'a ToolRegistry,
    tools: Vec<ToolSpec>,
    max_iterations: u32,
    status: Option<&'a StatusIndicator>,
}

impl<'a, M: ModelTransport> Agent<'a, M> {
    pub fn new(model: &'a M, registry: &'a ToolRegistry, max_iterations: u32) -> Self {
        Self {
            model,
            registry,
            tools: registry.specs(),
            max_iterations,
            status: None,
        }
    }

    pub fn with_status(mut self, status: &'a StatusIndicator) -> Self {
        self.status = Some(status);
        self
    }

    /// Run `prompt` until the model stops requesting tools.
    ///
    /// Tool calls run in the order requested; their failures are fed back
    /// as results. Only transport errors end the call early.
    #[instrument(skip_all, fields(prompt_chars = prompt.len()))]
    pub fn execute_task(&self, prompt: &str) -> Result<TaskResult> {
        let mut conversation = Conversation::new();
        for iteration in 1..=self.max_iterations {
            let request = ModelRequest {
                prompt,
                conversation: conversation.entries(),
                tools: &self.tools,
            };
            let reply = self
                .model
                .complete(&request)
                .with_context(|| format!("model request failed on iteration {iteration}"))?;
            debug!(
                iteration,
                text_chars = reply.text.len(),
                tool_calls = reply.tool_calls.len(),
                truncated = reply.truncated,
                "model replied"
            );
            trace!(text = %reply.text, "model reply text");

            if !reply.text.trim().is_empty() {
                conversation.push(ConversationEntry::model_text(&reply.text));
            }
            if reply.tool_calls.is_empty() {
                return Ok(TaskResult {
                    final_content: reply.text,
                    conversation,
                    truncated: reply.truncated,
                    iterations: iteration,
                });
            }
            for call in &reply.tool_calls {
                conversation.push(ConversationEntry::tool_call(call));
                if let Some(status) = self.status {
                    status.update(&format!("Running {}", call.name));
                }
                let result = self.registry.invoke(call);
                trace!(tool = %call.name, result = %result.to_conversation_text(), "tool result");
                conversation.push(ConversationEntry::tool_result(call, &result));
            }
            if let Some(status) = self.status {
                status.update("Thinking");
            }
        }
        warn!(max_iterations = self.max_iterations, "tool loop hit the iteration limit");
        Ok(TaskResult {
            final_content: MAX_ITERATIONS_MESSAGE.to_string(),
            conversation,
            truncated: false,
            iterations: self.max_iterations,
        })
    }
}
