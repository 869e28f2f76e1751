//! Tools forwarded to an external provider session.

use std::rc::Rc;

use serde_json::Value;

use crate::core::types::{ToolResult, ToolSpec};
use crate::io::mcp::{McpSession, RemoteTool};

#[derive(Debug, Clone)]
pub struct BridgedTool {
    session: Rc<McpSession>,
    remote_name: String,
}

impl BridgedTool {
    /// Wrap every tool of one provider, sharing its session.
    pub fn from_provider(
        session: McpSession,
        tools: Vec<RemoteTool>,
    ) -> Vec<(ToolSpec, BridgedTool)> {
        let session = Rc::new(session);
        tools
            .into_iter()
            .map(|tool| {
                let spec = ToolSpec {
                    name: tool.name.clone(),
                    description: tool.description,
                    parameters: tool.input_schema,
                };
                let bridged = BridgedTool {
                    session: Rc::clone(&session),
                    remote_name: tool.name,
                };
                (spec, bridged)
            })
            .collect()
    }

    pub fn provider(&self) -> &str {
        self.session.name()
    }

    pub fn invoke(&self, arguments: Value) -> ToolResult {
        self.session.call_tool(&self.remote_name, arguments)
    }
}
