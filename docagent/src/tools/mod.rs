//! Tool registry: local and bridged tools behind one invocation contract.

pub mod bridge;
pub mod local;

use anyhow::{Result, anyhow, bail};
use jsonschema::{Validator, validator_for};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::core::types::{ToolCall, ToolResult, ToolSpec};
use crate::io::mcp::{McpSession, RemoteTool};

pub use bridge::BridgedTool;
pub use local::{LocalTool, ToolContext};

/// Where a tool's invocation is carried out.
#[derive(Debug, Clone)]
pub enum ToolKind {
    Local(LocalTool),
    Bridged(BridgedTool),
}

pub struct Tool {
    spec: ToolSpec,
    validator: Validator,
    kind: ToolKind,
}

impl Tool {
    pub fn new(spec: ToolSpec, kind: ToolKind) -> Result<Self> {
        let validator = validator_for(&spec.parameters)
            .map_err(|err| anyhow!("tool '{}' has an invalid parameter schema: {err}", spec.name))?;
        Ok(Self {
            spec,
            validator,
            kind,
        })
    }

    pub fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    pub fn kind(&self) -> &ToolKind {
        &self.kind
    }

    /// Parse and validate `arguments`, then dispatch.
    ///
    /// Malformed or schema-violating arguments come back as tool errors.
    pub fn invoke(&self, ctx: &ToolContext, arguments: &str) -> ToolResult {
        let arguments = if arguments.trim().is_empty() {
            "{}"
        } else {
            arguments
        };
        let value: Value = match serde_json::from_str(arguments) {
            Ok(value) => value,
            Err(err) => return ToolResult::error(format!("failed to parse arguments: {err}")),
        };
        let problems: Vec<String> = self
            .validator
            .iter_errors(&value)
            .map(|err| err.to_string())
            .collect();
        if !problems.is_empty() {
            return ToolResult::error(format!("invalid arguments: {}", problems.join("; ")));
        }
        match &self.kind {
            ToolKind::Local(tool) => tool.invoke(ctx, value),
            ToolKind::Bridged(tool) => tool.invoke(value),
        }
    }
}

/// Ordered set of uniquely named tools for one task.
pub struct ToolRegistry {
    tools: Vec<Tool>,
    context: ToolContext,
}

impl ToolRegistry {
    pub fn new(context: ToolContext) -> Self {
        Self {
            tools: Vec::new(),
            context,
        }
    }

    /// Registry holding the fixed local tools.
    pub fn with_local_tools(context: ToolContext) -> Result<Self> {
        let mut registry = Self::new(context);
        for tool in LocalTool::ALL {
            registry.register(Tool::new(tool.spec(), ToolKind::Local(tool))?)?;
        }
        Ok(registry)
    }

    /// Add a tool. A name already in use is a configuration error.
    pub fn register(&mut self, tool: Tool) -> Result<()> {
        if let Some(existing) = self.get(&tool.spec.name) {
            let origin = match existing.kind() {
                ToolKind::Local(_) => "a local tool".to_string(),
                ToolKind::Bridged(bridged) => format!("a tool from provider '{}'", bridged.provider()),
            };
            bail!("tool name '{}' collides with {origin}", tool.spec.name);
        }
        debug!(tool = %tool.spec.name, "registered tool");
        self.tools.push(tool);
        Ok(())
    }

    /// Wrap and register every tool a provider advertised.
    ///
    /// Tools with an unusable schema are skipped; name collisions fail.
    pub fn register_provider(&mut self, session: McpSession, tools: Vec<RemoteTool>) -> Result<()> {
        let provider = session.name().to_string();
        for (spec, bridged) in BridgedTool::from_provider(session, tools) {
            let name = spec.name.clone();
            match Tool::new(spec, ToolKind::Bridged(bridged)) {
                Ok(tool) => self
                    .register(tool)
                    .map_err(|err| anyhow!("provider '{provider}': {err}"))?,
                Err(err) => warn!(provider = %provider, tool = %name, error = %err, "skipping tool"),
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.iter().find(|tool| tool.spec.name == name)
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|tool| tool.spec.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    #[instrument(skip_all, fields(tool = %call.name, call_id = %call.id))]
    pub fn invoke(&self, call: &ToolCall) -> ToolResult {
        let Some(tool) = self.get(&call.name) else {
            warn!("model requested an unknown tool");
            return ToolResult::error(format!("unknown tool '{}'", call.name));
        };
        let result = tool.invoke(&self.context, &call.arguments);
        debug!(is_error = result.is_error(), "tool finished");
        result
    }
}
