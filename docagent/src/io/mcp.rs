//! External tool providers reached over MCP streamable HTTP.
//!
//! Each configured provider gets one [`McpSession`]. Sessions are created per
//! task invocation and handed to the tool registry; nothing here is global.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use crate::core::types::ToolResult;
use crate::io::prompt::PromptOverrides;

pub const PROTOCOL_VERSION: &str = "2025-03-26";
const SESSION_HEADER: &str = "mcp-session-id";
/// Guard against providers that keep handing out cursors.
const MAX_LIST_PAGES: usize = 50;

/// Provider configuration file (`mcp.json`).
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct McpFile {
    pub initial_prompt_file: Option<PathBuf>,
    pub revision_prompt_file: Option<PathBuf>,
    pub mcp_servers: BTreeMap<String, ServerEntry>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerEntry {
    pub url: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub command: Option<String>,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

/// Read the provider file. A missing file yields `None`.
pub fn load_mcp_file(path: &Path) -> Result<Option<McpFile>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no provider file");
            return Ok(None);
        }
        Err(err) => return Err(err).with_context(|| format!("read {}", path.display())),
    };
    let file = serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    Ok(Some(file))
}

impl McpFile {
    /// Load the prompt template overrides. Relative paths resolve against `base_dir`.
    pub fn prompt_overrides(&self, base_dir: &Path) -> Result<PromptOverrides> {
        let read = |path: &Option<PathBuf>| -> Result<Option<String>> {
            let Some(path) = path else {
                return Ok(None);
            };
            let full = base_dir.join(path);
            let contents = fs::read_to_string(&full)
                .with_context(|| format!("read prompt file {}", full.display()))?;
            Ok(Some(contents))
        };
        Ok(PromptOverrides {
            initial: read(&self.initial_prompt_file)?,
            revision: read(&self.revision_prompt_file)?,
        })
    }
}

/// A tool advertised by a provider.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteTool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// One open session with a provider.
#[derive(Debug)]
pub struct McpSession {
    name: String,
    url: String,
    client: Client,
    call_timeout: Duration,
    session_id: RefCell<Option<String>>,
    next_id: Cell<u64>,
}

impl McpSession {
    /// Open a session: `initialize` then `notifications/initialized`.
    #[instrument(skip_all, fields(provider = name))]
    pub fn connect(
        name: &str,
        url: &str,
        headers: &BTreeMap<String, String>,
        call_timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .default_headers(header_map(headers)?)
            .connect_timeout(call_timeout)
            .build()
            .context("build provider http client")?;
        let session = Self {
            name: name.to_string(),
            url: url.to_string(),
            client,
            call_timeout,
            session_id: RefCell::new(None),
            next_id: Cell::new(1),
        };
        let init = session.request(
            "initialize",
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": { "name": "docagent", "version": env!("CARGO_PKG_VERSION") },
            }),
        )?;
        debug!(server = ?init.get("serverInfo"), "provider initialized");
        session.notify("notifications/initialized")?;
        Ok(session)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enumerate every advertised tool, following `nextCursor`.
    pub fn list_tools(&self) -> Result<Vec<RemoteTool>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        for _ in 0..MAX_LIST_PAGES {
            let params = match &cursor {
                Some(cursor) => json!({ "cursor": cursor }),
                None => json!({}),
            };
            let page = self.request("tools/list", params)?;
            let entries = page
                .get("tools")
                .and_then(Value::as_array)
                .ok_or_else(|| anyhow!("tools/list result has no tools array"))?;
            for entry in entries {
                tools.push(remote_tool(entry)?);
            }
            cursor = page
                .get("nextCursor")
                .and_then(Value::as_str)
                .filter(|next| !next.is_empty())
                .map(str::to_string);
            if cursor.is_none() {
                return Ok(tools);
            }
        }
        warn!(provider = %self.name, pages = MAX_LIST_PAGES, "stopped following tools/list cursors");
        Ok(tools)
    }

    /// Forward a call. Every failure is reported as a tool error.
    #[instrument(skip(self, arguments), fields(provider = %self.name))]
    pub fn call_tool(&self, tool: &str, arguments: Value) -> ToolResult {
        match self.request("tools/call", json!({ "name": tool, "arguments": arguments })) {
            Ok(result) => call_result(&result),
            Err(err) => {
                let timed_out = err
                    .chain()
                    .filter_map(|cause| cause.downcast_ref::<reqwest::Error>())
                    .any(reqwest::Error::is_timeout);
                if timed_out {
                    ToolResult::error(format!(
                        "tool '{tool}' on provider '{}' timed out after {}s",
                        self.name,
                        self.call_timeout.as_secs()
                    ))
                } else {
                    ToolResult::error(format!("{err:#}"))
                }
            }
        }
    }

    fn request(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        let response = self
            .post(&body)
            .with_context(|| format!("{method} request to provider '{}'", self.name))?;
        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
        {
            self.session_id.replace(Some(session.to_string()));
        }
        let is_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("text/event-stream"));
        let text = response
            .text()
            .with_context(|| format!("read {method} response from provider '{}'", self.name))?;
        let message = if is_stream {
            find_stream_message(&text, id)?
        } else {
            serde_json::from_str(&text)
                .with_context(|| format!("parse {method} response from provider '{}'", self.name))?
        };
        rpc_result(message)
    }

    fn notify(&self, method: &str) -> Result<()> {
        self.post(&json!({ "jsonrpc": "2.0", "method": method }))
            .with_context(|| format!("{method} notification to provider '{}'", self.name))?;
        Ok(())
    }

    fn post(&self, body: &Value) -> Result<Response> {
        let mut request = self
            .client
            .post(&self.url)
            .timeout(self.call_timeout)
            .header(ACCEPT, "application/json, text/event-stream")
            .json(body);
        if let Some(session) = self.session_id.borrow().as_deref() {
            request = request.header(SESSION_HEADER, session);
        }
        Ok(request.send()?.error_for_status()?)
    }
}

/// Sessions and tool lists for every reachable URL provider.
///
/// Command-based providers and providers that fail to connect or list are
/// skipped with a warning; the rest stay usable.
pub fn discover(file: &McpFile, call_timeout: Duration) -> Vec<(McpSession, Vec<RemoteTool>)> {
    let mut discovered = Vec::new();
    for (name, entry) in &file.mcp_servers {
        let Some(url) = entry.url.as_deref() else {
            if entry.command.is_some() {
                warn!(provider = %name, "skipping command-based provider; only url providers are supported");
            } else {
                warn!(provider = %name, "skipping provider without url");
            }
            continue;
        };
        let listed = McpSession::connect(name, url, &entry.headers, call_timeout)
            .and_then(|session| session.list_tools().map(|tools| (session, tools)));
        match listed {
            Ok((session, tools)) => {
                info!(provider = %name, tools = tools.len(), "discovered provider tools");
                discovered.push((session, tools));
            }
            Err(err) => warn!(provider = %name, error = %format!("{err:#}"), "provider unavailable"),
        }
    }
    discovered
}

fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let header = HeaderName::from_bytes(name.as_bytes())
            .with_context(|| format!("invalid header name '{name}'"))?;
        let value =
            HeaderValue::from_str(value).with_context(|| format!("invalid value for header '{name}'"))?;
        map.insert(header, value);
    }
    Ok(map)
}

fn remote_tool(entry: &Value) -> Result<RemoteTool> {
    let name = entry
        .get("name")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| anyhow!("advertised tool has no name"))?;
    let description = entry
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let schema = entry.get("inputSchema");
    let input_schema = json!({
        "type": "object",
        "properties": schema
            .and_then(|schema| schema.get("properties"))
            .cloned()
            .unwrap_or_else(|| json!({})),
        "required": schema
            .and_then(|schema| schema.get("required"))
            .cloned()
            .unwrap_or_else(|| json!([])),
    });
    Ok(RemoteTool {
        name: name.to_string(),
        description: description.to_string(),
        input_schema,
    })
}

/// Pick the JSON-RPC response with `id` out of an SSE body.
fn find_stream_message(body: &str, id: u64) -> Result<Value> {
    let mut data = String::new();
    let mut events = Vec::new();
    for line in body.lines() {
        if let Some(rest) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(rest.strip_prefix(' ').unwrap_or(rest));
        } else if line.is_empty() && !data.is_empty() {
            events.push(std::mem::take(&mut data));
        }
    }
    if !data.is_empty() {
        events.push(data);
    }
    for event in events {
        let Ok(message) = serde_json::from_str::<Value>(&event) else {
            continue;
        };
        if message.get("id").and_then(Value::as_u64) == Some(id) {
            return Ok(message);
        }
    }
    bail!("event stream ended without a response to request {id}")
}

fn rpc_result(message: Value) -> Result<Value> {
    if let Some(error) = message.get("error") {
        let text = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
        bail!("provider error {code}: {text}");
    }
    message
        .get("result")
        .cloned()
        .ok_or_else(|| anyhow!("response has neither result nor error"))
}

/// Translate a `tools/call` result into the uniform shape.
fn call_result(result: &Value) -> ToolResult {
    let texts: Vec<&str> = result
        .get("content")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter(|item| item.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|item| item.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();
    let text = if texts.is_empty() {
        result.to_string()
    } else {
        texts.join("\n")
    };
    if result.get("isError").and_then(Value::as_bool).unwrap_or(false) {
        ToolResult::Error(text)
    } else {
        ToolResult::Content(text)
    }
}
