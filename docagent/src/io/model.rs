//! Language-model transport.
//!
//! [`ModelTransport`] is the seam the agent loop talks to. The production
//! implementation speaks the OpenAI-compatible chat completions protocol.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, instrument, trace};

use crate::core::types::{ConversationEntry, EntryKind, ToolCall, ToolSpec};
use crate::io::config::ModelConfig;

/// One model round-trip.
#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    pub prompt: &'a str,
    /// Entries produced so far in this turn, oldest first.
    pub conversation: &'a [ConversationEntry],
    pub tools: &'a [ToolSpec],
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelReply {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    /// The transport stopped generation at the length limit.
    pub truncated: bool,
}

impl ModelReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

pub trait ModelTransport {
    /// Failures are task-fatal.
    fn complete(&self, request: &ModelRequest<'_>) -> Result<ModelReply>;
}

/// `POST {endpoint}/chat/completions` with bearer auth.
#[derive(Debug, Clone)]
pub struct ChatCompletionsTransport {
    client: Client,
    url: String,
    model: String,
    api_key: Option<String>,
    max_tokens: Option<u32>,
}

impl ChatCompletionsTransport {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("build model http client")?;
        let api_key = env::var(&config.api_key_env).ok().filter(|key| !key.is_empty());
        if api_key.is_none() {
            debug!(env = %config.api_key_env, "no api key set, sending unauthenticated requests");
        }
        Ok(Self {
            client,
            url: format!("{}/chat/completions", config.endpoint.trim_end_matches('/')),
            model: config.model.clone(),
            api_key,
            max_tokens: config.max_tokens,
        })
    }

    fn body(&self, request: &ModelRequest<'_>) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": messages(request.prompt, request.conversation),
        });
        if !request.tools.is_empty() {
            body["tools"] = request
                .tools
                .iter()
                .map(|spec| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": spec.name,
                            "description": spec.description,
                            "parameters": spec.parameters,
                        }
                    })
                })
                .collect();
        }
        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        body
    }
}

impl ModelTransport for ChatCompletionsTransport {
    #[instrument(skip_all, fields(model = %self.model, entries = request.conversation.len()))]
    fn complete(&self, request: &ModelRequest<'_>) -> Result<ModelReply> {
        let mut http = self.client.post(&self.url).json(&self.body(request));
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key);
        }
        let response = http
            .send()
            .with_context(|| format!("send model request to {}", self.url))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(anyhow!("model request failed with status {status}: {text}"));
        }
        let completion: Completion = response.json().context("parse model response")?;
        let reply = completion.into_reply()?;
        trace!(text = %reply.text, "model reply");
        debug!(
            chars = reply.text.len(),
            tool_calls = reply.tool_calls.len(),
            truncated = reply.truncated,
            "model replied"
        );
        Ok(reply)
    }
}

/// Build the chat message list: the prompt, then the turn so far.
///
/// A model text entry followed by tool calls becomes one assistant message.
fn messages(prompt: &str, conversation: &[ConversationEntry]) -> Vec<Value> {
    let mut messages = vec![json!({ "role": "user", "content": prompt })];
    let mut open_assistant: Option<Value> = None;
    for entry in conversation {
        match entry.kind {
            EntryKind::ModelText => {
                messages.extend(open_assistant.take());
                open_assistant = Some(json!({ "role": "assistant", "content": entry.content }));
            }
            EntryKind::ToolCall => {
                let assistant = open_assistant
                    .get_or_insert_with(|| json!({ "role": "assistant", "content": Value::Null }));
                let call = json!({
                    "id": entry.call_id,
                    "type": "function",
                    "function": { "name": entry.tool_name, "arguments": entry.content },
                });
                match assistant.get_mut("tool_calls").and_then(Value::as_array_mut) {
                    Some(calls) => calls.push(call),
                    None => assistant["tool_calls"] = json!([call]),
                }
            }
            EntryKind::ToolResult => {
                messages.extend(open_assistant.take());
                messages.push(json!({
                    "role": "tool",
                    "tool_call_id": entry.call_id,
                    "content": entry.content,
                }));
            }
        }
    }
    messages.extend(open_assistant);
    messages
}

#[derive(Debug, Deserialize)]
struct Completion {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

impl Completion {
    fn into_reply(self) -> Result<ModelReply> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("model response has no choices"))?;
        Ok(ModelReply {
            text: choice.message.content.unwrap_or_default(),
            tool_calls: choice
                .message
                .tool_calls
                .into_iter()
                .map(|call| ToolCall {
                    id: call.id,
                    name: call.function.name,
                    arguments: call.function.arguments,
                })
                .collect(),
            truncated: choice.finish_reason.as_deref() == Some("length"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ToolResult;
    use crate::test_support::{FakeHttpServer, HttpReply};

    fn transport(server: &FakeHttpServer) -> ChatCompletionsTransport {
        let config = ModelConfig {
            endpoint: server.url("/v1/"),
            api_key_env: "DOCAGENT_TEST_UNSET_KEY".to_string(),
            max_tokens: Some(512),
            ..ModelConfig::default()
        };
        ChatCompletionsTransport::new(&config).expect("transport")
    }

    #[test]
    fn conversation_maps_to_chat_messages() {
        let call = ToolCall {
            id: "call-1".to_string(),
            name: "read_file".to_string(),
            arguments: r#"{"path":"manifest.yml"}"#.to_string(),
        };
        let conversation = vec![
            ConversationEntry::model_text("Reading the manifest."),
            ConversationEntry::tool_call(&call),
            ConversationEntry::tool_result(&call, &ToolResult::content("name: demo")),
        ];
        let messages = messages("do it", &conversation);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[1]["content"], "Reading the manifest.");
        assert_eq!(messages[1]["tool_calls"][0]["function"]["name"], "read_file");
        assert_eq!(messages[2]["role"], "tool");
        assert_eq!(messages[2]["tool_call_id"], "call-1");
    }

    #[test]
    fn parses_tool_calls_and_length_stop() {
        let server = FakeHttpServer::start(vec![HttpReply::json(&json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call-9",
                        "type": "function",
                        "function": { "name": "get_readme_template", "arguments": "{}" }
                    }]
                },
                "finish_reason": "length"
            }]
        }))]);
        let spec = ToolSpec {
            name: "get_readme_template".to_string(),
            description: "template".to_string(),
            parameters: json!({ "type": "object", "properties": {} }),
        };
        let reply = transport(&server)
            .complete(&ModelRequest {
                prompt: "hello",
                conversation: &[],
                tools: &[spec],
            })
            .expect("complete");

        assert_eq!(reply.text, "");
        assert!(reply.truncated);
        assert_eq!(reply.tool_calls[0].id, "call-9");

        let request = &server.requests()[0];
        assert_eq!(request.path, "/v1/chat/completions");
        let body = request.json();
        assert_eq!(body["max_tokens"], 512);
        assert_eq!(body["tools"][0]["function"]["name"], "get_readme_template");
        assert!(request.header("authorization").is_none());
    }

    #[test]
    fn http_failure_is_an_error() {
        let server = FakeHttpServer::start(vec![HttpReply::status(500).with_body("boom")]);
        let err = transport(&server)
            .complete(&ModelRequest {
                prompt: "hello",
                conversation: &[],
                tools: &[],
            })
            .unwrap_err();
        assert!(format!("{err:#}").contains("500"));
    }
}
