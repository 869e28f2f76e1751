//! Scripted collaborators and fixtures for unit and integration tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{Result, anyhow};
use serde_json::{Value, json};
use tempfile::TempDir;

use crate::core::types::{ToolCall, ToolSpec};
use crate::io::document::MANAGED_DOCUMENT_PATH;
use crate::io::interaction::{Console, InteractionError, UserPrompter};
use crate::io::manifest::{MANIFEST_FILE, read_manifest};
use crate::io::model::{ModelReply, ModelRequest, ModelTransport};
use crate::io::prompt::{PromptOverrides, Prompts};
use crate::io::sandbox::{PathSandbox, SandboxPolicy};
use crate::io::url_probe::UrlProbe;
use crate::tools::{ToolContext, ToolRegistry};

pub const TEST_MANIFEST: &str = "\
name: nginx
title: Nginx
type: integration
version: 1.2.0
description: Collect logs and metrics from Nginx.
";

/// Temporary package root holding a manifest.
pub struct TestPackage {
    dir: TempDir,
}

impl Default for TestPackage {
    fn default() -> Self {
        Self::new()
    }
}

impl TestPackage {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join(MANIFEST_FILE), TEST_MANIFEST).expect("write manifest");
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root().join(relative)
    }

    pub fn write(&self, relative: &str, content: &str) {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(path, content).expect("write file");
    }

    pub fn write_document(&self, content: &str) {
        self.write(MANAGED_DOCUMENT_PATH, content);
    }

    /// Managed document content, `None` when absent.
    pub fn document(&self) -> Option<String> {
        fs::read_to_string(self.path(MANAGED_DOCUMENT_PATH)).ok()
    }

    pub fn tool_context(&self) -> ToolContext {
        ToolContext {
            sandbox: PathSandbox::new(self.root(), SandboxPolicy::default()),
            url_probe: UrlProbe::new(Duration::from_secs(1)).expect("url probe"),
        }
    }

    pub fn registry(&self) -> ToolRegistry {
        ToolRegistry::with_local_tools(self.tool_context()).expect("registry")
    }

    pub fn prompts(&self, registry: &ToolRegistry) -> Prompts {
        let manifest = read_manifest(self.root()).expect("manifest");
        Prompts::new(manifest, &registry.specs(), PromptOverrides::default())
    }
}

/// Reply that only requests `calls`.
pub fn tool_reply(text: &str, calls: Vec<ToolCall>) -> ModelReply {
    ModelReply {
        text: text.to_string(),
        tool_calls: calls,
        truncated: false,
    }
}

/// Reply requesting a single `write_file` of the managed document.
pub fn write_reply(id: &str, content: &str) -> ModelReply {
    tool_reply(
        "",
        vec![ToolCall {
            id: id.to_string(),
            name: "write_file".to_string(),
            arguments: json!({ "path": MANAGED_DOCUMENT_PATH, "content": content }).to_string(),
        }],
    )
}

/// What the scripted model was asked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedModelRequest {
    pub prompt: String,
    pub conversation_len: usize,
    pub tools: Vec<String>,
}

/// Model transport answering from a queue; an empty queue is a transport failure.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    replies: RefCell<VecDeque<ModelReply>>,
    requests: RefCell<Vec<RecordedModelRequest>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<ModelReply>) -> Self {
        Self {
            replies: RefCell::new(replies.into()),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<RecordedModelRequest> {
        self.requests.borrow().clone()
    }

    pub fn remaining(&self) -> usize {
        self.replies.borrow().len()
    }
}

impl ModelTransport for ScriptedModel {
    fn complete(&self, request: &ModelRequest<'_>) -> Result<ModelReply> {
        self.requests.borrow_mut().push(RecordedModelRequest {
            prompt: request.prompt.to_string(),
            conversation_len: request.conversation.len(),
            tools: request.tools.iter().map(|spec: &ToolSpec| spec.name.clone()).collect(),
        });
        self.replies
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted model has no reply left"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Answer {
    Choice(String),
    Text(String),
    Cancel,
}

/// Prompter answering from a queue. Runs out as a cancellation.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: VecDeque<Answer>,
    questions: Vec<String>,
}

impl ScriptedPrompter {
    pub fn choose(mut self, choice: &str) -> Self {
        self.answers.push_back(Answer::Choice(choice.to_string()));
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.answers.push_back(Answer::Text(text.to_string()));
        self
    }

    pub fn cancel(mut self) -> Self {
        self.answers.push_back(Answer::Cancel);
        self
    }

    /// Questions asked so far, in order.
    pub fn questions(&self) -> Vec<String> {
        self.questions.clone()
    }
}

impl UserPrompter for ScriptedPrompter {
    fn select(
        &mut self,
        question: &str,
        choices: &[&str],
        _default: &str,
    ) -> Result<String, InteractionError> {
        self.questions.push(question.to_string());
        match self.answers.pop_front() {
            Some(Answer::Choice(choice)) => {
                assert!(
                    choices.contains(&choice.as_str()),
                    "scripted choice '{choice}' not offered for '{question}': {choices:?}"
                );
                Ok(choice)
            }
            Some(Answer::Text(text)) => panic!("expected a choice for '{question}', got text '{text}'"),
            Some(Answer::Cancel) | None => Err(InteractionError::Cancelled),
        }
    }

    fn text(&mut self, question: &str) -> Result<String, InteractionError> {
        self.questions.push(question.to_string());
        match self.answers.pop_front() {
            Some(Answer::Text(text)) => Ok(text),
            Some(Answer::Choice(choice)) => panic!("expected text for '{question}', got choice '{choice}'"),
            Some(Answer::Cancel) | None => Err(InteractionError::Cancelled),
        }
    }
}

/// Console capturing everything shown.
#[derive(Debug, Default)]
pub struct RecordingConsole {
    pub notices: Vec<String>,
    pub documents: Vec<(String, String)>,
}

impl Console for RecordingConsole {
    fn show_document(&mut self, title: &str, content: &str) {
        self.documents.push((title.to_string(), content.to_string()));
    }

    fn notice(&mut self, message: &str) {
        self.notices.push(message.to_string());
    }
}

/// Canned HTTP response.
#[derive(Debug, Clone)]
pub struct HttpReply {
    status: u16,
    headers: Vec<(String, String)>,
    body: String,
    delay: Duration,
}

impl HttpReply {
    pub fn status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: String::new(),
            delay: Duration::ZERO,
        }
    }

    pub fn json(value: &Value) -> Self {
        Self::status(200)
            .with_header("Content-Type", "application/json")
            .with_body(&value.to_string())
    }

    /// Single-event `text/event-stream` body carrying `value`.
    pub fn sse(value: &Value) -> Self {
        Self::status(200)
            .with_header("Content-Type", "text/event-stream")
            .with_body(&format!("event: message\ndata: {value}\n\n"))
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: &str) -> Self {
        self.body = body.to_string();
        self
    }

    /// Wait before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// A request the fake server received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).expect("request body is json")
    }
}

/// Loopback HTTP/1.1 server answering one connection per queued reply.
///
/// With no replies the port is released immediately, so connections are refused.
pub struct FakeHttpServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl FakeHttpServer {
    pub fn start(replies: Vec<HttpReply>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
        let addr = listener.local_addr().expect("local addr");
        let requests = Arc::new(Mutex::new(Vec::new()));
        if !replies.is_empty() {
            let recorded = Arc::clone(&requests);
            thread::spawn(move || serve(&listener, replies, &recorded));
        }
        Self { addr, requests }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

fn serve(listener: &TcpListener, replies: Vec<HttpReply>, recorded: &Mutex<Vec<RecordedRequest>>) {
    for reply in replies {
        let Ok((stream, _)) = listener.accept() else {
            return;
        };
        let Some(request) = read_request(&stream) else {
            continue;
        };
        recorded.lock().expect("requests lock").push(request);
        thread::sleep(reply.delay);
        let _ = write_reply_to(stream, &reply);
    }
}

fn read_request(stream: &TcpStream) -> Option<RecordedRequest> {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line).ok()?;
    let mut parts = line.split_whitespace();
    let method = parts.next()?.to_string();
    let path = parts.next()?.to_string();

    let mut headers = Vec::new();
    loop {
        let mut header = String::new();
        reader.read_line(&mut header).ok()?;
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }
    let length = headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = vec![0; length];
    reader.read_exact(&mut body).ok()?;
    Some(RecordedRequest {
        method,
        path,
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

fn write_reply_to(mut stream: TcpStream, reply: &HttpReply) -> std::io::Result<()> {
    let mut head = format!(
        "HTTP/1.1 {} Fake\r\nContent-Length: {}\r\nConnection: close\r\n",
        reply.status,
        reply.body.len()
    );
    for (name, value) in &reply.headers {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    head.push_str("\r\n");
    stream.write_all(head.as_bytes())?;
    stream.write_all(reply.body.as_bytes())?;
    stream.flush()
}
