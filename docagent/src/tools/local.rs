//! In-process tools.

use std::fmt::Write as _;

use serde::Deserialize;
use serde_json::{Value, json};

use crate::core::types::{ToolResult, ToolSpec};
use crate::io::sandbox::PathSandbox;
use crate::io::url_probe::UrlProbe;

const README_TEMPLATE: &str = include_str!("templates/readme_template.md");
const EXAMPLE_README: &str = include_str!("templates/example_readme.md");

/// Handles shared by the local tools for one task.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub sandbox: PathSandbox,
    pub url_probe: UrlProbe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalTool {
    ListDirectory,
    ReadFile,
    WriteFile,
    ReadmeTemplate,
    ExampleReadme,
    ValidateUrl,
}

#[derive(Debug, Deserialize)]
struct PathArgs {
    path: String,
}

#[derive(Debug, Deserialize)]
struct WriteArgs {
    path: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct UrlArgs {
    url: String,
}

impl LocalTool {
    /// Registration order.
    pub const ALL: [LocalTool; 6] = [
        LocalTool::ListDirectory,
        LocalTool::ReadFile,
        LocalTool::WriteFile,
        LocalTool::ReadmeTemplate,
        LocalTool::ExampleReadme,
        LocalTool::ValidateUrl,
    ];

    pub fn name(self) -> &'static str {
        match self {
            LocalTool::ListDirectory => "list_directory",
            LocalTool::ReadFile => "read_file",
            LocalTool::WriteFile => "write_file",
            LocalTool::ReadmeTemplate => "get_readme_template",
            LocalTool::ExampleReadme => "get_example_readme",
            LocalTool::ValidateUrl => "validate_url",
        }
    }

    pub fn spec(self) -> ToolSpec {
        let path = json!({ "type": "string", "description": "Path relative to the package root" });
        let (description, parameters) = match self {
            LocalTool::ListDirectory => (
                "List files and directories at a path inside the package (empty path for the root).",
                json!({ "type": "object", "properties": { "path": path }, "required": ["path"] }),
            ),
            LocalTool::ReadFile => (
                "Read a file inside the package.",
                json!({ "type": "object", "properties": { "path": path }, "required": ["path"] }),
            ),
            LocalTool::WriteFile => (
                "Write a whole file. Only paths under _dev/build/docs/ are writable.",
                json!({
                    "type": "object",
                    "properties": {
                        "path": path,
                        "content": { "type": "string", "description": "Full file content" },
                    },
                    "required": ["path", "content"],
                }),
            ),
            LocalTool::ReadmeTemplate => (
                "Get the README template whose sections the document must follow.",
                json!({ "type": "object", "properties": {}, "required": [] }),
            ),
            LocalTool::ExampleReadme => (
                "Get an example README showing the expected quality, detail and formatting.",
                json!({ "type": "object", "properties": {}, "required": [] }),
            ),
            LocalTool::ValidateUrl => (
                "Check that a URL is well-formed http(s) and reachable. Returns JSON with validity, reachability and issues.",
                json!({
                    "type": "object",
                    "properties": { "url": { "type": "string", "description": "The URL to check" } },
                    "required": ["url"],
                }),
            ),
        };
        ToolSpec {
            name: self.name().to_string(),
            description: description.to_string(),
            parameters,
        }
    }

    /// Run the tool on schema-validated arguments.
    pub fn invoke(self, ctx: &ToolContext, arguments: Value) -> ToolResult {
        match self {
            LocalTool::ListDirectory => parse::<PathArgs>(arguments)
                .and_then(|args| list_directory(&ctx.sandbox, &args.path))
                .into(),
            LocalTool::ReadFile => parse::<PathArgs>(arguments)
                .and_then(|args| ctx.sandbox.read_to_string(&args.path))
                .into(),
            LocalTool::WriteFile => parse::<WriteArgs>(arguments)
                .and_then(|args| {
                    ctx.sandbox.write(&args.path, &args.content)?;
                    Ok(format!(
                        "Successfully wrote {} bytes to {}",
                        args.content.len(),
                        args.path
                    ))
                })
                .into(),
            LocalTool::ReadmeTemplate => ToolResult::content(README_TEMPLATE),
            LocalTool::ExampleReadme => ToolResult::content(EXAMPLE_README),
            LocalTool::ValidateUrl => parse::<UrlArgs>(arguments)
                .and_then(|args| {
                    serde_json::to_string(&ctx.url_probe.validate(&args.url))
                        .map_err(|err| format!("failed to encode result: {err}"))
                })
                .into(),
        }
    }
}

fn parse<T: for<'de> Deserialize<'de>>(arguments: Value) -> Result<T, String> {
    serde_json::from_value(arguments).map_err(|err| format!("failed to parse arguments: {err}"))
}

fn list_directory(sandbox: &PathSandbox, path: &str) -> Result<String, String> {
    let entries = sandbox.list_dir(path)?;
    let mut out = format!("Contents of {path}:\n");
    for entry in entries {
        let _ = match (entry.is_dir, entry.size) {
            (true, _) => writeln!(out, "  {}/ (directory)", entry.name),
            (false, Some(size)) => writeln!(out, "  {} (file, {size} bytes)", entry.name),
            (false, None) => writeln!(out, "  {} (file)", entry.name),
        };
    }
    Ok(out)
}
