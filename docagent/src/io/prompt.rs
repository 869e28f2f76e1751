//! Prompt rendering for the documentation task.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::debug;

use crate::core::types::ToolSpec;
use crate::io::document::MANAGED_DOCUMENT_PATH;
use crate::io::manifest::PackageManifest;

const SHARED_RULES_TEMPLATE: &str = include_str!("prompts/shared_rules.md");
const INITIAL_TEMPLATE: &str = include_str!("prompts/initial.md");
const REVISION_TEMPLATE: &str = include_str!("prompts/revision.md");
const SECTION_TEMPLATE: &str = include_str!("prompts/section.md");
const WRITE_DIRECTIVE_TEMPLATE: &str = include_str!("prompts/write_directive.md");

/// Change request used when retrying after an error-like reply.
pub const ERROR_RETRY_NOTE: &str = "The previous attempt ran into an error. Try a different \
approach to analyze the package and create or update the documentation.";

/// Change request used when the user accepts before anything was written.
pub const NOT_WRITTEN_NOTE: &str = "The README.md file has not been written yet. Write it to \
_dev/build/docs/README.md based on your analysis.";

/// Replacement sources for the built-in initial and revision templates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptOverrides {
    pub initial: Option<String>,
    pub revision: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct ToolSummary {
    name: String,
    description: String,
}

/// Renders every prompt the orchestrator sends.
pub struct Prompts {
    env: Environment<'static>,
    overrides: PromptOverrides,
    package: PackageManifest,
    tools: Vec<ToolSummary>,
}

impl Prompts {
    pub fn new(package: PackageManifest, tools: &[ToolSpec], overrides: PromptOverrides) -> Self {
        let mut env = Environment::new();
        env.set_keep_trailing_newline(true);
        for (name, source) in [
            ("shared_rules", SHARED_RULES_TEMPLATE),
            ("initial", INITIAL_TEMPLATE),
            ("revision", REVISION_TEMPLATE),
            ("section", SECTION_TEMPLATE),
            ("write_directive", WRITE_DIRECTIVE_TEMPLATE),
        ] {
            env.add_template(name, source)
                .expect("embedded prompt templates are valid");
        }
        let tools = tools
            .iter()
            .map(|spec| ToolSummary {
                name: spec.name.clone(),
                description: spec.description.clone(),
            })
            .collect();
        Self {
            env,
            overrides,
            package,
            tools,
        }
    }

    pub fn initial(&self) -> Result<String> {
        self.render("initial", self.overrides.initial.as_deref(), context! {})
    }

    pub fn revision(&self, changes: &str) -> Result<String> {
        self.render(
            "revision",
            self.overrides.revision.as_deref(),
            context! { changes => changes.trim() },
        )
    }

    /// Reduced-scope prompt sent after a length-limited reply.
    pub fn section(&self) -> Result<String> {
        self.render("section", None, context! {})
    }

    /// No-op directive for unattended mode; wording hardens with `attempt`.
    pub fn write_directive(&self, attempt: u32, max_attempts: u32) -> Result<String> {
        self.render(
            "write_directive",
            None,
            context! { attempt => attempt, max_attempts => max_attempts },
        )
    }

    fn render(&self, name: &str, source: Option<&str>, extra: minijinja::Value) -> Result<String> {
        let ctx = context! {
            package => &self.package,
            tools => &self.tools,
            document_path => MANAGED_DOCUMENT_PATH,
            ..extra
        };
        let rendered = match source {
            Some(source) => self
                .env
                .render_str(source, ctx)
                .with_context(|| format!("render {name} prompt override"))?,
            None => self
                .env
                .get_template(name)?
                .render(ctx)
                .with_context(|| format!("render {name} prompt"))?,
        };
        debug!(prompt = name, chars = rendered.len(), overridden = source.is_some(), "rendered prompt");
        Ok(rendered)
    }
}
