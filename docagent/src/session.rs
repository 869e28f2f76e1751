//! Startup assembly: configuration, manifest and the tool registry.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::{debug, info, instrument};

use crate::io::config::{AgentConfig, default_config_path, load_config};
use crate::io::manifest::{PackageManifest, read_manifest};
use crate::io::mcp::{discover, load_mcp_file};
use crate::io::prompt::{PromptOverrides, Prompts};
use crate::io::sandbox::{PathSandbox, SandboxPolicy};
use crate::io::url_probe::UrlProbe;
use crate::tools::{ToolContext, ToolRegistry};

/// Command-line overrides applied on top of the config file.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub root: PathBuf,
    pub config: Option<PathBuf>,
    pub mcp_config: Option<PathBuf>,
    pub model: Option<String>,
}

/// Everything one task needs before the model is contacted.
pub struct Session {
    pub root: PathBuf,
    pub config: AgentConfig,
    pub manifest: PackageManifest,
    pub registry: ToolRegistry,
    pub overrides: PromptOverrides,
}

impl Session {
    /// Load config and manifest, then build the registry from the local
    /// tools and every reachable provider.
    ///
    /// A name collision between tools fails here, before any task starts.
    #[instrument(skip_all, fields(root = %options.root.display()))]
    pub fn assemble(options: &SessionOptions) -> Result<Self> {
        let root = &fs::canonicalize(&options.root)
            .with_context(|| format!("resolve package root {}", options.root.display()))?;
        if !root.is_dir() {
            bail!("package root {} is not a directory", root.display());
        }
        let config = load_session_config(options)?;
        let manifest = read_manifest(root)?;

        let context = ToolContext {
            sandbox: PathSandbox::new(root, SandboxPolicy::default()),
            url_probe: UrlProbe::new(Duration::from_secs(config.url_probe_timeout_secs))?,
        };
        let mut registry = ToolRegistry::with_local_tools(context)?;
        let mut overrides = PromptOverrides::default();

        let mcp_path = options.mcp_config.clone().or_else(|| config.mcp_config_path());
        let provider_file = match &mcp_path {
            Some(path) => load_mcp_file(path)?.map(|file| (path, file)),
            None => None,
        };
        if let Some((path, file)) = provider_file {
            let base_dir = path.parent().unwrap_or(Path::new("."));
            overrides = file.prompt_overrides(base_dir)?;
            let timeout = Duration::from_secs(config.tool_call_timeout_secs);
            for (session, tools) in discover(&file, timeout) {
                let provider = session.name().to_string();
                registry
                    .register_provider(session, tools)
                    .with_context(|| format!("register tools from {}", path.display()))?;
                debug!(provider = %provider, "provider registered");
            }
        }
        info!(tools = registry.len(), package = %manifest.name, "session assembled");

        Ok(Self {
            root: root.clone(),
            config,
            manifest,
            registry,
            overrides,
        })
    }

    pub fn prompts(&self) -> Prompts {
        Prompts::new(
            self.manifest.clone(),
            &self.registry.specs(),
            self.overrides.clone(),
        )
    }
}

fn load_session_config(options: &SessionOptions) -> Result<AgentConfig> {
    let mut config = match options.config.clone().or_else(default_config_path) {
        Some(path) => load_config(&path)?,
        None => AgentConfig::default(),
    };
    if let Some(model) = &options.model {
        config.model.model.clone_from(model);
        config.validate()?;
    }
    Ok(config)
}
