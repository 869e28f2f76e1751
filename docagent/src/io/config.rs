//! Agent configuration stored under `~/.docagent/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Directory under the home directory holding config and provider files.
pub const CONFIG_DIR_NAME: &str = ".docagent";

/// Agent configuration (TOML).
///
/// Missing fields default to values suited to a single local run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Upper bound on model round-trips within one execute-task call.
    pub max_tool_iterations: u32,

    /// Unattended attempts to get the managed document written.
    pub max_write_attempts: u32,

    /// Reduced-scope follow-ups after a length-limited reply; at least one.
    pub token_limit_retries: u32,

    /// Per-call timeout for bridged provider tools.
    pub tool_call_timeout_secs: u64,

    /// Timeout for a single URL reachability probe.
    pub url_probe_timeout_secs: u64,

    pub model: ModelConfig,

    /// Provider configuration file; `~/.docagent/mcp.json` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mcp_config: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ModelConfig {
    /// Base URL of an OpenAI-compatible API (`/chat/completions` is appended).
    pub endpoint: String,
    pub model: String,
    /// Environment variable holding the bearer token.
    pub api_key_env: String,
    pub request_timeout_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            request_timeout_secs: 120,
            max_tokens: None,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tool_iterations: 15,
            max_write_attempts: 2,
            token_limit_retries: 1,
            tool_call_timeout_secs: 30,
            url_probe_timeout_secs: 5,
            model: ModelConfig::default(),
            mcp_config: None,
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_tool_iterations == 0 {
            return Err(anyhow!("max_tool_iterations must be > 0"));
        }
        if self.max_write_attempts == 0 {
            return Err(anyhow!("max_write_attempts must be > 0"));
        }
        if self.token_limit_retries == 0 {
            return Err(anyhow!("token_limit_retries must be > 0"));
        }
        if self.tool_call_timeout_secs == 0 {
            return Err(anyhow!("tool_call_timeout_secs must be > 0"));
        }
        if self.url_probe_timeout_secs == 0 {
            return Err(anyhow!("url_probe_timeout_secs must be > 0"));
        }
        if self.model.request_timeout_secs == 0 {
            return Err(anyhow!("model.request_timeout_secs must be > 0"));
        }
        if self.model.model.trim().is_empty() {
            return Err(anyhow!("model.model must be a non-empty string"));
        }
        if self.model.endpoint.trim().is_empty() {
            return Err(anyhow!("model.endpoint must be a non-empty string"));
        }
        if self.model.api_key_env.trim().is_empty() {
            return Err(anyhow!("model.api_key_env must be a non-empty string"));
        }
        Ok(())
    }

    /// Provider file to load: the configured path or the default location.
    pub fn mcp_config_path(&self) -> Option<PathBuf> {
        self.mcp_config
            .clone()
            .or_else(|| config_dir().map(|dir| dir.join("mcp.json")))
    }
}

/// `~/.docagent`, when a home directory can be determined.
pub fn config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_DIR_NAME))
}

/// `~/.docagent/config.toml`, when a home directory can be determined.
pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AgentConfig::default()`.
pub fn load_config(path: &Path) -> Result<AgentConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "config file missing, using defaults");
        let cfg = AgentConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AgentConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &AgentConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, &buf)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, AgentConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested/config.toml");
        let mut cfg = AgentConfig::default();
        cfg.model.max_tokens = Some(4096);
        cfg.mcp_config = Some(PathBuf::from("/etc/docagent/mcp.json"));
        write_config(&path, &cfg).expect("write");
        assert_eq!(load_config(&path).expect("load"), cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "max_write_attempts = 4\n[model]\nmodel = \"local\"\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.max_write_attempts, 4);
        assert_eq!(cfg.model.model, "local");
        assert_eq!(cfg.model.api_key_env, "OPENAI_API_KEY");
        assert_eq!(cfg.max_tool_iterations, 15);
    }

    #[test]
    fn zero_budgets_are_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "max_write_attempts = 0\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("max_write_attempts"));

        fs::write(&path, "token_limit_retries = 0\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("token_limit_retries"));
    }

    #[test]
    fn explicit_mcp_path_wins() {
        let cfg = AgentConfig {
            mcp_config: Some(PathBuf::from("/tmp/providers.json")),
            ..AgentConfig::default()
        };
        assert_eq!(
            cfg.mcp_config_path(),
            Some(PathBuf::from("/tmp/providers.json"))
        );
    }
}
