//! `docagent`: let a language model write a package's documentation.
//!
//! The agent may read the package but write only under `_dev/build/docs/`;
//! cancelled or failed runs put the managed README back as it was.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use docagent::agent::Agent;
use docagent::core::classifier::PhraseClassifier;
use docagent::core::types::{RunMode, TaskOutcome, TaskReport};
use docagent::exit_codes;
use docagent::io::config::{AgentConfig, default_config_path, write_config};
use docagent::io::document::ManagedDocument;
use docagent::io::interaction::{TerminalConsole, TerminalPrompter};
use docagent::io::model::ChatCompletionsTransport;
use docagent::io::render::TemplateRenderer;
use docagent::io::status::StatusIndicator;
use docagent::logging;
use docagent::session::{Session, SessionOptions};
use docagent::task::{Orchestrator, TaskDeps, TaskSettings};

#[derive(Parser)]
#[command(
    name = "docagent",
    version,
    about = "Sandboxed LLM agent that writes package documentation"
)]
struct Cli {
    /// Log debug diagnostics to stderr (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug, Clone)]
struct SessionArgs {
    /// Package root directory.
    #[arg(long, default_value = ".")]
    root: PathBuf,
    /// Agent config file (default `~/.docagent/config.toml`).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Tool-provider file (default `~/.docagent/mcp.json`).
    #[arg(long)]
    mcp_config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Create or revise `_dev/build/docs/README.md` with the agent.
    Update {
        #[command(flatten)]
        session: SessionArgs,
        /// Run without prompts; errors and unwritten documents fail the task.
        #[arg(long)]
        non_interactive: bool,
        /// Model name, overriding the config file.
        #[arg(long)]
        model: Option<String>,
    },
    /// List the tools the agent would get, without contacting the model.
    Tools {
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Write a config file with default values.
    InitConfig {
        /// Target file (default `~/.docagent/config.toml`).
        #[arg(long)]
        config: Option<PathBuf>,
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    let code = match run(cli.command) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::ERROR
        }
    };
    std::process::exit(code);
}

fn run(command: Command) -> Result<i32> {
    match command {
        Command::Update {
            session,
            non_interactive,
            model,
        } => cmd_update(session, non_interactive, model),
        Command::Tools { session } => cmd_tools(session),
        Command::InitConfig { config, force } => cmd_init_config(config, force),
    }
}

fn session_options(args: SessionArgs, model: Option<String>) -> SessionOptions {
    SessionOptions {
        root: args.root,
        config: args.config,
        mcp_config: args.mcp_config,
        model,
    }
}

fn cmd_update(args: SessionArgs, non_interactive: bool, model: Option<String>) -> Result<i32> {
    let session = Session::assemble(&session_options(args, model))?;
    let mode = if non_interactive {
        RunMode::Unattended
    } else {
        RunMode::Interactive
    };

    let transport = ChatCompletionsTransport::new(&session.config.model)?;
    let prompts = session.prompts();
    let document = ManagedDocument::new(&session.root);
    let renderer = TemplateRenderer::new(&session.root, session.manifest.clone());
    let status = StatusIndicator::for_stdout();
    let mut prompter = TerminalPrompter::stdio();
    let mut console = TerminalConsole;

    let deps = TaskDeps {
        agent: Agent::new(&transport, &session.registry, session.config.max_tool_iterations)
            .with_status(&status),
        document: &document,
        prompts: &prompts,
        classifier: &PhraseClassifier,
        renderer: &renderer,
        prompter: &mut prompter,
        console: &mut console,
        status: &status,
    };
    let report = Orchestrator::new(deps, TaskSettings::from_config(&session.config, mode)).run()?;
    Ok(report_exit_code(&report))
}

fn report_exit_code(report: &TaskReport) -> i32 {
    match &report.outcome {
        TaskOutcome::Accepted { .. } => exit_codes::OK,
        TaskOutcome::Cancelled { reason } => {
            eprintln!("cancelled: {reason}");
            exit_codes::CANCELLED
        }
        TaskOutcome::Failed { detail } => {
            eprintln!("failed after {} turns: {detail}", report.turns);
            exit_codes::FAILED
        }
    }
}

fn cmd_tools(args: SessionArgs) -> Result<i32> {
    let session = Session::assemble(&session_options(args, None))?;
    for spec in session.registry.specs() {
        println!("{}\t{}", spec.name, spec.description);
    }
    Ok(exit_codes::OK)
}

fn cmd_init_config(config: Option<PathBuf>, force: bool) -> Result<i32> {
    let path = config
        .or_else(default_config_path)
        .context("no home directory; pass --config")?;
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(&path, &AgentConfig::default())?;
    println!("{}", path.display());
    Ok(exit_codes::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_update_flags() {
        let cli = Cli::parse_from([
            "docagent",
            "update",
            "--root",
            "pkg",
            "--non-interactive",
            "--model",
            "gpt-test",
            "-v",
        ]);
        assert!(cli.verbose);
        let Command::Update {
            session,
            non_interactive,
            model,
        } = cli.command
        else {
            panic!("expected update");
        };
        assert_eq!(session.root, PathBuf::from("pkg"));
        assert!(non_interactive);
        assert_eq!(model.as_deref(), Some("gpt-test"));
    }

    #[test]
    fn parse_tools_defaults_to_current_dir() {
        let cli = Cli::parse_from(["docagent", "tools"]);
        let Command::Tools { session } = cli.command else {
            panic!("expected tools");
        };
        assert_eq!(session.root, PathBuf::from("."));
        assert!(session.mcp_config.is_none());
    }

    #[test]
    fn outcome_maps_to_exit_code() {
        let report = |outcome| TaskReport {
            outcome,
            warnings: Vec::new(),
            turns: 1,
        };
        assert_eq!(report_exit_code(&report(TaskOutcome::Accepted { bytes: 3 })), exit_codes::OK);
        assert_eq!(
            report_exit_code(&report(TaskOutcome::Cancelled { reason: "x".to_string() })),
            exit_codes::CANCELLED
        );
        assert_eq!(
            report_exit_code(&report(TaskOutcome::Failed { detail: "x".to_string() })),
            exit_codes::FAILED
        );
    }
}
