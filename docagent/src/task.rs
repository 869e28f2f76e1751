//! Orchestration of one documentation task.
//!
//! The orchestrator backs the managed document up, drives the agent through
//! prompts, classifies each turn and decides what happens next. Every exit
//! path other than acceptance puts the document back the way it was.

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::agent::{Agent, TaskResult};
use crate::core::classifier::{RECENT_ENTRY_WINDOW, ResponseClassifier};
use crate::core::preservation::validate_preservation;
use crate::core::types::{Classification, PreservationWarning, RunMode, TaskOutcome, TaskReport};
use crate::io::config::AgentConfig;
use crate::io::document::{ManagedDocument, RestoreGuard};
use crate::io::interaction::{Console, InteractionError, UserPrompter};
use crate::io::model::ModelTransport;
use crate::io::prompt::{ERROR_RETRY_NOTE, NOT_WRITTEN_NOTE, Prompts};
use crate::io::render::DocumentRenderer;
use crate::io::status::StatusIndicator;

pub const ACTION_QUESTION: &str = "What would you like to do?";
pub const CHANGES_QUESTION: &str = "What changes would you like to make to the documentation?";
pub const NOT_WRITTEN_QUESTION: &str = "README.md file wasn't updated. What would you like to do?";

pub const TRY_AGAIN: &str = "Try again";
pub const EXIT: &str = "Exit";
pub const EXIT_ANYWAY: &str = "Exit anyway";
pub const ACCEPT: &str = "Accept and finalize";
pub const REQUEST_CHANGES: &str = "Request changes";
pub const CANCEL: &str = "Cancel";

const WORKING_MESSAGE: &str = "LLM agent is working";

/// Retry budgets for one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSettings {
    pub mode: RunMode,
    /// Unattended write directives sent after a turn that left the document untouched.
    pub max_write_attempts: u32,
    /// Reduced-scope follow-ups per prompt after a length-limited turn.
    pub token_limit_retries: u32,
}

impl TaskSettings {
    pub fn from_config(config: &AgentConfig, mode: RunMode) -> Self {
        Self {
            mode,
            max_write_attempts: config.max_write_attempts,
            token_limit_retries: config.token_limit_retries,
        }
    }
}

/// Collaborators the orchestrator drives.
pub struct TaskDeps<'a, M> {
    pub agent: Agent<'a, M>,
    pub document: &'a ManagedDocument,
    pub prompts: &'a Prompts,
    pub classifier: &'a dyn ResponseClassifier,
    pub renderer: &'a dyn DocumentRenderer,
    pub prompter: &'a mut dyn UserPrompter,
    pub console: &'a mut dyn Console,
    pub status: &'a StatusIndicator,
}

/// What the user decided after reviewing a turn.
enum Review {
    Accept,
    Revise(String),
    Cancel(String),
}

/// Drives one task from backup to a terminal outcome.
pub struct Orchestrator<'a, M> {
    deps: TaskDeps<'a, M>,
    settings: TaskSettings,
    turns: u32,
}

impl<'a, M: ModelTransport> Orchestrator<'a, M> {
    pub fn new(deps: TaskDeps<'a, M>, settings: TaskSettings) -> Self {
        Self {
            deps,
            settings,
            turns: 0,
        }
    }

    /// Run the task to completion.
    ///
    /// Returns `Err` only for task-fatal faults (transport, filesystem); the
    /// document is restored before the error surfaces.
    #[instrument(skip_all, fields(mode = ?self.settings.mode))]
    pub fn run(&mut self) -> Result<TaskReport> {
        let document = self.deps.document;
        let guard = document.guard().context("back up managed document")?;
        let report = match self.settings.mode {
            RunMode::Unattended => self.run_unattended(guard),
            RunMode::Interactive => self.run_interactive(guard),
        };
        match &report {
            Ok(report) => info!(outcome = ?report.outcome, turns = report.turns, "task finished"),
            Err(err) => warn!(error = %format!("{err:#}"), "task aborted, document restored"),
        }
        report
    }

    fn run_unattended(&mut self, guard: RestoreGuard<'a>) -> Result<TaskReport> {
        self.deps
            .console
            .notice("Starting non-interactive documentation update...");
        let initial = self.deps.prompts.initial()?;
        let mut result = self.execute(&initial)?;
        let mut token_retries = 0;
        loop {
            match self.classify(&result) {
                Classification::TokenLimitHit if token_retries < self.settings.token_limit_retries => {
                    token_retries += 1;
                    self.deps
                        .console
                        .notice("⚠️  LLM hit token limits. Switching to section-based generation...");
                    let section = self.deps.prompts.section()?;
                    result = self.execute(&section)?;
                }
                Classification::ErrorLike => {
                    self.deps.console.notice("❌ Error detected in LLM response.");
                    return self.abandon(
                        guard,
                        TaskOutcome::Failed {
                            detail: format!("LLM agent encountered an error: {}", result.final_content),
                        },
                    );
                }
                Classification::TokenLimitHit | Classification::Success => break,
            }
        }

        let max_attempts = self.settings.max_write_attempts;
        for attempt in 1..=max_attempts {
            if self.document_written()? {
                return self.accept(guard);
            }
            self.deps.console.notice(&format!(
                "⚠️  README.md was not written. Retrying with explicit instructions ({attempt} of {max_attempts})..."
            ));
            let directive = self.deps.prompts.write_directive(attempt, max_attempts)?;
            self.execute(&directive)?;
        }
        if self.document_written()? {
            return self.accept(guard);
        }
        self.abandon(
            guard,
            TaskOutcome::Failed {
                detail: format!("failed to create README.md after {} attempts", max_attempts + 1),
            },
        )
    }

    fn run_interactive(&mut self, guard: RestoreGuard<'a>) -> Result<TaskReport> {
        self.deps.console.notice("Starting documentation update...");
        let mut prompt = self.deps.prompts.initial()?;
        let mut token_retries = 0;
        loop {
            let result = self.execute(&prompt)?;
            match self.classify(&result) {
                Classification::TokenLimitHit if token_retries < self.settings.token_limit_retries => {
                    token_retries += 1;
                    self.deps
                        .console
                        .notice("⚠️  LLM hit token limits. Switching to section-based generation...");
                    prompt = self.deps.prompts.section()?;
                    continue;
                }
                Classification::ErrorLike => {
                    self.deps.console.notice("❌ Error detected in LLM response.");
                    match self.choose(ACTION_QUESTION, &[TRY_AGAIN, EXIT], TRY_AGAIN)? {
                        Some(choice) if choice == TRY_AGAIN => {
                            prompt = self.deps.prompts.revision(ERROR_RETRY_NOTE)?;
                            token_retries = 0;
                            continue;
                        }
                        _ => {
                            self.deps.console.notice("⚠️  Exiting due to LLM error.");
                            return self.abandon(
                                guard,
                                TaskOutcome::Cancelled {
                                    reason: "user chose to exit after an LLM error".to_string(),
                                },
                            );
                        }
                    }
                }
                Classification::TokenLimitHit | Classification::Success => {}
            }

            let written = self.preview()?;
            match self.review(written)? {
                Review::Accept => return self.accept(guard),
                Review::Revise(next) => {
                    prompt = next;
                    token_retries = 0;
                }
                Review::Cancel(reason) => {
                    return self.abandon(guard, TaskOutcome::Cancelled { reason });
                }
            }
        }
    }

    /// Ask for the next action until it yields a decision.
    fn review(&mut self, written: bool) -> Result<Review> {
        loop {
            let action = self
                .choose(ACTION_QUESTION, &[ACCEPT, REQUEST_CHANGES, CANCEL], ACCEPT)?
                .unwrap_or_else(|| CANCEL.to_string());
            match action.as_str() {
                ACCEPT if written => return Ok(Review::Accept),
                ACCEPT => {
                    let choice = self.choose(NOT_WRITTEN_QUESTION, &[TRY_AGAIN, EXIT_ANYWAY], TRY_AGAIN)?;
                    if choice.as_deref() == Some(TRY_AGAIN) {
                        self.deps.console.notice("🔄 Trying again to create README.md...");
                        return Ok(Review::Revise(self.deps.prompts.revision(NOT_WRITTEN_NOTE)?));
                    }
                    self.deps
                        .console
                        .notice("⚠️  Exiting without creating README.md file.");
                    return Ok(Review::Cancel("exited without writing the document".to_string()));
                }
                REQUEST_CHANGES => match self.deps.prompter.text(CHANGES_QUESTION) {
                    Ok(changes) if !changes.trim().is_empty() => {
                        return Ok(Review::Revise(self.deps.prompts.revision(&changes)?));
                    }
                    Ok(_) => self.deps.console.notice("⚠️  No changes specified. Please try again."),
                    Err(InteractionError::Cancelled) => {
                        self.deps.console.notice("⚠️  Changes request cancelled.");
                    }
                    Err(err) => return Err(err).context("read requested changes"),
                },
                _ => {
                    self.deps.console.notice("❌ Documentation update cancelled.");
                    return Ok(Review::Cancel("cancelled by user".to_string()));
                }
            }
        }
    }

    /// `None` when the user backed out of the prompt.
    fn choose(&mut self, question: &str, choices: &[&str], default: &str) -> Result<Option<String>> {
        match self.deps.prompter.select(question, choices, default) {
            Ok(choice) => Ok(Some(choice)),
            Err(InteractionError::Cancelled) => Ok(None),
            Err(err) => Err(err).context("read user choice"),
        }
    }

    /// One model turn.
    fn execute(&mut self, prompt: &str) -> Result<TaskResult> {
        self.deps.status.start(WORKING_MESSAGE);
        let result = self.deps.agent.execute_task(prompt);
        self.deps.status.stop();
        let result = result.context("agent task failed")?;
        self.turns += 1;
        debug!(
            turn = self.turns,
            iterations = result.iterations,
            entries = result.conversation.len(),
            "turn completed"
        );
        Ok(result)
    }

    fn classify(&self, result: &TaskResult) -> Classification {
        if result.truncated {
            return Classification::TokenLimitHit;
        }
        let verdict = self.deps.classifier.classify(
            &result.final_content,
            result.conversation.tail(RECENT_ENTRY_WINDOW),
        );
        debug!(?verdict, "classified reply");
        verdict
    }

    /// The document changed since the backup and is not empty.
    fn document_written(&self) -> Result<bool> {
        if !self.deps.document.has_changed()? {
            return Ok(false);
        }
        Ok(self
            .deps
            .document
            .read()?
            .is_some_and(|content| !content.is_empty()))
    }

    /// Show the rendered document; returns whether anything was written.
    fn preview(&mut self) -> Result<bool> {
        if !self.document_written()? {
            self.deps.console.notice("⚠️  README.md file not updated");
            return Ok(false);
        }
        let content = self.deps.document.read()?.unwrap_or_default();
        match self.deps.renderer.render(&content) {
            Ok(rendered) if rendered.applicable => {
                let lines = rendered.content.lines().count();
                self.deps.console.notice(&format!(
                    "📊 Rendered README stats: {} characters, {lines} lines",
                    rendered.content.len()
                ));
                self.deps
                    .console
                    .show_document("📄 Rendered README.md", &rendered.content);
            }
            outcome => {
                if let Err(err) = outcome {
                    warn!(error = %format!("{err:#}"), "document preview failed");
                }
                self.deps.console.notice(
                    "⚠️  The generated README.md could not be rendered. It's recommended that you \
                     do not accept this version (request changes or cancel).",
                );
            }
        }
        Ok(true)
    }

    fn accept(&mut self, guard: RestoreGuard<'a>) -> Result<TaskReport> {
        let document = self.deps.document;
        let content = document.read()?.unwrap_or_default();
        let warnings = match document.snapshot()?.content() {
            Some(original) => validate_preservation(original, &content),
            None => Vec::new(),
        };
        guard.keep();
        if !warnings.is_empty() {
            self.deps
                .console
                .notice("⚠️  Warning: Some human-edited sections may not have been preserved:");
            for warning in &warnings {
                self.deps.console.notice(&format!("   - {warning}"));
            }
        }
        self.deps.console.notice(&format!(
            "✅ Documentation update completed! ({} characters written)",
            content.len()
        ));
        Ok(self.report(TaskOutcome::Accepted { bytes: content.len() }, warnings))
    }

    fn abandon(&mut self, guard: RestoreGuard<'a>, outcome: TaskOutcome) -> Result<TaskReport> {
        guard.restore().context("restore managed document")?;
        Ok(self.report(outcome, Vec::new()))
    }

    fn report(&self, outcome: TaskOutcome, warnings: Vec<PreservationWarning>) -> TaskReport {
        TaskReport {
            outcome,
            warnings,
            turns: self.turns,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::classifier::PhraseClassifier;
    use crate::core::types::ToolCall;
    use crate::io::model::ModelReply;
    use crate::io::render::Rendered;
    use crate::test_support::{
        RecordingConsole, ScriptedModel, ScriptedPrompter, TestPackage, tool_reply, write_reply,
    };

    struct EchoRenderer;

    impl DocumentRenderer for EchoRenderer {
        fn render(&self, content: &str) -> Result<Rendered> {
            Ok(Rendered {
                content: content.to_string(),
                applicable: true,
            })
        }
    }

    fn settings(mode: RunMode) -> TaskSettings {
        TaskSettings {
            mode,
            max_write_attempts: 2,
            token_limit_retries: 1,
        }
    }

    fn run(
        package: &TestPackage,
        model: &ScriptedModel,
        prompter: &mut ScriptedPrompter,
        console: &mut RecordingConsole,
        mode: RunMode,
    ) -> Result<TaskReport> {
        let registry = package.registry();
        let prompts = package.prompts(&registry);
        let document = ManagedDocument::new(package.root());
        let status = StatusIndicator::disabled();
        let deps = TaskDeps {
            agent: Agent::new(model, &registry, 5),
            document: &document,
            prompts: &prompts,
            classifier: &PhraseClassifier,
            renderer: &EchoRenderer,
            prompter,
            console,
            status: &status,
        };
        Orchestrator::new(deps, settings(mode)).run()
    }

    #[test]
    fn unattended_error_reply_fails_and_restores() {
        let package = TestPackage::new();
        package.write_document("original\n");
        let model = ScriptedModel::new(vec![
            write_reply("1", "clobbered\n"),
            tool_reply(
                "",
                vec![ToolCall {
                    id: "2".to_string(),
                    name: "read_file".to_string(),
                    arguments: r#"{"path": "data_stream/missing.yml"}"#.to_string(),
                }],
            ),
            ModelReply::text("I encountered an error while reading files"),
        ]);

        let report = run(
            &package,
            &model,
            &mut ScriptedPrompter::default(),
            &mut RecordingConsole::default(),
            RunMode::Unattended,
        )
        .expect("run");

        assert!(matches!(report.outcome, TaskOutcome::Failed { ref detail } if detail.contains("I encountered an error")));
        assert_eq!(package.document().as_deref(), Some("original\n"));
    }

    #[test]
    fn unattended_token_limit_sends_section_prompt_once() {
        let package = TestPackage::new();
        let model = ScriptedModel::new(vec![
            ModelReply {
                truncated: true,
                ..ModelReply::text("partial")
            },
            write_reply("1", "# Doc\n"),
            ModelReply::text("written"),
        ]);

        let report = run(
            &package,
            &model,
            &mut ScriptedPrompter::default(),
            &mut RecordingConsole::default(),
            RunMode::Unattended,
        )
        .expect("run");

        assert_eq!(report.outcome, TaskOutcome::Accepted { bytes: 6 });
        assert_eq!(report.turns, 2);
        assert!(model.requests()[1].prompt.contains("smaller pieces"), "{}", model.requests()[1].prompt);
    }

    #[test]
    fn unattended_no_op_turns_exhaust_write_budget() {
        let package = TestPackage::new();
        let model = ScriptedModel::new(vec![
            ModelReply::text("I looked around."),
            ModelReply::text("Still looking."),
            ModelReply::text("Nothing to add."),
        ]);

        let report = run(
            &package,
            &model,
            &mut ScriptedPrompter::default(),
            &mut RecordingConsole::default(),
            RunMode::Unattended,
        )
        .expect("run");

        assert_eq!(
            report.outcome,
            TaskOutcome::Failed {
                detail: "failed to create README.md after 3 attempts".to_string()
            }
        );
        assert_eq!(report.turns, 3);
        assert!(model.requests()[2].prompt.contains("final attempt (2 of 2)"));
        assert_eq!(package.document(), None);
    }

    #[test]
    fn unattended_write_directive_recovers() {
        let package = TestPackage::new();
        let model = ScriptedModel::new(vec![
            ModelReply::text("Analysis complete."),
            write_reply("1", "# Doc\n"),
            ModelReply::text(""),
        ]);
        let report = run(
            &package,
            &model,
            &mut ScriptedPrompter::default(),
            &mut RecordingConsole::default(),
            RunMode::Unattended,
        )
        .expect("run");
        assert_eq!(report.outcome, TaskOutcome::Accepted { bytes: 6 });
        assert_eq!(report.turns, 2);
    }

    #[test]
    fn transport_failure_restores_document() {
        let package = TestPackage::new();
        package.write_document("original\n");
        let model = ScriptedModel::new(vec![write_reply("1", "half written")]);

        let err = run(
            &package,
            &model,
            &mut ScriptedPrompter::default(),
            &mut RecordingConsole::default(),
            RunMode::Unattended,
        )
        .unwrap_err();

        assert!(format!("{err:#}").contains("agent task failed"));
        assert_eq!(package.document().as_deref(), Some("original\n"));
    }

    #[test]
    fn interactive_request_changes_then_accept() {
        let package = TestPackage::new();
        let model = ScriptedModel::new(vec![
            write_reply("1", "# Draft\n"),
            ModelReply::text("Draft written."),
            write_reply("2", "# Final\n"),
            ModelReply::text("Revised."),
        ]);
        let mut prompter = ScriptedPrompter::default()
            .choose(REQUEST_CHANGES)
            .text("Mention the access logs")
            .choose(ACCEPT);
        let mut console = RecordingConsole::default();

        let report = run(&package, &model, &mut prompter, &mut console, RunMode::Interactive)
            .expect("run");

        assert_eq!(report.outcome, TaskOutcome::Accepted { bytes: 8 });
        assert_eq!(report.turns, 2);
        assert!(model.requests()[2].prompt.contains("Mention the access logs"));
        assert_eq!(console.documents.len(), 2);
        assert_eq!(package.document().as_deref(), Some("# Final\n"));
    }

    #[test]
    fn interactive_empty_change_request_returns_to_review() {
        let package = TestPackage::new();
        let model = ScriptedModel::new(vec![write_reply("1", "# Draft\n"), ModelReply::text("ok")]);
        let mut prompter = ScriptedPrompter::default()
            .choose(REQUEST_CHANGES)
            .text("   ")
            .choose(CANCEL);
        let mut console = RecordingConsole::default();

        let report = run(&package, &model, &mut prompter, &mut console, RunMode::Interactive)
            .expect("run");

        assert!(matches!(report.outcome, TaskOutcome::Cancelled { .. }));
        assert_eq!(report.turns, 1);
        assert!(console.notices.iter().any(|n| n.contains("No changes specified")));
        assert_eq!(package.document(), None);
    }

    #[test]
    fn interactive_error_offers_retry_with_note() {
        let package = TestPackage::new();
        let model = ScriptedModel::new(vec![
            ModelReply::text("Something went wrong with the listing"),
            write_reply("1", "# Doc\n"),
            ModelReply::text("Fixed."),
        ]);
        let mut prompter = ScriptedPrompter::default().choose(TRY_AGAIN).choose(ACCEPT);

        let report = run(
            &package,
            &model,
            &mut prompter,
            &mut RecordingConsole::default(),
            RunMode::Interactive,
        )
        .expect("run");

        assert_eq!(report.outcome, TaskOutcome::Accepted { bytes: 6 });
        assert!(model.requests()[1].prompt.contains(ERROR_RETRY_NOTE));
    }

    #[test]
    fn interactive_cancellation_signal_counts_as_cancel() {
        let package = TestPackage::new();
        package.write_document("mine\n");
        let model = ScriptedModel::new(vec![write_reply("1", "theirs\n"), ModelReply::text("ok")]);
        let mut prompter = ScriptedPrompter::default().cancel();

        let report = run(
            &package,
            &model,
            &mut prompter,
            &mut RecordingConsole::default(),
            RunMode::Interactive,
        )
        .expect("run");

        assert!(matches!(report.outcome, TaskOutcome::Cancelled { .. }));
        assert_eq!(package.document().as_deref(), Some("mine\n"));
    }

    #[test]
    fn interactive_accept_without_write_asks_to_retry() {
        let package = TestPackage::new();
        let model = ScriptedModel::new(vec![
            ModelReply::text("Here is my plan."),
            tool_reply(
                "",
                vec![ToolCall {
                    id: "w".to_string(),
                    name: "write_file".to_string(),
                    arguments: serde_json::json!({
                        "path": "_dev/build/docs/README.md",
                        "content": "# Doc\n"
                    })
                    .to_string(),
                }],
            ),
            ModelReply::text(""),
        ]);
        let mut prompter = ScriptedPrompter::default()
            .choose(ACCEPT)
            .choose(TRY_AGAIN)
            .choose(ACCEPT);

        let report = run(
            &package,
            &model,
            &mut prompter,
            &mut RecordingConsole::default(),
            RunMode::Interactive,
        )
        .expect("run");

        assert_eq!(report.outcome, TaskOutcome::Accepted { bytes: 6 });
        assert!(model.requests()[1].prompt.contains(NOT_WRITTEN_NOTE));
        assert_eq!(
            prompter.questions(),
            vec![ACTION_QUESTION, NOT_WRITTEN_QUESTION, ACTION_QUESTION]
        );
    }
}
