//! Human interaction surface for interactive mode.

use std::io::{self, BufRead, Write};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InteractionError {
    /// The user backed out of the prompt; treated like the Cancel action.
    #[error("interaction cancelled by user")]
    Cancelled,
    #[error("terminal i/o failed: {0}")]
    Io(#[from] io::Error),
}

/// Presents choices and collects free text.
pub trait UserPrompter {
    /// Returns one of `choices`.
    fn select(
        &mut self,
        question: &str,
        choices: &[&str],
        default: &str,
    ) -> Result<String, InteractionError>;

    /// Free text; an empty string when the user entered nothing.
    fn text(&mut self, question: &str) -> Result<String, InteractionError>;
}

/// Output channel for previews and notices shown to the user.
pub trait Console {
    fn show_document(&mut self, title: &str, content: &str);
    fn notice(&mut self, message: &str);
}

/// Line-based prompter over any reader and writer.
///
/// Choices are numbered; an empty line picks the default and `q` or end of
/// input cancels. Text input ends at the first empty line.
pub struct TerminalPrompter<R, W> {
    input: R,
    output: W,
}

impl TerminalPrompter<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> TerminalPrompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn read_line(&mut self) -> Result<Option<String>, InteractionError> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }
}

impl<R: BufRead, W: Write> UserPrompter for TerminalPrompter<R, W> {
    fn select(
        &mut self,
        question: &str,
        choices: &[&str],
        default: &str,
    ) -> Result<String, InteractionError> {
        writeln!(self.output, "{question}")?;
        for (index, choice) in choices.iter().enumerate() {
            let marker = if *choice == default { " (default)" } else { "" };
            writeln!(self.output, "  {}) {choice}{marker}", index + 1)?;
        }
        loop {
            write!(self.output, "Select [1-{}, q to cancel]: ", choices.len())?;
            self.output.flush()?;
            let Some(line) = self.read_line()? else {
                return Err(InteractionError::Cancelled);
            };
            let answer = line.trim();
            if answer.eq_ignore_ascii_case("q") {
                return Err(InteractionError::Cancelled);
            }
            if answer.is_empty() && choices.contains(&default) {
                return Ok(default.to_string());
            }
            let picked = answer
                .parse::<usize>()
                .ok()
                .and_then(|number| number.checked_sub(1))
                .and_then(|index| choices.get(index))
                .or_else(|| choices.iter().find(|choice| choice.eq_ignore_ascii_case(answer)));
            match picked {
                Some(choice) => return Ok((*choice).to_string()),
                None => writeln!(self.output, "Unrecognized choice '{answer}'.")?,
            }
        }
    }

    fn text(&mut self, question: &str) -> Result<String, InteractionError> {
        writeln!(self.output, "{question}")?;
        writeln!(self.output, "(finish with an empty line)")?;
        self.output.flush()?;
        let mut lines = Vec::new();
        loop {
            match self.read_line()? {
                Some(line) if !line.trim().is_empty() => lines.push(line),
                Some(_) => break,
                None if lines.is_empty() => return Err(InteractionError::Cancelled),
                None => break,
            }
        }
        Ok(lines.join("\n"))
    }
}

/// Framed previews on stdout.
#[derive(Debug, Default)]
pub struct TerminalConsole;

impl Console for TerminalConsole {
    fn show_document(&mut self, title: &str, content: &str) {
        let rule = "─".repeat(72);
        println!("\n{rule}\n{title}\n{rule}\n{content}\n{rule}\n");
    }

    fn notice(&mut self, message: &str) {
        println!("{message}");
    }
}
