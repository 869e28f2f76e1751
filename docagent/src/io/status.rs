//! Cosmetic progress line shown while the model works.

use std::io::{self, IsTerminal};
use std::sync::Mutex;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

const TICK: Duration = Duration::from_millis(120);
const FRAMES: &[&str] = &[
    "[▓░░░]", "[▓▓░░]", "[▓▓▓░]", "[▓▓▓▓]", "[░▓▓▓]", "[░░▓▓]", "[░░░▓]", "[░░░░]",
];

#[derive(Default)]
struct State {
    bar: Option<ProgressBar>,
    message: String,
}

/// Animated status line. Failures and absence change nothing else.
pub struct StatusIndicator {
    enabled: bool,
    state: Mutex<State>,
}

impl StatusIndicator {
    /// Enabled only when stdout is a terminal.
    pub fn for_stdout() -> Self {
        Self::new(io::stdout().is_terminal())
    }

    pub fn disabled() -> Self {
        Self::new(false)
    }

    fn new(enabled: bool) -> Self {
        Self {
            enabled,
            state: Mutex::new(State::default()),
        }
    }

    pub fn start(&self, message: &str) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        state.message = message.to_string();
        if !self.enabled {
            return;
        }
        if let Some(bar) = &state.bar {
            bar.set_message(message.to_string());
            return;
        }
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
            bar.set_style(style.tick_strings(FRAMES));
        }
        bar.set_message(message.to_string());
        bar.enable_steady_tick(TICK);
        state.bar = Some(bar);
    }

    pub fn update(&self, message: &str) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        state.message = message.to_string();
        if let Some(bar) = &state.bar {
            bar.set_message(message.to_string());
        }
    }

    /// Stop animating and clear the line.
    pub fn stop(&self) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if let Some(bar) = state.bar.take() {
            bar.finish_and_clear();
        }
    }

    pub fn message(&self) -> String {
        self.state
            .lock()
            .map(|state| state.message.clone())
            .unwrap_or_default()
    }
}

impl Drop for StatusIndicator {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_indicator_tracks_message_without_drawing() {
        let status = StatusIndicator::disabled();
        status.start("Thinking");
        status.update("Running read_file");
        assert_eq!(status.message(), "Running read_file");
        status.stop();
        status.stop();
    }
}
