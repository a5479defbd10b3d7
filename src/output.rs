//! # Console Output
//!
//! Per-entity status lines and progress bars for the migration passes.
//!
//! ## Respecting User Preferences
//!
//! Colors follow, in order:
//! - `--color=never|always|auto` - CLI flag for color control
//! - `NO_COLOR` - Disables colors when set (per https://no-color.org/)
//! - `CLICOLOR=0` - Disables colors
//! - `CLICOLOR_FORCE=1` - Forces colors even in non-TTY
//! - `TERM=dumb` - Disables colors for dumb terminals
//!
//! Progress bars are only drawn on a terminal. Elsewhere status lines are
//! printed plainly so redirected output stays readable.

use std::env;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::status::WriteStatus;

/// Output configuration for controlling colors and progress bars.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Whether status lines are colored.
    pub use_color: bool,
    /// Whether progress bars are drawn.
    pub show_progress: bool,
}

impl OutputConfig {
    /// Create an output configuration from environment and CLI flag.
    ///
    /// # Arguments
    /// * `color_flag` - The value of the --color CLI flag: "always", "never", or "auto"
    ///
    /// In auto mode, colors are disabled if:
    /// - `NO_COLOR` environment variable is set (any value, including empty)
    /// - `CLICOLOR=0` is set
    /// - `TERM=dumb` is set
    /// - stdout is not a TTY (unless `CLICOLOR_FORCE=1`)
    pub fn from_env_and_flag(color_flag: &str) -> Self {
        let use_color = match color_flag.to_lowercase().as_str() {
            "always" => true,
            "never" => false,
            _ => Self::detect_color_support(),
        };

        Self {
            use_color,
            show_progress: console::Term::stdout().is_term(),
        }
    }

    /// Detect whether color output is supported based on environment.
    fn detect_color_support() -> bool {
        // The presence of the variable (even if empty) disables colors
        if env::var_os("NO_COLOR").is_some() {
            return false;
        }

        if env::var("CLICOLOR").is_ok_and(|v| v == "0") {
            return false;
        }

        if env::var("CLICOLOR_FORCE").is_ok_and(|v| v != "0" && !v.is_empty()) {
            return true;
        }

        if env::var("TERM").is_ok_and(|v| v == "dumb") {
            return false;
        }

        console::Term::stdout().features().colors_supported()
    }

    /// Plain output: no colors, no progress bars.
    pub fn plain() -> Self {
        Self {
            use_color: false,
            show_progress: false,
        }
    }

    #[cfg(test)]
    pub fn with_color() -> Self {
        Self {
            use_color: true,
            show_progress: false,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self::from_env_and_flag("auto")
    }
}

fn status_style(status: WriteStatus) -> Style {
    match status {
        WriteStatus::Added => Style::new().green().bold(),
        WriteStatus::Updated => Style::new().cyan().bold(),
        WriteStatus::Unmodified => Style::new().yellow().bold(),
        WriteStatus::Skipped => Style::new().blue().bold(),
        WriteStatus::Removed => Style::new().magenta(),
        WriteStatus::Failed => Style::new().red().bold(),
    }
}

/// Render `text` (or the status itself) in the status color.
pub fn paint_status(config: &OutputConfig, status: WriteStatus, text: Option<&str>) -> String {
    let text = text.unwrap_or(status.as_str());
    if config.use_color {
        status_style(status).force_styling(true).apply_to(text).to_string()
    } else {
        text.to_string()
    }
}

/// One status line for an entity: the name padded to `width`, then the status.
pub fn entity_line(config: &OutputConfig, name: &str, width: usize, status: WriteStatus) -> String {
    format!(
        "{:<width$}{}",
        name,
        paint_status(config, status, None),
        width = width + 2
    )
}

/// A progress bar that status lines can be printed above.
pub struct Progress {
    bar: Option<ProgressBar>,
}

impl Progress {
    pub fn new(config: &OutputConfig, len: usize, message: &str) -> Self {
        if !config.show_progress {
            return Self { bar: None };
        }
        let bar = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::with_template("{msg} [{bar:40.cyan/blue}] {pos}/{len}") {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.set_message(message.to_string());
        Self { bar: Some(bar) }
    }

    pub fn println(&self, line: &str) {
        match &self.bar {
            Some(bar) => bar.println(line),
            None => println!("{}", line),
        }
    }

    pub fn inc(&self, n: usize) {
        if let Some(bar) = &self.bar {
            bar.inc(n as u64);
        }
    }

    pub fn finish(self) {
        if let Some(bar) = self.bar {
            bar.finish_and_clear();
        }
    }
}
