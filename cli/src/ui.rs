//! Shared UI helpers for consistent terminal output.

use cardhost_compiler::{CompileError, ErrorKind};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Standard symbols used throughout the CLI.
pub mod symbols {
    pub const ARROW: &str = "→";
    pub const SUCCESS: &str = "✓";
    pub const FAILURE: &str = "✗";
    pub const WARNING: &str = "!";
    pub const BULLET: &str = "•";
}

/// Print a step header with the action arrow.
pub fn print_step(message: &str) {
    println!("{} {}", symbols::ARROW.blue().bold(), message);
}

pub fn print_success(message: &str) {
    println!("{} {}", symbols::SUCCESS.green().bold(), message);
}

pub fn print_error(message: &str) {
    println!("{} {}", symbols::FAILURE.red().bold(), message);
}

pub fn print_warning(message: &str) {
    println!("{} {}", symbols::WARNING.yellow().bold(), message);
}

/// Print a dimmed info line (indented).
pub fn print_info(message: &str) {
    println!("  {}", message.dimmed());
}

pub fn print_bullet(message: &str) {
    println!("  {} {}", symbols::BULLET.dimmed(), message);
}

/// Progress bar over a known number of cards.
pub fn create_progress_bar(total: u64, message: &str) -> ProgressBar {
    let bar = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.blue} [{bar:30.green/dim}] {pos}/{len} {msg}")
        .map(|style| style.progress_chars("█░░"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

/// Colored label for a compile error class.
pub fn format_error_kind(error: &CompileError) -> String {
    match error.kind() {
        ErrorKind::Configuration => "configuration".yellow().to_string(),
        ErrorKind::Resolution => "resolution".magenta().to_string(),
        ErrorKind::Structural => "structure".red().to_string(),
        ErrorKind::Validation => "validation".red().bold().to_string(),
    }
}

/// "1 card" / "3 cards"
pub fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{} {}", count, noun)
    } else {
        format!("{} {}s", count, noun)
    }
}
