//! Terminal styling helpers
//!
//! Output goes through `anstream`, which strips the escape codes when stdout
//! is not a terminal.

use owo_colors::OwoColorize;
use std::fmt::Display;

/// Check mark
pub const CHECK: &str = "✓";

/// Cross mark
pub const CROSS: &str = "✗";

/// Semantic styles for CLI output
pub trait Stylize {
    /// Headings and key values
    fn emphasis(&self) -> String;
    /// Identifiers (PR numbers, branches)
    fn accent(&self) -> String;
    /// Secondary information
    fn muted(&self) -> String;
    /// Good news
    fn success(&self) -> String;
    /// Needs attention
    fn warn(&self) -> String;
    /// Failure
    fn error(&self) -> String;
}

impl<T: Display> Stylize for T {
    fn emphasis(&self) -> String {
        self.bold().to_string()
    }

    fn accent(&self) -> String {
        self.cyan().to_string()
    }

    fn muted(&self) -> String {
        self.dimmed().to_string()
    }

    fn success(&self) -> String {
        self.green().to_string()
    }

    fn warn(&self) -> String {
        self.yellow().to_string()
    }

    fn error(&self) -> String {
        self.red().to_string()
    }
}

/// Styled check mark
pub fn check() -> String {
    CHECK.success()
}

/// Styled cross mark
pub fn cross() -> String {
    CROSS.error()
}
