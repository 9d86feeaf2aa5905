//! Comment command parsing.
//!
//! A command is the first word following a mention of the app, e.g.
//! `@mergequeue try-merge`. The mention must stand alone: `foo@mergequeue` and
//! `@mergequeuebot` do not count.

use regex::Regex;

/// Default mention that addresses the app in comments.
pub const DEFAULT_MENTION: &str = "@mergequeue";

/// Commands the queue understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueCommand {
    /// Add the pull request to the merge queue.
    Merge,
    /// Collect the pull request into the next batch merge.
    BatchMerge,
    /// Remove the pull request from the queue if it has not started.
    Cancel,
}

impl std::fmt::Display for QueueCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Merge => write!(f, "try-merge"),
            Self::BatchMerge => write!(f, "try-batchmerge"),
            Self::Cancel => write!(f, "cancel"),
        }
    }
}

/// Result of scanning a comment body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedComment {
    /// The app was not mentioned; the comment is not for us.
    NotAddressed,
    /// A recognized command.
    Command(QueueCommand),
    /// The app was mentioned without a known command (`None` = no word at all).
    Unknown(Option<String>),
}

/// Parses queue commands out of comment bodies.
#[derive(Debug, Clone)]
pub struct CommandParser {
    mention: String,
    pattern: Regex,
}

impl CommandParser {
    /// Creates a parser for the given mention (e.g. `@mergequeue`).
    #[must_use]
    pub fn new(mention: &str) -> Self {
        let pattern = format!(r"(?:^|\s){}(?:\s+(\S+))?(?:\s|$)", regex::escape(mention));
        Self {
            mention: mention.to_string(),
            // The pattern is built from an escaped literal, so it always compiles.
            pattern: Regex::new(&pattern).expect("escaped mention is a valid regex"),
        }
    }

    /// The mention this parser responds to.
    #[must_use]
    pub fn mention(&self) -> &str {
        &self.mention
    }

    /// Scans a comment body for a command.
    #[must_use]
    pub fn parse(&self, body: &str) -> ParsedComment {
        let Some(captures) = self.pattern.captures(body) else {
            return ParsedComment::NotAddressed;
        };

        let Some(word) = captures.get(1).map(|m| m.as_str()) else {
            return ParsedComment::Unknown(None);
        };

        match word.to_ascii_lowercase().as_str() {
            "try-merge" | "merge" => ParsedComment::Command(QueueCommand::Merge),
            "try-batchmerge" | "batchmerge" => ParsedComment::Command(QueueCommand::BatchMerge),
            "cancel" => ParsedComment::Command(QueueCommand::Cancel),
            _ => ParsedComment::Unknown(Some(word.to_string())),
        }
    }
}

impl Default for CommandParser {
    fn default() -> Self {
        Self::new(DEFAULT_MENTION)
    }
}
