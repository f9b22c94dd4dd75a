//! Output lines and line filtering

use regex::{Regex, RegexBuilder};

use crate::error::{Error, Result};

/// Compiled size limit for client supplied patterns
const PATTERN_SIZE_LIMIT: usize = 1 << 20;

/// Source of a line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineSource {
    /// Standard output
    Stdout,
    /// Standard error
    Stderr,
}

impl LineSource {
    /// Single letter tag used on the wire (`o` / `e`)
    pub fn tag(self) -> &'static str {
        match self {
            LineSource::Stdout => "o",
            LineSource::Stderr => "e",
        }
    }
}

/// One complete line produced by a child process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineEvent {
    /// Which stream the line came from
    pub source: LineSource,
    /// Line contents without the trailing newline
    pub line: String,
}

impl LineEvent {
    /// A stdout line
    pub fn stdout(line: impl Into<String>) -> Self {
        Self {
            source: LineSource::Stdout,
            line: line.into(),
        }
    }

    /// A stderr line
    pub fn stderr(line: impl Into<String>) -> Self {
        Self {
            source: LineSource::Stderr,
            line: line.into(),
        }
    }
}

/// Decides which lines reach the client
pub trait LineFilter: Send + Sync {
    /// Return false to drop the line
    fn accept(&self, line: &str, source: LineSource) -> bool;
}

/// A no-op filter that passes all lines through
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpFilter;

impl LineFilter for NoOpFilter {
    fn accept(&self, _line: &str, _source: LineSource) -> bool {
        true
    }
}

/// A compiled grep script.
///
/// Only stdout lines are matched; diagnostics on stderr always pass so the
/// client still learns that a file is missing.
#[derive(Debug, Clone)]
pub struct Pattern {
    regex: Regex,
}

impl Pattern {
    /// Compile a script, rejecting syntax errors and oversized programs
    pub fn compile(script: &str) -> Result<Self> {
        let regex = RegexBuilder::new(script)
            .size_limit(PATTERN_SIZE_LIMIT)
            .build()
            .map_err(|source| Error::InvalidPattern {
                pattern: script.to_string(),
                source,
            })?;
        Ok(Self { regex })
    }

    /// The script the pattern was compiled from
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// Whether a line matches
    pub fn is_match(&self, line: &str) -> bool {
        self.regex.is_match(line)
    }
}

impl LineFilter for Pattern {
    fn accept(&self, line: &str, source: LineSource) -> bool {
        match source {
            LineSource::Stdout => self.is_match(line),
            LineSource::Stderr => true,
        }
    }
}
