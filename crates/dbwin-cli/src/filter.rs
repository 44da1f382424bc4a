//! Ignore rules for message text
//!
//! Patterns are globs matched case-insensitively against the whole message
//! text, so `*heartbeat*` hides every message mentioning a heartbeat.
//!
//! # Ignore file syntax
//!
//! - Lines starting with `#` are comments
//! - Empty lines are ignored
//! - Every other line is one pattern (`*`, `?`, `[abc]`, `{a,b}`)
//!
//! ```text
//! # Noisy GPU driver chatter
//! *D3D11 INFO*
//! perf:*
//! ```

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::fs;
use std::path::{Path, PathBuf};

/// Compiled set of ignore patterns
#[derive(Debug)]
pub struct IgnoreSet {
    patterns: GlobSet,
    pattern_count: usize,
}

impl Default for IgnoreSet {
    fn default() -> Self {
        Self::empty()
    }
}

impl IgnoreSet {
    /// Create an empty set (ignores nothing)
    pub fn empty() -> Self {
        Self {
            patterns: GlobSet::empty(),
            pattern_count: 0,
        }
    }

    /// Build from command-line patterns plus an optional ignore file
    pub fn build(patterns: &[String], file: Option<&Path>) -> Result<Self, FilterError> {
        let mut lines: Vec<(usize, String)> = Vec::new();

        if let Some(path) = file {
            let content = fs::read_to_string(path)
                .map_err(|e| FilterError::ReadError(path.to_path_buf(), e))?;
            lines.extend(pattern_lines(&content));
        }
        lines.extend(patterns.iter().map(|p| (0, p.clone())));

        Self::compile(lines)
    }

    /// Parse ignore-file content
    #[cfg(test)]
    pub fn parse(content: &str) -> Result<Self, FilterError> {
        Self::compile(pattern_lines(content).collect())
    }

    fn compile(lines: Vec<(usize, String)>) -> Result<Self, FilterError> {
        let mut builder = GlobSetBuilder::new();
        let mut pattern_count = 0;

        for (line_num, pattern) in lines {
            let glob = GlobBuilder::new(&pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| FilterError::InvalidPattern(line_num, pattern.clone(), e.to_string()))?;
            builder.add(glob);
            pattern_count += 1;
        }

        let patterns = builder
            .build()
            .map_err(|e| FilterError::BuildError(e.to_string()))?;

        Ok(Self {
            patterns,
            pattern_count,
        })
    }

    /// Check whether a message text should be hidden
    pub fn is_ignored(&self, text: &str) -> bool {
        if self.pattern_count == 0 {
            return false;
        }
        // Senders usually end lines with CR/LF; patterns should not have to
        self.patterns.is_match(text.trim_end_matches(['\r', '\n']))
    }

    /// Get the number of patterns loaded
    pub fn pattern_count(&self) -> usize {
        self.pattern_count
    }
}

/// Non-comment lines with their 1-based line numbers
fn pattern_lines(content: &str) -> impl Iterator<Item = (usize, String)> + '_ {
    content
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(i, line)| (i, line.to_string()))
}

/// Errors that can occur when loading ignore patterns
#[derive(Debug)]
pub enum FilterError {
    /// Failed to read the ignore file
    ReadError(PathBuf, std::io::Error),
    /// Invalid glob pattern (line 0 means it came from the command line)
    InvalidPattern(usize, String, String),
    /// Failed to build the glob set
    BuildError(String),
}

impl std::fmt::Display for FilterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReadError(path, e) => write!(f, "Failed to read {}: {}", path.display(), e),
            Self::InvalidPattern(0, pattern, e) => {
                write!(f, "Invalid pattern '{}' - {}", pattern, e)
            }
            Self::InvalidPattern(line, pattern, e) => {
                write!(f, "Invalid pattern on line {}: '{}' - {}", line, pattern, e)
            }
            Self::BuildError(e) => write!(f, "Failed to build pattern matcher: {}", e),
        }
    }
}

impl std::error::Error for FilterError {}
