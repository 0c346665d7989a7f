//! Object name patterns (shell glob or regex)

use crate::error::{DevstageError, DevstageResult};
use regex::Regex;
use std::fmt;

#[derive(Debug, Clone)]
enum Matcher {
    Exact,
    Glob(glob::Pattern),
    Regex(Regex),
}

/// Matches object basenames.
///
/// Globs must match the whole name; regexes match anywhere in it. An optional
/// reject regex removes names that would otherwise match.
#[derive(Debug, Clone)]
pub struct NamePattern {
    source: String,
    matcher: Matcher,
    reject: Option<Regex>,
}

impl NamePattern {
    /// Compile a shell-style glob
    pub fn glob(pattern: &str) -> DevstageResult<Self> {
        let compiled =
            glob::Pattern::new(pattern).map_err(|e| DevstageError::PatternInvalid {
                kind: "glob",
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            source: pattern.to_string(),
            matcher: Matcher::Glob(compiled),
            reject: None,
        })
    }

    /// Compile a regex
    pub fn regex(pattern: &str) -> DevstageResult<Self> {
        Ok(Self {
            source: pattern.to_string(),
            matcher: Matcher::Regex(compile_regex(pattern)?),
            reject: None,
        })
    }

    /// Match exactly `name`, even if it contains glob metacharacters
    pub fn literal(name: &str) -> Self {
        Self {
            source: name.to_string(),
            matcher: Matcher::Exact,
            reject: None,
        }
    }

    /// Compile either flavour
    pub fn new(pattern: &str, is_regex: bool) -> DevstageResult<Self> {
        if is_regex {
            Self::regex(pattern)
        } else {
            Self::glob(pattern)
        }
    }

    /// Exclude names matching `reject` (searched anywhere in the name)
    pub fn rejecting(mut self, reject: &str) -> DevstageResult<Self> {
        self.reject = Some(compile_regex(reject)?);
        Ok(self)
    }

    pub fn is_match(&self, name: &str) -> bool {
        let accepted = match &self.matcher {
            Matcher::Exact => self.source == name,
            Matcher::Glob(p) => p.matches(name),
            Matcher::Regex(r) => r.is_match(name),
        };
        accepted && !self.reject.as_ref().is_some_and(|r| r.is_match(name))
    }

    /// True if this names exactly one object
    pub fn is_literal(&self) -> bool {
        match self.matcher {
            Matcher::Exact => true,
            Matcher::Glob(_) => self.reject.is_none() && !self.source.contains(['*', '?', '[']),
            Matcher::Regex(_) => false,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

fn compile_regex(pattern: &str) -> DevstageResult<Regex> {
    Regex::new(pattern).map_err(|e| DevstageError::PatternInvalid {
        kind: "regex",
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}
