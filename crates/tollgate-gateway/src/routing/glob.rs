//! Path globs: `*` stays within one segment, `**` crosses segments, `?` is one
//! non-separator character. Everything else is literal.

use crate::config::{ConfigError, VariableTable};
use regex::Regex;

#[derive(Debug, Clone)]
pub struct Glob {
    pattern: String,
    regex: Regex,
}

impl Glob {
    pub fn compile(pattern: &str) -> Result<Self, GlobError> {
        if pattern.is_empty() {
            return Err(GlobError::Empty);
        }
        let regex = Regex::new(&glob_to_regex(pattern))?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GlobError {
    #[error("glob is empty")]
    Empty,
    #[error(transparent)]
    Regex(#[from] regex::Error),
}

fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() * 2 + 2);
    out.push('^');
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                out.push_str(".*");
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            other => out.push_str(&regex::escape(other.encode_utf8(&mut [0u8; 4]))),
        }
    }
    out.push('$');
    out
}

/// Compile a glob from the config, naming the offending key on failure.
pub fn compile_config_glob(key: &str, pattern: &str) -> Result<Glob, ConfigError> {
    Glob::compile(pattern).map_err(|e| ConfigError::InvalidGlob {
        key: key.to_string(),
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// A list of variable-resolved globs where any match counts.
#[derive(Debug, Clone, Default)]
pub struct GlobList {
    globs: Vec<Glob>,
}

impl GlobList {
    pub fn compile(
        key: &str,
        patterns: &[String],
        variables: &VariableTable,
    ) -> Result<Self, ConfigError> {
        let globs = patterns
            .iter()
            .map(|p| compile_config_glob(key, &variables.resolve(p)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { globs })
    }

    pub fn matches(&self, path: &str) -> bool {
        self.globs.iter().any(|g| g.is_match(path))
    }

    pub fn is_empty(&self) -> bool {
        self.globs.is_empty()
    }
}
