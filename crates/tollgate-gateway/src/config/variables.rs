//! `${name}` interpolation over the configured `variables` table.

use super::ConfigError;
use regex::{NoExpand, Regex};
use std::collections::HashMap;

/// A variable with its placeholder matcher compiled once at load.
#[derive(Debug, Clone)]
pub struct CompiledVariable {
    pub name: String,
    pub matcher: Regex,
    pub value: String,
}

/// Read-only after load; shared across tasks behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct VariableTable {
    variables: Vec<CompiledVariable>,
}

impl VariableTable {
    pub fn compile(variables: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut compiled = Vec::with_capacity(variables.len());
        for (name, value) in variables {
            if !is_valid_name(name) {
                return Err(ConfigError::InvalidVariable(name.clone()));
            }
            let pattern = format!(r"\$\{{{}\}}", regex::escape(name));
            let matcher = Regex::new(&pattern).map_err(|source| ConfigError::InvalidRegex {
                key: format!("variables.{name}"),
                pattern,
                source,
            })?;
            compiled.push(CompiledVariable {
                name: name.clone(),
                matcher,
                value: value.clone(),
            });
        }
        // HashMap order is arbitrary; keep resolution deterministic
        compiled.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Self {
            variables: compiled,
        })
    }

    /// Replace every known `${name}` in `template`. Unknown names and
    /// variables with empty values are left untouched.
    pub fn resolve(&self, template: &str) -> String {
        if !template.contains("${") {
            return template.to_string();
        }
        let mut resolved = template.to_string();
        for variable in &self.variables {
            if variable.value.is_empty() {
                continue;
            }
            resolved = variable
                .matcher
                .replace_all(&resolved, NoExpand(&variable.value))
                .into_owned();
        }
        resolved
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}
