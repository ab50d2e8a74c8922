//! Placeholder substitution for parameterized query files.
//!
//! Queries and view definitions are stored as text files containing
//! doubly-braced placeholders (`{{dataset_name}}`). Rendering replaces
//! every occurrence of each declared key with its literal value. This is
//! deliberately a narrow text-substitution function with a fixed key set,
//! not a templating engine: no conditionals, no recursion, no escaping.

use indexmap::IndexMap;
use snafu::prelude::*;
use std::path::Path;

use crate::error::{ReadTemplateSnafu, TemplateError};

/// Immutable mapping from placeholder key to substitution value.
///
/// Built once per pipeline instantiation and threaded through every
/// query and verification step. Iteration order is insertion order,
/// which keeps substitution deterministic.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: IndexMap<String, String>,
}

impl Environment {
    /// Create an empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key/value pair, builder style.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Look up a substitution value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Iterate over pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }
}

/// Replace every `{{key}}` occurrence for each declared key.
///
/// Substituting an empty environment is the identity function. No value
/// may itself contain another key's placeholder token; with the fixed
/// dataset/project key set this cannot arise.
pub fn render(text: &str, env: &Environment) -> String {
    let mut out = text.to_string();
    for (key, value) in env.iter() {
        let token = format!("{{{{{key}}}}}");
        out = out.replace(&token, value);
    }
    out
}

/// Read a file and render it against the environment.
pub fn read_rendered(path: &Path, env: &Environment) -> Result<String, TemplateError> {
    let content = std::fs::read_to_string(path).context(ReadTemplateSnafu { path })?;
    Ok(render(&content, env))
}

/// Read a file verbatim (descriptions carry no placeholders).
pub fn read_file(path: &Path) -> Result<String, TemplateError> {
    std::fs::read_to_string(path).context(ReadTemplateSnafu { path })
}
