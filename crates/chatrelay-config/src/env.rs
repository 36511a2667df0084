use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Matches `{{ env.VAR }}` and `{{ env.VAR | default("fallback") }}`
static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{\{\s*([a-zA-Z0-9_.]+)\s*(?:\|\s*default\("([^"]*)"\))?\s*\}\}"#).expect("must be valid regex")
});

/// Failure to expand a placeholder in the raw config text
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EnvExpansionError {
    /// Variable is unset and the placeholder has no default
    #[error("environment variable not found: `{0}`")]
    MissingVariable(String),
    /// Placeholder is not scoped with `env.`
    #[error("only variables scoped with 'env.' are supported: `{0}`")]
    UnsupportedScope(String),
}

/// Expand `{{ env.VAR }}` placeholders in raw TOML text
///
/// Runs before deserialization so secrets such as API keys never have to be
/// written into the file. Comment lines are passed through untouched.
pub fn expand_env(input: &str) -> Result<String, EnvExpansionError> {
    let mut output = input
        .lines()
        .map(|line| {
            if line.trim_start().starts_with('#') {
                Ok(line.to_owned())
            } else {
                expand_line(line)
            }
        })
        .collect::<Result<Vec<_>, _>>()?
        .join("\n");

    if input.ends_with('\n') {
        output.push('\n');
    }

    Ok(output)
}

fn expand_line(line: &str) -> Result<String, EnvExpansionError> {
    let mut expanded = String::with_capacity(line.len());
    let mut last_end = 0;

    for captures in PLACEHOLDER_RE.captures_iter(line) {
        let Some(whole) = captures.get(0) else {
            continue;
        };

        expanded.push_str(&line[last_end..whole.start()]);
        expanded.push_str(&resolve(&captures)?);
        last_end = whole.end();
    }

    expanded.push_str(&line[last_end..]);
    Ok(expanded)
}

fn resolve(captures: &Captures<'_>) -> Result<String, EnvExpansionError> {
    let key = captures.get(1).map_or("", |m| m.as_str());
    let default = captures.get(2).map(|m| m.as_str());

    let Some(var_name) = key.strip_prefix("env.").filter(|name| !name.contains('.')) else {
        return Err(EnvExpansionError::UnsupportedScope(key.to_owned()));
    };

    match (std::env::var(var_name), default) {
        (Ok(value), _) => Ok(value),
        (Err(_), Some(default)) => Ok(default.to_owned()),
        (Err(_), None) => Err(EnvExpansionError::MissingVariable(var_name.to_owned())),
    }
}
