//! Configuration file management.
//!
//! Handles locating the global rc file and reading/writing JSON files with
//! optional environment-variable substitution.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::domain::{AppError, EnvLookup, Result};

/// Global configuration file name inside the home directory.
const GLOBAL_CONFIG_NAME: &str = ".couchapp.conf";

/// Overrides the global configuration search path.
const CONFIG_PATH_VAR: &str = "COUCHAPPCONF_PATH";

/// Candidate global configuration files, in override order.
///
/// `COUCHAPPCONF_PATH` wins when set; each entry may name a file or a
/// directory holding `.couchapp.conf`. Otherwise `~/.couchapp.conf`.
#[must_use]
pub fn rc_paths(env: &dyn EnvLookup) -> Vec<PathBuf> {
    if let Some(value) = env.var(CONFIG_PATH_VAR).filter(|v| !v.trim().is_empty()) {
        return std::env::split_paths(&value)
            .map(|p| {
                if p.is_dir() {
                    p.join(GLOBAL_CONFIG_NAME)
                } else {
                    p
                }
            })
            .collect();
    }

    dirs::home_dir()
        .map(|home| vec![home.join(GLOBAL_CONFIG_NAME)])
        .unwrap_or_default()
}

/// Read a JSON object from `path`.
///
/// With `use_environment`, `$NAME` and `${NAME}` are expanded before parsing.
/// With `raise_on_error` unset, a parse failure is logged and yields an
/// empty mapping.
///
/// # Errors
/// Returns error if the file cannot be read, or (with `raise_on_error`) if it
/// is not a JSON object.
pub fn read_json(
    path: &Path,
    env: &dyn EnvLookup,
    use_environment: bool,
    raise_on_error: bool,
) -> Result<Map<String, Value>> {
    let content = fs::read_to_string(path)
        .map_err(|e| AppError::io(format!("Failed to read {}", path.display()), e))?;

    let content = if use_environment {
        expand_vars(&content, env)
    } else {
        content
    };

    match serde_json::from_str::<Value>(&content) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) if raise_on_error => Err(AppError::JsonParse {
            message: format!("{} does not contain a JSON object", path.display()),
            source: None,
        }),
        Err(e) if raise_on_error => Err(AppError::json_parse(e)),
        _ => {
            tracing::warn!(path = %path.display(), "Ignoring unreadable JSON file");
            Ok(Map::new())
        }
    }
}

/// Write `value` as pretty JSON, creating parent directories.
///
/// # Errors
/// Returns error if serialization or the write fails.
pub fn write_json(path: &Path, value: &Value) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| AppError::io(format!("Failed to create {}", parent.display()), e))?;
    }

    let content = serde_json::to_string_pretty(value).map_err(AppError::json_parse)?;
    fs::write(path, content)
        .map_err(|e| AppError::io(format!("Failed to write {}", path.display()), e))?;

    tracing::debug!(path = %path.display(), "Wrote JSON file");
    Ok(())
}

/// Expand `$NAME` and `${NAME}` references. Unknown variables stay verbatim.
#[must_use]
pub fn expand_vars(input: &str, env: &dyn EnvLookup) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            }
        } else {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], end)
        };

        match env.var(name).filter(|_| !name.is_empty()) {
            Some(value) => out.push_str(&value),
            None => {
                out.push('$');
                out.push_str(&after[..consumed]);
            }
        }
        rest = &after[consumed..];
    }

    out.push_str(rest);
    out
}
