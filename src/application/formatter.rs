//! Output formatting for the `config` command.
//!
//! Renders the merged configuration, the `env` aliases, and the loaded hooks
//! and extensions.

use std::sync::Arc;

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Table};
use serde_json::Value;

use crate::domain::{Extension, StoreHandle};

use super::config_store::{ConfigStore, HookTable};

/// Formats the merged configuration as pretty JSON.
///
/// # Errors
/// Returns error if serialization fails.
pub fn format_config_json(config: &ConfigStore) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(config.as_map())
}

/// Formats a table of `env` aliases and the databases they resolve to.
pub fn format_env_table(config: &ConfigStore) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Alias", "Database", "Name"]);

    let aliases = config
        .as_map()
        .get("env")
        .and_then(Value::as_object)
        .map(|env| env.keys().cloned().collect::<Vec<_>>())
        .unwrap_or_default();

    for alias in &aliases {
        let dbs = config.store_handles(Some(alias)).map_or_else(
            |e| format!("invalid: {e}"),
            |handles| {
                handles
                    .iter()
                    .map(StoreHandle::to_string)
                    .collect::<Vec<_>>()
                    .join("\n")
            },
        );
        let name = config.app_name(Some(alias), None).unwrap_or_else(|| "-".into());

        table.add_row(vec![alias.as_str(), &dbs, &truncate(&name, 30)]);
    }

    table.to_string()
}

/// Formats hook URIs grouped by phase.
pub fn format_hooks(hooks: &HookTable) -> String {
    if hooks.is_empty() {
        return format!("{}\n  (none)", "Hooks".bold());
    }

    let mut out = format!("{}", "Hooks".bold());
    for phase in hooks.phases() {
        out.push_str(&format!("\n  {}", phase.cyan()));
        for hook in hooks.get(phase) {
            out.push_str(&format!("\n    {}", hook.uri()));
        }
    }
    out
}

/// Formats loaded extensions as `name  uri` lines.
pub fn format_extensions(extensions: &[Arc<dyn Extension>]) -> String {
    if extensions.is_empty() {
        return format!("{}\n  (none)", "Extensions".bold());
    }

    let width = extensions.iter().map(|e| e.name().len()).max().unwrap_or(0);
    let mut out = format!("{}", "Extensions".bold());
    for ext in extensions {
        let name = format!("{:width$}", ext.name());
        out.push_str(&format!("\n  {}  {}", name.green(), ext.uri()));
    }
    out
}

/// Truncates a string to max length with ellipsis.
fn truncate(s: &str, max_len: usize) -> String {
    let s = s.lines().next().unwrap_or(s);
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head = s.chars().take(max_len - 3).collect::<String>();
        format!("{head}...")
    }
}
