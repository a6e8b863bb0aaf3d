//! Resolution of extension and hook URIs.

use std::sync::Arc;

use crate::domain::{AppError, Extension, Hook, Result};
use crate::infrastructure::{CommandExtension, ShellHook};

use super::config_store::ConfigStore;

/// Turns declared URIs into loaded handles.
pub trait ModuleLoader: Send + Sync {
    /// Load one extension; `config` is available for the extension to read.
    ///
    /// # Errors
    /// Returns error if the URI cannot be resolved.
    fn load_extension(&self, uri: &str, config: &ConfigStore) -> Result<Arc<dyn Extension>>;

    /// Load one hook.
    ///
    /// # Errors
    /// Returns error if the URI cannot be resolved.
    fn load_hook(&self, uri: &str, config: &ConfigStore) -> Result<Arc<dyn Hook>>;
}

/// Splits `scheme:rest`; a bare command has no scheme.
///
/// Drive letters and URL-ish strings (`C:\`, `http://`) are not schemes here.
fn split_scheme(uri: &str) -> (Option<&str>, &str) {
    match uri.split_once(':') {
        Some((scheme, rest))
            if scheme.len() > 1
                && !rest.starts_with("//")
                && !rest.starts_with('\\')
                && scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') =>
        {
            (Some(scheme), rest)
        }
        _ => (None, uri),
    }
}

/// Default loader: hooks are shell commands, extensions are executables.
///
/// Hook URIs: `shell:<command>` or a bare command.
/// Extension URIs: `exec:<program>` or a bare program.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandLoader;

impl ModuleLoader for CommandLoader {
    fn load_extension(&self, uri: &str, config: &ConfigStore) -> Result<Arc<dyn Extension>> {
        let program = match split_scheme(uri) {
            (None, program) | (Some("exec"), program) => program.trim(),
            (Some(scheme), _) => {
                return Err(AppError::Extension {
                    message: format!("Unsupported extension scheme '{scheme}' in '{uri}'"),
                })
            }
        };
        if program.is_empty() {
            return Err(AppError::Extension {
                message: format!("Empty extension URI '{uri}'"),
            });
        }

        tracing::debug!(uri, "Loaded extension");
        Ok(Arc::new(CommandExtension::new(
            uri,
            program,
            config.app_dir().map(std::path::Path::to_path_buf),
        )))
    }

    fn load_hook(&self, uri: &str, _config: &ConfigStore) -> Result<Arc<dyn Hook>> {
        let command = match split_scheme(uri) {
            (None, command) | (Some("shell"), command) => command.trim(),
            (Some(scheme), _) => {
                return Err(AppError::Extension {
                    message: format!("Unsupported hook scheme '{scheme}' in '{uri}'"),
                })
            }
        };
        if command.is_empty() {
            return Err(AppError::Extension {
                message: format!("Empty hook URI '{uri}'"),
            });
        }

        tracing::debug!(uri, "Loaded hook");
        Ok(Arc::new(ShellHook::new(uri, command)))
    }
}
