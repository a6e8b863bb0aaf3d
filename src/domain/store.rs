//! Store handles, push options and command results.
//!
//! A `StoreHandle` is a resolved reference to one remote database. Handles
//! are always produced as a list because one alias may fan out to several
//! physical stores.

#[cfg(test)]
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A resolved, directly-usable reference to one remote database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreHandle {
    /// Absolute database URL.
    pub url: String,

    /// Whether requests should go through the configured HTTP proxy.
    pub use_proxy: bool,
}

impl StoreHandle {
    /// Create a new handle.
    #[must_use]
    pub fn new(url: impl Into<String>, use_proxy: bool) -> Self {
        Self {
            url: url.into(),
            use_proxy,
        }
    }
}

impl std::fmt::Display for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// Flags forwarded verbatim to the document collaborator on a network push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushOptions {
    /// Push the document body only, without attachments.
    pub doc_only: bool,

    /// Send the document and its attachments in a single request.
    pub atomic: bool,

    /// Report the application's index URL after pushing.
    pub browse: bool,
}

impl Default for PushOptions {
    fn default() -> Self {
        Self {
            doc_only: false,
            atomic: true,
            browse: false,
        }
    }
}

/// Result of pushing or exporting one application bundle.
#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
    /// The document was written to the remote store(s); carries the index
    /// URLs to open when browsing.
    Pushed(Vec<String>),
    /// Export mode: the serialized document, no network I/O performed.
    Exported(serde_json::Value),
}

/// What a command hands back to the CLI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandReport {
    /// Process exit code.
    pub exit_code: i32,

    /// Serialized output to print, if any.
    pub output: Option<String>,
}

impl CommandReport {
    /// Successful command with nothing to print.
    #[must_use]
    pub const fn success() -> Self {
        Self {
            exit_code: 0,
            output: None,
        }
    }

    /// Successful command with output to print.
    #[must_use]
    pub const fn with_output(output: String) -> Self {
        Self {
            exit_code: 0,
            output: Some(output),
        }
    }
}

/// Source of process environment variables.
///
/// Injected wherever the environment is consulted (proxy detection, config
/// substitution) so tests can substitute it.
pub trait EnvLookup: Send + Sync {
    /// Value of the variable, if set.
    fn var(&self, name: &str) -> Option<String>;
}

/// Reads the real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvLookup for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Fixed set of variables.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct StaticEnv {
    vars: HashMap<String, String>,
}

#[cfg(test)]
impl StaticEnv {
    /// Build from name/value pairs.
    #[must_use]
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
impl EnvLookup for StaticEnv {
    fn var(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }
}
