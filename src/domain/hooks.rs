//! Hook and extension contracts.
//!
//! Hooks run around each network push; extensions are external command
//! providers declared in configuration. Both are resolved from URI strings
//! by a loader and are never cached by the configuration store.

use std::fmt::Debug;
use std::path::Path;

use super::Result;

/// Phase name invoked immediately before a push.
pub const PRE_PUSH: &str = "pre-push";

/// Phase name invoked immediately after a push.
pub const POST_PUSH: &str = "post-push";

/// Keyword data handed to each hook.
pub type HookContext = serde_json::Map<String, serde_json::Value>;

/// A loaded hook.
pub trait Hook: Debug + Send + Sync {
    /// The URI this hook was loaded from.
    fn uri(&self) -> &str;

    /// Run the hook for `app_path` in the given phase.
    ///
    /// # Errors
    /// Returns error if the hook fails; callers propagate it unchanged.
    fn call(&self, app_path: &Path, phase: &str, context: &HookContext) -> Result<()>;
}

/// A loaded extension.
pub trait Extension: Debug + Send + Sync {
    /// Name the extension is invoked by.
    fn name(&self) -> &str;

    /// The URI this extension was loaded from.
    fn uri(&self) -> &str;

    /// Run the extension with user-supplied arguments, returning its exit code.
    ///
    /// # Errors
    /// Returns error if the extension cannot be started.
    fn run(&self, args: &[String]) -> Result<i32>;
}
