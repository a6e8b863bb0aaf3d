//! Shell-backed hooks and extensions.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use crate::domain::{AppError, Extension, Hook, HookContext, Result};

/// Context JSON for the running hook.
pub const HOOK_CONTEXT_VAR: &str = "COUCHAPP_HOOK_CONTEXT";

/// Phase name of the running hook.
pub const HOOK_PHASE_VAR: &str = "COUCHAPP_HOOK";

/// Application directory of the running hook.
pub const HOOK_APP_DIR_VAR: &str = "COUCHAPP_APP_DIR";

fn shell(command_line: &str) -> Command {
    if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command_line);
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command_line);
        cmd
    }
}

/// Runs `<command> <phase>` through the platform shell.
#[derive(Debug, Clone)]
pub struct ShellHook {
    uri: String,
    command: String,
}

impl ShellHook {
    /// Create a hook from the URI it was declared with and its command line.
    #[must_use]
    pub fn new(uri: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            command: command.into(),
        }
    }
}

impl Hook for ShellHook {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn call(&self, app_path: &Path, phase: &str, context: &HookContext) -> Result<()> {
        let context_json = serde_json::to_string(context).map_err(AppError::json_parse)?;
        let command_line = format!("{} {}", self.command, phase);

        tracing::debug!(phase, command = %command_line, "Running hook");

        let output = shell(&command_line)
            .current_dir(app_path)
            .env(HOOK_CONTEXT_VAR, context_json)
            .env(HOOK_PHASE_VAR, phase)
            .env(HOOK_APP_DIR_VAR, app_path)
            .output()
            .map_err(|e| AppError::Hook {
                phase: phase.to_string(),
                message: format!("could not start '{}': {e}", self.command),
            })?;

        log_output(&output);

        if output.status.success() {
            Ok(())
        } else {
            Err(AppError::Hook {
                phase: phase.to_string(),
                message: format!(
                    "'{}' exited with {}: {}",
                    self.command,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            })
        }
    }
}

fn log_output(output: &Output) {
    for line in String::from_utf8_lossy(&output.stdout).lines() {
        tracing::info!(target: "hook", "{line}");
    }
    for line in String::from_utf8_lossy(&output.stderr).lines() {
        tracing::warn!(target: "hook", "{line}");
    }
}

/// An external program exposed as a named extension.
#[derive(Debug, Clone)]
pub struct CommandExtension {
    uri: String,
    name: String,
    program: String,
    working_dir: Option<PathBuf>,
}

impl CommandExtension {
    /// Create an extension for `program`, named after its file stem.
    #[must_use]
    pub fn new(uri: impl Into<String>, program: impl Into<String>, working_dir: Option<PathBuf>) -> Self {
        let program = program.into();
        let name = Path::new(&program)
            .file_stem()
            .map_or_else(|| program.clone(), |s| s.to_string_lossy().into_owned());

        Self {
            uri: uri.into(),
            name,
            program,
            working_dir,
        }
    }
}

impl Extension for CommandExtension {
    fn name(&self) -> &str {
        &self.name
    }

    fn uri(&self) -> &str {
        &self.uri
    }

    fn run(&self, args: &[String]) -> Result<i32> {
        let mut cmd = Command::new(&self.program);
        cmd.args(args);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        tracing::debug!(extension = %self.name, program = %self.program, "Running extension");

        let status = cmd.status().map_err(|e| AppError::Extension {
            message: format!("could not start '{}': {e}", self.program),
        })?;

        Ok(status.code().unwrap_or(1))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_shell_hook_receives_phase_and_context() {
        let dir = tempdir().unwrap();
        let hook = ShellHook::new(
            "shell:echo",
            r#"f() { echo "$1|$COUCHAPP_HOOK|$COUCHAPP_HOOK_CONTEXT" > hook.out; }; f"#,
        );

        let mut context = HookContext::new();
        context.insert("dbs".into(), serde_json::json!("http://localhost/db"));
        hook.call(dir.path(), "pre-push", &context).unwrap();

        let written = fs::read_to_string(dir.path().join("hook.out")).unwrap();
        assert_eq!(
            written.trim(),
            r#"pre-push|pre-push|{"dbs":"http://localhost/db"}"#
        );
    }

    #[test]
    fn test_failing_shell_hook() {
        let dir = tempdir().unwrap();
        let hook = ShellHook::new("false", "false");

        let err = hook
            .call(dir.path(), "post-push", &HookContext::new())
            .unwrap_err();
        assert!(matches!(err, AppError::Hook { ref phase, .. } if phase == "post-push"));
    }

    #[test]
    fn test_command_extension_name_and_exit_code() {
        let ext = CommandExtension::new("exec:/bin/sh", "/bin/sh", None);
        assert_eq!(ext.name(), "sh");
        assert_eq!(ext.run(&["-c".into(), "exit 3".into()]).unwrap(), 3);
    }

    #[test]
    fn test_missing_extension_program() {
        let ext = CommandExtension::new("exec:nope", "/definitely/not/here", None);
        assert!(matches!(ext.run(&[]), Err(AppError::Extension { .. })));
    }
}
