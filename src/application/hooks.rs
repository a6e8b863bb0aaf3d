//! Hook dispatch around pushes.

use std::path::Path;

use crate::domain::{HookContext, Result};

use super::config_store::ConfigStore;

/// Run every hook declared for `phase`, in declaration order.
///
/// Hooks are resolved from the configuration on each call. The first
/// failure is returned unchanged and later hooks do not run.
///
/// # Errors
/// Returns the loader's or the failing hook's error.
pub fn run_hooks(
    config: &ConfigStore,
    app_path: &Path,
    phase: &str,
    context: &HookContext,
) -> Result<()> {
    let table = config.hooks()?;
    let hooks = table.get(phase);

    if hooks.is_empty() {
        return Ok(());
    }

    tracing::info!(phase, app = %app_path.display(), count = hooks.len(), "Running hooks");
    for hook in hooks {
        hook.call(app_path, phase, context)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::loader::ModuleLoader;
    use crate::domain::{AppError, Extension, Hook, StaticEnv};
    use serde_json::json;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    type CallLog = Arc<Mutex<Vec<(String, String, HookContext)>>>;

    #[derive(Debug)]
    struct RecordingHook {
        uri: String,
        log: CallLog,
    }

    impl Hook for RecordingHook {
        fn uri(&self) -> &str {
            &self.uri
        }

        fn call(&self, _app_path: &Path, phase: &str, context: &HookContext) -> Result<()> {
            self.log
                .lock()
                .unwrap()
                .push((self.uri.clone(), phase.to_string(), context.clone()));
            if self.uri == "fail" {
                return Err(AppError::Hook {
                    phase: phase.to_string(),
                    message: "boom".into(),
                });
            }
            Ok(())
        }
    }

    struct RecordingLoader {
        log: CallLog,
    }

    impl ModuleLoader for RecordingLoader {
        fn load_extension(&self, uri: &str, _config: &ConfigStore) -> Result<Arc<dyn Extension>> {
            Err(AppError::Extension {
                message: format!("unexpected extension {uri}"),
            })
        }

        fn load_hook(&self, uri: &str, _config: &ConfigStore) -> Result<Arc<dyn Hook>> {
            Ok(Arc::new(RecordingHook {
                uri: uri.to_string(),
                log: self.log.clone(),
            }))
        }
    }

    fn config_with_hooks(hooks: serde_json::Value) -> (tempfile::TempDir, PathBuf, ConfigStore, CallLog) {
        let dir = tempdir().unwrap();
        let app = dir.path().join("app");
        std::fs::create_dir_all(&app).unwrap();
        std::fs::write(app.join(".couchapprc"), json!({"hooks": hooks}).to_string()).unwrap();

        let log = CallLog::default();
        let config = ConfigStore::builder()
            .app_dir(Some(app.clone()))
            .env(Arc::new(StaticEnv::default()))
            .loader(Arc::new(RecordingLoader { log: log.clone() }))
            .build()
            .unwrap();
        (dir, app, config, log)
    }

    #[test]
    fn test_runs_phase_hooks_in_order() {
        let (_dir, app, config, log) =
            config_with_hooks(json!({"pre-push": ["first", "second"], "post-push": ["after"]}));

        let mut context = HookContext::new();
        context.insert("dbs".into(), json!("http://localhost/db"));
        run_hooks(&config, &app, "pre-push", &context).unwrap();

        let calls = log.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, "first");
        assert_eq!(calls[1].0, "second");
        assert!(calls.iter().all(|(_, phase, ctx)| phase == "pre-push" && ctx == &context));
    }

    #[test]
    fn test_unknown_phase_is_noop() {
        let (_dir, app, config, log) = config_with_hooks(json!({"pre-push": ["first"]}));
        run_hooks(&config, &app, "post-push", &HookContext::new()).unwrap();
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_failure_stops_later_hooks() {
        let (_dir, app, config, log) = config_with_hooks(json!({"pre-push": ["fail", "never"]}));

        let err = run_hooks(&config, &app, "pre-push", &HookContext::new()).unwrap_err();
        assert!(matches!(err, AppError::Hook { .. }));
        assert_eq!(log.lock().unwrap().len(), 1);
    }
}
