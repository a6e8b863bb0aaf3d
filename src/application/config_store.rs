//! Layered configuration store.
//!
//! Merges the global rc file(s) with the local configuration of the current
//! application, resolves database aliases, and materializes the declared
//! extensions and hooks on every access.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::domain::{AppError, EnvLookup, Extension, Hook, ProcessEnv, Result, StoreHandle};
use crate::infrastructure::{find_app_dir, rc_paths, read_json, LOCAL_CONFIG_FILES};

use super::environment::EnvironmentResolver;
use super::loader::{CommandLoader, ModuleLoader};

/// Seed for the global mapping.
fn defaults() -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("env".into(), Value::Object(Map::new()));
    map.insert("extensions".into(), Value::Array(Vec::new()));
    map.insert("hooks".into(), Value::Object(Map::new()));
    map
}

/// Loaded hooks grouped by phase, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct HookTable {
    phases: Vec<(String, Vec<Arc<dyn Hook>>)>,
}

impl HookTable {
    /// Hooks declared for `phase`; empty if none.
    #[must_use]
    pub fn get(&self, phase: &str) -> &[Arc<dyn Hook>] {
        self.phases
            .iter()
            .find(|(name, _)| name == phase)
            .map(|(_, hooks)| hooks.as_slice())
            .unwrap_or_default()
    }

    /// Phase names in declaration order.
    pub fn phases(&self) -> impl Iterator<Item = &str> {
        self.phases.iter().map(|(name, _)| name.as_str())
    }

    /// Whether no phase declares any hook.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.phases.iter().all(|(_, hooks)| hooks.is_empty())
    }
}

/// A configuration lookup result.
#[derive(Debug, Clone)]
pub enum ConfigEntry {
    /// The computed `extensions` property.
    Extensions(Vec<Arc<dyn Extension>>),
    /// The computed `hooks` property.
    Hooks(HookTable),
    /// A plain value from the merged mapping.
    Value(Value),
}

impl ConfigEntry {
    /// The plain value, if this entry is one.
    #[must_use]
    pub const fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }
}

/// Builder for [`ConfigStore`].
pub struct ConfigStoreBuilder {
    global_paths: Vec<PathBuf>,
    app_dir: Option<PathBuf>,
    env: Arc<dyn EnvLookup>,
    loader: Arc<dyn ModuleLoader>,
}

impl ConfigStoreBuilder {
    /// Global configuration files, in override order.
    #[must_use]
    pub fn global_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.global_paths = paths;
        self
    }

    /// The application directory whose local configuration applies.
    #[must_use]
    pub fn app_dir(mut self, app_dir: Option<PathBuf>) -> Self {
        self.app_dir = app_dir;
        self
    }

    /// Environment used for substitution and proxy detection.
    #[must_use]
    pub fn env(mut self, env: Arc<dyn EnvLookup>) -> Self {
        self.env = env;
        self
    }

    /// Loader resolving extension and hook URIs.
    #[must_use]
    pub fn loader(mut self, loader: Arc<dyn ModuleLoader>) -> Self {
        self.loader = loader;
        self
    }

    /// Load and merge the configuration.
    ///
    /// # Errors
    /// Returns error if any existing configuration file is malformed.
    pub fn build(self) -> Result<ConfigStore> {
        let global_conf = ConfigStore::load(&self.global_paths, defaults(), &*self.env)?;
        let local_conf = match self.app_dir.as_deref() {
            Some(dir) => ConfigStore::load_local(Some(dir), &*self.env)?,
            None => Map::new(),
        };

        let mut conf = global_conf.clone();
        conf.extend(local_conf.clone());

        tracing::debug!(
            global_files = self.global_paths.len(),
            app_dir = ?self.app_dir,
            keys = conf.len(),
            "Configuration loaded"
        );

        Ok(ConfigStore {
            rc_paths: self.global_paths,
            app_dir: self.app_dir,
            global_conf,
            local_conf,
            conf,
            env: self.env,
            loader: self.loader,
        })
    }
}

/// Merged global + local configuration.
pub struct ConfigStore {
    rc_paths: Vec<PathBuf>,
    app_dir: Option<PathBuf>,
    global_conf: Map<String, Value>,
    local_conf: Map<String, Value>,
    conf: Map<String, Value>,
    env: Arc<dyn EnvLookup>,
    loader: Arc<dyn ModuleLoader>,
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStore")
            .field("rc_paths", &self.rc_paths)
            .field("app_dir", &self.app_dir)
            .field("conf", &self.conf)
            .finish_non_exhaustive()
    }
}

impl ConfigStore {
    /// Start a builder reading the process environment with the default loader.
    #[must_use]
    pub fn builder() -> ConfigStoreBuilder {
        ConfigStoreBuilder {
            global_paths: Vec::new(),
            app_dir: None,
            env: Arc::new(ProcessEnv),
            loader: Arc::new(CommandLoader),
        }
    }

    /// Build from the real process: rc path and the app enclosing the cwd.
    ///
    /// # Errors
    /// Returns error if any existing configuration file is malformed.
    pub fn discover() -> Result<Self> {
        let env = ProcessEnv;
        let app_dir = std::env::current_dir()
            .ok()
            .and_then(|cwd| find_app_dir(&cwd));

        Self::builder()
            .global_paths(rc_paths(&env))
            .app_dir(app_dir)
            .build()
    }

    /// Merge every existing file in `paths` on top of `defaults`.
    ///
    /// Missing files are skipped; later files win key-for-key.
    ///
    /// # Errors
    /// Returns a configuration error naming the file that failed to parse.
    pub fn load<P: AsRef<Path>>(
        paths: &[P],
        defaults: Map<String, Value>,
        env: &dyn EnvLookup,
    ) -> Result<Map<String, Value>> {
        let mut conf = defaults;

        for path in paths {
            let path: &Path = path.as_ref();
            if !path.is_file() {
                continue;
            }

            let loaded = read_json(path, env, true, true).map_err(|e| {
                tracing::debug!(path = %path.display(), error = %e, "Invalid configuration file");
                AppError::config(format!("Error while reading '{}'", path.display()))
            })?;

            tracing::debug!(path = %path.display(), keys = loaded.len(), "Merged configuration file");
            conf.extend(loaded);
        }

        Ok(conf)
    }

    /// Load `couchapp.json` then `.couchapprc` from an application directory.
    ///
    /// # Errors
    /// Returns error when no application directory is given, or a file is
    /// malformed.
    pub fn load_local(app_path: Option<&Path>, env: &dyn EnvLookup) -> Result<Map<String, Value>> {
        let app_path = app_path.ok_or_else(|| AppError::config("You aren't in a couchapp."))?;

        let paths = LOCAL_CONFIG_FILES
            .iter()
            .map(|name| app_path.join(name))
            .collect::<Vec<_>>();
        Self::load(&paths, Map::new(), env)
    }

    /// Re-merge with the local configuration of `app_path`.
    ///
    /// Local settings accumulate across calls on top of the original global
    /// snapshot.
    ///
    /// # Errors
    /// Returns error if a local configuration file is malformed.
    pub fn update(&mut self, app_path: &Path) -> Result<()> {
        let loaded = Self::load_local(Some(app_path), &*self.env)?;
        self.local_conf.extend(loaded);

        let mut conf = self.global_conf.clone();
        conf.extend(self.local_conf.clone());
        self.conf = conf;
        self.app_dir = Some(app_path.to_path_buf());

        tracing::debug!(app_dir = %app_path.display(), "Configuration updated");
        Ok(())
    }

    /// Look up `key`: the computed `extensions` and `hooks` properties
    /// first, then the merged mapping.
    ///
    /// # Errors
    /// Returns `MissingKey` if absent, or the loader's error for a built-in.
    pub fn get(&self, key: &str) -> Result<ConfigEntry> {
        match key {
            "extensions" => Ok(ConfigEntry::Extensions(self.extensions()?)),
            "hooks" => Ok(ConfigEntry::Hooks(self.hooks()?)),
            _ => self
                .conf
                .get(key)
                .cloned()
                .map(ConfigEntry::Value)
                .ok_or_else(|| AppError::MissingKey { key: key.into() }),
        }
    }

    /// Like [`get`](Self::get), returning `default` when the key is absent.
    ///
    /// # Errors
    /// Returns the loader's error for a built-in property.
    pub fn get_or(&self, key: &str, default: Value) -> Result<ConfigEntry> {
        match self.get(key) {
            Err(AppError::MissingKey { .. }) => Ok(ConfigEntry::Value(default)),
            other => other,
        }
    }

    /// Whether the merged mapping holds `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.conf.contains_key(key)
    }

    /// Keys of the merged mapping, in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.conf.keys().map(String::as_str)
    }

    /// Every entry of the merged mapping, in key insertion order.
    ///
    /// # Errors
    /// Returns the loader's error if a built-in property fails to resolve.
    pub fn values(&self) -> Result<Vec<ConfigEntry>> {
        self.keys().map(|key| self.get(key)).collect()
    }

    /// The merged mapping.
    #[must_use]
    pub const fn as_map(&self) -> &Map<String, Value> {
        &self.conf
    }

    /// Global configuration files consulted.
    #[must_use]
    pub fn rc_paths(&self) -> &[PathBuf] {
        &self.rc_paths
    }

    /// Application directory whose local configuration is merged.
    #[must_use]
    pub fn app_dir(&self) -> Option<&Path> {
        self.app_dir.as_deref()
    }

    /// Load every declared extension. Not cached.
    ///
    /// # Errors
    /// Propagates the first loader failure.
    pub fn extensions(&self) -> Result<Vec<Arc<dyn Extension>>> {
        let Some(uris) = self.conf.get("extensions").and_then(Value::as_array) else {
            return Ok(Vec::new());
        };

        uris.iter()
            .map(|uri| {
                let uri = uri.as_str().ok_or_else(|| {
                    AppError::config(format!("Extension URI must be a string, got {uri}"))
                })?;
                self.loader.load_extension(uri, self)
            })
            .collect()
    }

    /// Load every declared hook, grouped by phase. Not cached.
    ///
    /// # Errors
    /// Propagates the first loader failure.
    pub fn hooks(&self) -> Result<HookTable> {
        let Some(declared) = self.conf.get("hooks").and_then(Value::as_object) else {
            return Ok(HookTable::default());
        };

        let mut phases = Vec::with_capacity(declared.len());
        for (phase, uris) in declared {
            let uris = match uris {
                Value::Array(items) => items.iter().collect::<Vec<_>>(),
                Value::String(_) => vec![uris],
                other => {
                    return Err(AppError::config(format!(
                        "Hooks for '{phase}' must be a list, got {other}"
                    )))
                }
            };

            let hooks = uris
                .into_iter()
                .map(|uri| {
                    let uri = uri.as_str().ok_or_else(|| {
                        AppError::config(format!("Hook URI must be a string, got {uri}"))
                    })?;
                    self.loader.load_hook(uri, self)
                })
                .collect::<Result<Vec<_>>>()?;
            phases.push((phase.clone(), hooks));
        }

        Ok(HookTable { phases })
    }

    fn resolver(&self) -> EnvironmentResolver<'_> {
        EnvironmentResolver::new(self.conf.get("env"), &*self.env)
    }

    /// Resolve a database token into store handles.
    ///
    /// # Errors
    /// Returns a configuration error if no database can be determined.
    pub fn store_handles(&self, db_token: Option<&str>) -> Result<Vec<StoreHandle>> {
        self.resolver().store_handles(db_token)
    }

    /// Friendly application name for a database token.
    #[must_use]
    pub fn app_name(&self, db_token: Option<&str>, default: Option<&str>) -> Option<String> {
        self.resolver().app_name(db_token, default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{HookContext, StaticEnv};
    use serde_json::json;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    #[derive(Debug)]
    struct NamedHook(String);

    impl Hook for NamedHook {
        fn uri(&self) -> &str {
            &self.0
        }

        fn call(&self, _app_path: &Path, _phase: &str, _context: &HookContext) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Debug)]
    struct NamedExtension(String);

    impl Extension for NamedExtension {
        fn name(&self) -> &str {
            &self.0
        }

        fn uri(&self) -> &str {
            &self.0
        }

        fn run(&self, _args: &[String]) -> Result<i32> {
            Ok(0)
        }
    }

    #[derive(Default)]
    struct CountingLoader {
        calls: AtomicUsize,
    }

    impl ModuleLoader for CountingLoader {
        fn load_extension(&self, uri: &str, config: &ConfigStore) -> Result<Arc<dyn Extension>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if uri == "broken" {
                return Err(AppError::Extension {
                    message: "no such extension".into(),
                });
            }
            assert!(config.contains_key("extensions"));
            Ok(Arc::new(NamedExtension(uri.to_string())))
        }

        fn load_hook(&self, uri: &str, _config: &ConfigStore) -> Result<Arc<dyn Hook>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(NamedHook(uri.to_string())))
        }
    }

    fn write(path: &Path, value: &Value) {
        fs::write(path, serde_json::to_string(value).unwrap()).unwrap();
    }

    fn app(root: &Path, name: &str, rc: Option<Value>, json: Option<Value>) -> PathBuf {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        if let Some(rc) = rc {
            write(&dir.join(".couchapprc"), &rc);
        }
        if let Some(json) = json {
            write(&dir.join("couchapp.json"), &json);
        }
        dir
    }

    fn store(global: &[PathBuf], app_dir: Option<PathBuf>) -> ConfigStore {
        ConfigStore::builder()
            .global_paths(global.to_vec())
            .app_dir(app_dir)
            .env(Arc::new(StaticEnv::default()))
            .loader(Arc::new(CountingLoader::default()))
            .build()
            .unwrap()
    }

    #[test]
    fn test_load_skips_missing_and_later_wins() {
        let dir = tempdir().unwrap();
        let first = dir.path().join("first.conf");
        let second = dir.path().join("second.conf");
        write(&first, &json!({"a": 1, "b": 1}));
        write(&second, &json!({"b": 2}));

        let paths = [first, dir.path().join("missing.conf"), second];
        let conf = ConfigStore::load(&paths, defaults(), &StaticEnv::default()).unwrap();

        assert_eq!(conf["a"], 1);
        assert_eq!(conf["b"], 2);
        assert_eq!(conf["env"], json!({}));
    }

    #[test]
    fn test_load_malformed_names_path() {
        let dir = tempdir().unwrap();
        let bad = dir.path().join("bad.conf");
        fs::write(&bad, "{oops").unwrap();

        let err = ConfigStore::load(&[&bad], Map::new(), &StaticEnv::default()).unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("bad.conf"));
    }

    #[test]
    fn test_load_local_requires_app() {
        let err = ConfigStore::load_local(None, &StaticEnv::default()).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_load_local_rc_overrides_json() {
        let dir = tempdir().unwrap();
        let path = app(
            dir.path(),
            "app",
            Some(json!({"name": "rc"})),
            Some(json!({"name": "json", "only_json": true})),
        );

        let local = ConfigStore::load_local(Some(&path), &StaticEnv::default()).unwrap();
        assert_eq!(local["name"], "rc");
        assert_eq!(local["only_json"], true);
    }

    #[test]
    fn test_local_wins_over_global() {
        let dir = tempdir().unwrap();
        let global = dir.path().join("global.conf");
        write(&global, &json!({"env": {"default": {"db": "http://global/db"}}, "shared": "global"}));
        let path = app(
            dir.path(),
            "app",
            Some(json!({"env": {"default": {"db": "http://local/db"}}, "shared": "local"})),
            None,
        );

        let config = store(&[global], Some(path));
        assert_eq!(config.as_map()["shared"], "local");
        assert_eq!(
            config.store_handles(None).unwrap(),
            vec![StoreHandle::new("http://local/db", false)]
        );
    }

    #[test]
    fn test_update_accumulates_local_settings() {
        let dir = tempdir().unwrap();
        let global = dir.path().join("global.conf");
        write(&global, &json!({"g": "global", "x": "global"}));
        let first = app(dir.path(), "first", Some(json!({"a": 1, "x": "first"})), None);
        let second = app(dir.path(), "second", Some(json!({"b": 2})), None);

        let mut config = store(&[global], Some(first));
        config.update(&second).unwrap();

        let conf = config.as_map();
        assert_eq!(conf["g"], "global");
        assert_eq!(conf["a"], 1);
        assert_eq!(conf["b"], 2);
        assert_eq!(conf["x"], "first");
        assert_eq!(config.app_dir(), Some(second.as_path()));
    }

    #[test]
    fn test_get_prefers_builtin_properties() {
        let dir = tempdir().unwrap();
        let path = app(
            dir.path(),
            "app",
            Some(json!({"hooks": {"pre-push": ["compress"]}, "name": "blog"})),
            None,
        );
        let config = store(&[], Some(path));

        match config.get("hooks").unwrap() {
            ConfigEntry::Hooks(table) => {
                assert_eq!(table.get("pre-push")[0].uri(), "compress");
                assert!(table.get("post-push").is_empty());
            }
            other => panic!("expected hooks, got {other:?}"),
        }
        assert!(matches!(config.get("extensions").unwrap(), ConfigEntry::Extensions(e) if e.is_empty()));
        assert_eq!(config.get("name").unwrap().as_value(), Some(&json!("blog")));
    }

    #[test]
    fn test_get_missing_key() {
        let config = store(&[], None);
        assert!(matches!(config.get("nope"), Err(AppError::MissingKey { .. })));
        assert_eq!(
            config.get_or("nope", json!(5)).unwrap().as_value(),
            Some(&json!(5))
        );
    }

    #[test]
    fn test_values_in_key_order() {
        let dir = tempdir().unwrap();
        let global = dir.path().join("global.conf");
        write(&global, &json!({"zeta": 1, "alpha": 2}));
        let config = store(&[global], None);

        assert_eq!(
            config.keys().collect::<Vec<_>>(),
            vec!["env", "extensions", "hooks", "zeta", "alpha"]
        );
        let values = config.values().unwrap();
        assert_eq!(values.len(), 5);
        assert!(matches!(values[1], ConfigEntry::Extensions(_)));
        assert!(matches!(values[2], ConfigEntry::Hooks(_)));
        assert_eq!(values[4].as_value(), Some(&json!(2)));
    }

    #[test]
    fn test_extensions_resolved_on_every_access() {
        let dir = tempdir().unwrap();
        let path = app(dir.path(), "app", Some(json!({"extensions": ["one", "two"]})), None);
        let loader = Arc::new(CountingLoader::default());
        let config = ConfigStore::builder()
            .app_dir(Some(path))
            .env(Arc::new(StaticEnv::default()))
            .loader(loader.clone())
            .build()
            .unwrap();

        let names = config
            .extensions()
            .unwrap()
            .iter()
            .map(|e| e.name().to_string())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["one", "two"]);

        config.extensions().unwrap();
        assert_eq!(loader.calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_extension_failure_propagates() {
        let dir = tempdir().unwrap();
        let path = app(dir.path(), "app", Some(json!({"extensions": ["broken"]})), None);
        let config = store(&[], Some(path));

        assert!(matches!(config.extensions(), Err(AppError::Extension { .. })));
        assert!(config.get("extensions").is_err());
    }

    #[test]
    fn test_hooks_pick_up_update() {
        let dir = tempdir().unwrap();
        let first = app(dir.path(), "first", Some(json!({})), None);
        let second = app(
            dir.path(),
            "second",
            Some(json!({"hooks": {"post-push": ["notify", "log"]}})),
            None,
        );

        let mut config = store(&[], Some(first));
        assert!(config.hooks().unwrap().is_empty());

        config.update(&second).unwrap();
        let hooks = config.hooks().unwrap();
        let uris = hooks
            .get("post-push")
            .iter()
            .map(|h| h.uri().to_string())
            .collect::<Vec<_>>();
        assert_eq!(uris, vec!["notify", "log"]);
        assert_eq!(hooks.phases().collect::<Vec<_>>(), vec!["post-push"]);
    }

    #[test]
    fn test_environment_substitution_in_config() {
        let dir = tempdir().unwrap();
        let global = dir.path().join("global.conf");
        fs::write(&global, r#"{"env": {"default": {"db": "http://$DB_HOST/app"}}}"#).unwrap();

        let config = ConfigStore::builder()
            .global_paths(vec![global])
            .env(Arc::new(StaticEnv::from_pairs([("DB_HOST", "couch.internal")])))
            .loader(Arc::new(CountingLoader::default()))
            .build()
            .unwrap();

        assert_eq!(
            config.store_handles(None).unwrap()[0].url,
            "http://couch.internal/app"
        );
    }
}
