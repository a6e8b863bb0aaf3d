//! Push orchestration.
//!
//! Sequences hook invocation, document construction and the export-vs-push
//! decision for a single application or a sweep over a directory of them.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::domain::{
    AppError, CommandReport, HookContext, PushOptions, PushOutcome, Result, StoreHandle,
    POST_PUSH, PRE_PUSH,
};
use crate::infrastructure::{self, LocalDocument, DOCS_DIR};

use super::bulk_docs;
use super::config_store::ConfigStore;
use super::hooks::run_hooks;

/// Options for a push command.
#[derive(Debug, Clone, Default)]
pub struct PushRequest {
    /// Database token: URL, `env` alias, or nothing for the default.
    pub dest: Option<String>,
    /// Serialize instead of writing to the network.
    pub export: bool,
    /// Where to write the exported JSON; printed when absent.
    pub output: Option<PathBuf>,
    /// Explicit document id.
    pub docid: Option<String>,
    /// Flags forwarded to the document push.
    pub options: PushOptions,
}

/// A document that can be exported or pushed.
pub trait AppDocument {
    /// Serialize the full document.
    ///
    /// # Errors
    /// Returns error if the bundle cannot be read.
    fn to_json(&self) -> Result<Value>;

    /// Write the document to every handle, returning the URLs to browse.
    ///
    /// # Errors
    /// Returns the first store failure.
    fn push(&self, dbs: &[StoreHandle], options: PushOptions) -> Result<Vec<String>>;
}

impl AppDocument for LocalDocument {
    fn to_json(&self) -> Result<Value> {
        Self::to_json(self)
    }

    fn push(&self, dbs: &[StoreHandle], options: PushOptions) -> Result<Vec<String>> {
        Self::push(self, dbs, options)
    }
}

/// Collaborators the orchestrator drives.
pub trait PushBackend {
    /// Document type produced for an application path.
    type Document: AppDocument;

    /// Ambient working directory, if one can be determined.
    fn current_dir(&self) -> Option<PathBuf>;

    /// Open the document for `path`.
    ///
    /// # Errors
    /// Returns error if the bundle cannot be opened.
    fn document(&self, path: &Path, create: bool, docid: Option<&str>) -> Result<Self::Document>;

    /// Push the plain documents under `docs_path`.
    ///
    /// # Errors
    /// Returns the bulk pusher's error.
    fn push_docs(
        &self,
        config: &ConfigStore,
        docs_path: &Path,
        request: &PushRequest,
    ) -> Result<CommandReport>;

    /// Application directories below `root`, in push order.
    ///
    /// # Errors
    /// Returns error if discovery fails.
    fn discover_apps(&self, root: &Path) -> Result<Vec<PathBuf>>;

    /// Run the hooks for `phase`.
    ///
    /// # Errors
    /// Returns the failing hook's error.
    fn hook(
        &self,
        config: &ConfigStore,
        app_path: &Path,
        phase: &str,
        context: &HookContext,
    ) -> Result<()>;

    /// Write `value` as JSON to `path`.
    ///
    /// # Errors
    /// Returns error if the file cannot be written.
    fn write_json(&self, path: &Path, value: &Value) -> Result<()>;
}

/// Production backend: filesystem, shell hooks and HTTP.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsBackend;

impl PushBackend for FsBackend {
    type Document = LocalDocument;

    fn current_dir(&self) -> Option<PathBuf> {
        std::env::current_dir().ok()
    }

    fn document(&self, path: &Path, create: bool, docid: Option<&str>) -> Result<LocalDocument> {
        LocalDocument::open(path, create, docid)
    }

    fn push_docs(
        &self,
        config: &ConfigStore,
        docs_path: &Path,
        request: &PushRequest,
    ) -> Result<CommandReport> {
        bulk_docs::push_docs(config, docs_path, request)
    }

    fn discover_apps(&self, root: &Path) -> Result<Vec<PathBuf>> {
        Ok(infrastructure::discover_apps(root))
    }

    fn hook(
        &self,
        config: &ConfigStore,
        app_path: &Path,
        phase: &str,
        context: &HookContext,
    ) -> Result<()> {
        run_hooks(config, app_path, phase, context)
    }

    fn write_json(&self, path: &Path, value: &Value) -> Result<()> {
        infrastructure::write_json(path, value)
    }
}

/// Drives `init`, `push` and `pushapps`.
pub struct PushService<B: PushBackend> {
    config: ConfigStore,
    backend: B,
}

impl PushService<FsBackend> {
    /// Create a service over the production backend.
    #[must_use]
    pub const fn new(config: ConfigStore) -> Self {
        Self::with_backend(config, FsBackend)
    }
}

impl<B: PushBackend> PushService<B> {
    /// Create a service over a custom backend.
    #[must_use]
    pub const fn with_backend(config: ConfigStore, backend: B) -> Self {
        Self { config, backend }
    }

    /// The configuration in effect.
    #[must_use]
    pub const fn config(&self) -> &ConfigStore {
        &self.config
    }

    /// Create an application skeleton at `dest`, or in the working directory.
    ///
    /// # Errors
    /// Returns a path error if no destination can be determined, and the
    /// document collaborator's failure unchanged.
    pub fn init(&self, dest: Option<&Path>) -> Result<CommandReport> {
        let path = match dest {
            Some(path) => path.to_path_buf(),
            None => self
                .backend
                .current_dir()
                .ok_or_else(|| AppError::path("Unknown destination for init"))?,
        };

        self.backend.document(&path, true, None)?;
        tracing::info!(path = %path.display(), "Initialized application");
        Ok(CommandReport::success())
    }

    /// Push (or export) one application.
    ///
    /// Without `source` the enclosing application directory is used, then the
    /// working directory. An application with a `_docs` folder is handed to
    /// the bulk pusher as a whole.
    ///
    /// # Errors
    /// Returns a path error if no application path can be determined, a
    /// configuration error if the destination cannot be resolved, and any
    /// collaborator failure unchanged.
    pub fn push(&mut self, source: Option<&Path>, request: &PushRequest) -> Result<CommandReport> {
        let app_path = source
            .map(Path::to_path_buf)
            .or_else(|| self.config.app_dir().map(Path::to_path_buf))
            .or_else(|| self.backend.current_dir())
            .ok_or_else(|| AppError::path("You aren't in a couchapp."))?;

        self.config.update(&app_path)?;

        let docs_path = app_path.join(DOCS_DIR);
        if docs_path.is_dir() {
            tracing::info!(path = %docs_path.display(), "Pushing documents folder");
            return self.backend.push_docs(&self.config, &docs_path, request);
        }

        let dbs = if request.export {
            None
        } else {
            Some(self.config.store_handles(request.dest.as_deref())?)
        };

        // Single pushes hand hooks the raw destination token.
        let mut context = HookContext::new();
        context.insert(
            "dbs".into(),
            request.dest.clone().map_or(Value::Null, Value::String),
        );

        let outcome = self.push_one(
            &app_path,
            request.docid.as_deref(),
            dbs.as_deref(),
            request.options,
            &context,
        )?;

        tracing::info!(app = %app_path.display(), export = request.export, "Push finished");

        match outcome {
            PushOutcome::Exported(doc) => self.emit(&doc, request.output.as_deref()),
            PushOutcome::Pushed(urls) => Ok(browse_report(&urls)),
        }
    }

    /// Push (or export) every application found under `root`, in order.
    ///
    /// The first failure aborts the sweep; applications already pushed stay
    /// pushed.
    ///
    /// # Errors
    /// Returns a configuration error if the destination cannot be resolved,
    /// and any collaborator failure unchanged.
    pub fn push_apps(&mut self, root: &Path, request: &PushRequest) -> Result<CommandReport> {
        let apps = self.backend.discover_apps(root)?;
        if apps.is_empty() {
            tracing::info!(root = %root.display(), "No applications found");
            return Ok(CommandReport::success());
        }

        let mut exported = Vec::new();
        let mut urls = Vec::new();
        for app_path in &apps {
            let dbs = self.config.store_handles(request.dest.as_deref())?;

            let mut context = HookContext::new();
            context.insert(
                "dbs".into(),
                serde_json::to_value(&dbs).map_err(AppError::json_parse)?,
            );
            context.insert("pushapps".into(), Value::Bool(true));

            let targets = (!request.export).then_some(dbs.as_slice());
            match self.push_one(app_path, None, targets, request.options, &context)? {
                PushOutcome::Exported(doc) => exported.push(doc),
                PushOutcome::Pushed(pushed) => urls.extend(pushed),
            }
        }

        tracing::info!(root = %root.display(), apps = apps.len(), "Sweep finished");

        if request.export {
            self.emit(&Value::Array(exported), request.output.as_deref())
        } else {
            Ok(browse_report(&urls))
        }
    }

    /// Hooks around constructing and exporting/pushing one document.
    ///
    /// Without `dbs` the document is exported instead of pushed.
    fn push_one(
        &self,
        app_path: &Path,
        docid: Option<&str>,
        dbs: Option<&[StoreHandle]>,
        options: PushOptions,
        context: &HookContext,
    ) -> Result<PushOutcome> {
        self.backend
            .hook(&self.config, app_path, PRE_PUSH, context)?;

        let doc = self.backend.document(app_path, false, docid)?;
        let outcome = match dbs {
            Some(dbs) => PushOutcome::Pushed(doc.push(dbs, options)?),
            None => PushOutcome::Exported(doc.to_json()?),
        };

        self.backend
            .hook(&self.config, app_path, POST_PUSH, context)?;

        Ok(outcome)
    }

    fn emit(&self, value: &Value, output: Option<&Path>) -> Result<CommandReport> {
        match output {
            Some(path) => {
                self.backend.write_json(path, value)?;
                tracing::info!(path = %path.display(), "Exported JSON");
                Ok(CommandReport::success())
            }
            None => serde_json::to_string_pretty(value)
                .map(CommandReport::with_output)
                .map_err(AppError::json_parse),
        }
    }
}

/// Report listing the URLs to open, if any.
fn browse_report(urls: &[String]) -> CommandReport {
    if urls.is_empty() {
        CommandReport::success()
    } else {
        CommandReport::with_output(urls.join("\n"))
    }
}
