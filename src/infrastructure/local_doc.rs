//! Local document model.
//!
//! Turns an application directory into a document payload and writes it to
//! one or more databases.

use std::fs;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{Map, Value};
use walkdir::WalkDir;

use crate::domain::{AppError, PushOptions, Result, StoreHandle};

use super::app_paths::DOCS_DIR;
use super::store_client::StoreClient;

/// File holding an explicit document id.
const ID_FILE: &str = "_id";

/// Directory holding attachments.
const ATTACHMENTS_DIR: &str = "_attachments";

/// Top-level entries that never become document properties.
const SKIPPED_TOP_LEVEL: &[&str] = &[ID_FILE, "couchapp.json", DOCS_DIR, ATTACHMENTS_DIR];

/// One file under `_attachments/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Path relative to `_attachments/`, `/`-separated.
    pub name: String,
    /// Guessed MIME type.
    pub content_type: String,
    /// Raw file contents.
    pub data: Vec<u8>,
}

/// An application bundle on disk.
#[derive(Debug, Clone)]
pub struct LocalDocument {
    path: PathBuf,
    docid: Option<String>,
    is_ddoc: bool,
}

impl LocalDocument {
    /// Open the bundle at `path`.
    ///
    /// With `create`, the directory and an empty `.couchapprc` are created.
    ///
    /// # Errors
    /// Returns error if the directory is missing (without `create`) or
    /// cannot be created.
    pub fn open(path: &Path, create: bool, docid: Option<&str>) -> Result<Self> {
        if create {
            fs::create_dir_all(path)
                .map_err(|e| AppError::io(format!("Failed to create {}", path.display()), e))?;
            let rc = path.join(".couchapprc");
            if !rc.exists() {
                fs::write(&rc, "{}\n")
                    .map_err(|e| AppError::io(format!("Failed to write {}", rc.display()), e))?;
            }
        } else if !path.is_dir() {
            return Err(AppError::path(format!(
                "{} is not an application directory",
                path.display()
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            docid: docid.map(String::from),
            is_ddoc: true,
        })
    }

    /// Mark whether this bundle is a design document (the default).
    #[must_use]
    pub const fn with_ddoc(mut self, is_ddoc: bool) -> Self {
        self.is_ddoc = is_ddoc;
        self
    }

    /// Directory backing this bundle.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn dir_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Document id.
    ///
    /// An explicit id wins, then the first line of the `_id` file (when not
    /// blank), then `_design/<dirname>` for design documents, then `<dirname>`.
    ///
    /// # Errors
    /// Returns error if the `_id` file exists but cannot be read.
    pub fn id(&self) -> Result<String> {
        if let Some(docid) = &self.docid {
            return Ok(docid.clone());
        }

        let idfile = self.path.join(ID_FILE);
        if idfile.exists() {
            let content = fs::read_to_string(&idfile)
                .map_err(|e| AppError::io(format!("Failed to read {}", idfile.display()), e))?;
            let first = content.lines().next().unwrap_or_default().trim();
            if !first.is_empty() {
                return Ok(first.to_string());
            }
            tracing::debug!(path = %idfile.display(), "Ignoring blank id file");
        }

        let name = self.dir_name();
        if self.is_ddoc {
            Ok(format!("_design/{name}"))
        } else {
            Ok(name)
        }
    }

    /// Files under `_attachments/`, in name order.
    ///
    /// # Errors
    /// Returns error if a file cannot be read.
    pub fn attachments(&self) -> Result<Vec<Attachment>> {
        let root = self.path.join(ATTACHMENTS_DIR);
        if !root.is_dir() {
            return Ok(Vec::new());
        }

        let mut out = Vec::new();
        for entry in WalkDir::new(&root).sort_by_file_name() {
            let entry = entry.map_err(|e| AppError::Io {
                message: format!("Failed to walk {}: {e}", root.display()),
                source: None,
            })?;
            if !entry.file_type().is_file() || is_ignored(&entry.file_name().to_string_lossy()) {
                continue;
            }

            let rel = entry.path().strip_prefix(&root).unwrap_or(entry.path());
            let name = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let data = fs::read(entry.path())
                .map_err(|e| AppError::io(format!("Failed to read {}", entry.path().display()), e))?;

            out.push(Attachment {
                content_type: guess_content_type(&name).to_string(),
                name,
                data,
            });
        }

        Ok(out)
    }

    /// Build the document body without attachments.
    fn body(&self) -> Result<Map<String, Value>> {
        let mut doc = Map::new();
        doc.insert("_id".into(), Value::String(self.id()?));

        let mut manifest = Vec::new();
        let fields = read_tree(&self.path, &self.path, true, &mut manifest)?;
        doc.extend(fields);

        let meta = doc
            .entry("couchapp")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(meta) = meta {
            meta.insert(
                "manifest".into(),
                Value::Array(manifest.into_iter().map(Value::String).collect()),
            );
        }

        Ok(doc)
    }

    /// Serialize the full document, attachments inlined as base64.
    ///
    /// # Errors
    /// Returns error if any file in the bundle cannot be read or parsed.
    pub fn to_json(&self) -> Result<Value> {
        let mut doc = self.body()?;
        let attachments = self.attachments()?;
        if !attachments.is_empty() {
            doc.insert("_attachments".into(), inline_attachments(&attachments));
        }
        Ok(Value::Object(doc))
    }

    /// Push the document to every database in `dbs`.
    ///
    /// Returns the application's index URL per database when `browse` is set.
    ///
    /// # Errors
    /// Returns error on the first failing database; earlier ones stay written.
    pub fn push(&self, dbs: &[StoreHandle], options: PushOptions) -> Result<Vec<String>> {
        let docid = self.id()?;
        let body = self.body()?;
        let attachments = if options.doc_only {
            Vec::new()
        } else {
            self.attachments()?
        };

        let mut urls = Vec::new();
        for db in dbs {
            let client = StoreClient::open(db)?;
            let mut doc = body.clone();
            if let Some(rev) = client.current_rev(&docid)? {
                doc.insert("_rev".into(), Value::String(rev));
            }

            if options.atomic && !attachments.is_empty() {
                doc.insert("_attachments".into(), inline_attachments(&attachments));
                client.put_doc(&docid, &Value::Object(doc))?;
            } else {
                let mut rev = client.put_doc(&docid, &Value::Object(doc))?;
                for attachment in &attachments {
                    rev = client.put_attachment(
                        &docid,
                        &rev,
                        &attachment.name,
                        &attachment.content_type,
                        attachment.data.clone(),
                    )?;
                }
            }

            tracing::info!(
                db = %db,
                docid = %docid,
                attachments = attachments.len(),
                "Pushed document"
            );

            if options.browse {
                urls.push(client.doc_url(&docid, Some("index.html")).to_string());
            }
        }

        Ok(urls)
    }
}

fn is_ignored(name: &str) -> bool {
    name.starts_with('.') || name.ends_with('~')
}

fn inline_attachments(attachments: &[Attachment]) -> Value {
    let map = attachments
        .iter()
        .map(|a| {
            (
                a.name.clone(),
                serde_json::json!({
                    "content_type": a.content_type,
                    "data": STANDARD.encode(&a.data),
                }),
            )
        })
        .collect::<Map<_, _>>();
    Value::Object(map)
}

/// Reads a directory into nested properties, appending included paths to
/// `manifest`.
fn read_tree(
    root: &Path,
    dir: &Path,
    top_level: bool,
    manifest: &mut Vec<String>,
) -> Result<Map<String, Value>> {
    let mut entries = fs::read_dir(dir)
        .map_err(|e| AppError::io(format!("Failed to read {}", dir.display()), e))?
        .filter_map(std::result::Result::ok)
        .collect::<Vec<_>>();
    entries.sort_by_key(fs::DirEntry::file_name);

    let mut fields = Map::new();
    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_ignored(&name) || (top_level && SKIPPED_TOP_LEVEL.contains(&name.as_str())) {
            continue;
        }

        let path = entry.path();
        let is_symlink = entry.file_type().is_ok_and(|ft| ft.is_symlink());
        if is_symlink && path.is_dir() {
            tracing::debug!(path = %path.display(), "Skipping symlinked directory");
            continue;
        }

        let rel = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .to_string_lossy()
            .replace('\\', "/");

        if path.is_dir() {
            manifest.push(format!("{rel}/"));
            let nested = read_tree(root, &path, false, manifest)?;
            fields.insert(name, Value::Object(nested));
            continue;
        }

        let key = Path::new(&name)
            .file_stem()
            .map_or_else(|| name.clone(), |s| s.to_string_lossy().into_owned());
        let value = read_field(&path)?;
        manifest.push(rel);
        fields.insert(key, value);
    }

    Ok(fields)
}

fn read_field(path: &Path) -> Result<Value> {
    let bytes =
        fs::read(path).map_err(|e| AppError::io(format!("Failed to read {}", path.display()), e))?;

    if path.extension().is_some_and(|ext| ext == "json") {
        return serde_json::from_slice(&bytes).map_err(|e| AppError::JsonParse {
            message: format!("{}: {e}", path.display()),
            source: Some(e),
        });
    }

    let text = String::from_utf8_lossy(&bytes);
    let text = text
        .strip_suffix('\n')
        .map_or(&*text, |t| t.strip_suffix('\r').unwrap_or(t));
    Ok(Value::String(text.to_string()))
}

fn guess_content_type(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" | "mjs" => "application/javascript",
        "json" | "map" => "application/json",
        "txt" => "text/plain",
        "xml" => "application/xml",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        _ => "application/octet-stream",
    }
}
