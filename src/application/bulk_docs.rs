//! Pushing a directory of plain documents.
//!
//! Every `.json` file and every subdirectory of a `_docs` folder becomes one
//! document; they are saved together with `_bulk_docs` or one at a time.

use std::fs;
use std::path::Path;

use serde_json::{Map, Value};

use crate::domain::{AppError, CommandReport, ProcessEnv, Result};
use crate::infrastructure::{read_json, write_json, LocalDocument, StoreClient};

use super::config_store::ConfigStore;
use super::push_service::PushRequest;

/// Read every document under `docs_path`, in name order.
///
/// # Errors
/// Returns error if the directory or any document cannot be read.
pub fn collect_docs(docs_path: &Path) -> Result<Vec<Value>> {
    let mut entries = fs::read_dir(docs_path)
        .map_err(|e| AppError::io(format!("Failed to read {}", docs_path.display()), e))?
        .filter_map(std::result::Result::ok)
        .collect::<Vec<_>>();
    entries.sort_by_key(fs::DirEntry::file_name);

    let mut docs = Vec::new();
    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }

        let path = entry.path();
        if path.is_dir() {
            let doc = LocalDocument::open(&path, false, None)?.with_ddoc(false);
            docs.push(doc.to_json()?);
        } else if let Some(stem) = name.strip_suffix(".json") {
            let mut doc = read_json(&path, &ProcessEnv, false, true)?;
            if !doc.contains_key("_id") {
                doc.insert("_id".into(), Value::String(stem.to_string()));
            }
            doc.entry("couchapp")
                .or_insert_with(|| Value::Object(Map::new()));
            docs.push(Value::Object(doc));
        } else {
            tracing::debug!(path = %path.display(), "Skipping non-document file");
        }
    }

    Ok(docs)
}

/// Push (or export) the documents under `docs_path`.
///
/// # Errors
/// Returns error if the documents cannot be read, the destination cannot be
/// resolved, or a store rejects a write.
pub fn push_docs(
    config: &ConfigStore,
    docs_path: &Path,
    request: &PushRequest,
) -> Result<CommandReport> {
    let docs = collect_docs(docs_path)?;
    if docs.is_empty() {
        tracing::info!(path = %docs_path.display(), "No documents to push");
        return Ok(CommandReport::success());
    }

    if request.export {
        let value = serde_json::json!({ "docs": docs });
        return match &request.output {
            Some(path) => {
                write_json(path, &value)?;
                Ok(CommandReport::success())
            }
            None => serde_json::to_string_pretty(&value)
                .map(CommandReport::with_output)
                .map_err(AppError::json_parse),
        };
    }

    let dbs = config.store_handles(request.dest.as_deref())?;
    for db in &dbs {
        let client = StoreClient::open(db)?;
        let docs = docs
            .iter()
            .map(|doc| with_current_rev(&client, doc.clone()))
            .collect::<Result<Vec<_>>>()?;

        if request.options.atomic {
            client.bulk_docs(&docs, true)?;
        } else {
            for doc in &docs {
                let docid = doc.get("_id").and_then(Value::as_str).unwrap_or_default();
                client.put_doc(docid, doc)?;
            }
        }

        tracing::info!(db = %db, count = docs.len(), "Pushed documents");
    }

    Ok(CommandReport::success())
}

fn with_current_rev(client: &StoreClient, mut doc: Value) -> Result<Value> {
    let docid = doc
        .get("_id")
        .and_then(Value::as_str)
        .map(String::from)
        .unwrap_or_default();

    if let (Some(rev), Value::Object(map)) = (client.current_rev(&docid)?, &mut doc) {
        map.insert("_rev".into(), Value::String(rev));
    }
    Ok(doc)
}
