//! Application directory discovery.
//!
//! Handles recognizing CouchApp bundles on disk, finding the bundle that
//! encloses the working directory, and sweeping a tree for bundles.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Local configuration files, in override order (later wins).
pub const LOCAL_CONFIG_FILES: &[&str] = &["couchapp.json", ".couchapprc"];

/// Subdirectory holding plain documents pushed with `_bulk_docs`.
pub const DOCS_DIR: &str = "_docs";

/// Whether `path` is a recognized application directory.
#[must_use]
pub fn is_app_dir(path: &Path) -> bool {
    path.is_dir() && LOCAL_CONFIG_FILES.iter().any(|f| path.join(f).is_file())
}

/// Walks up from `start` to the closest enclosing application directory.
#[must_use]
pub fn find_app_dir(start: &Path) -> Option<PathBuf> {
    let found = start.ancestors().find(|p| is_app_dir(p)).map(Path::to_path_buf);

    match &found {
        Some(dir) => tracing::debug!("Found application at: {}", dir.display()),
        None => tracing::debug!("No application encloses {}", start.display()),
    }

    found
}

/// Finds every application directory below `root`, in name order.
///
/// A recognized application is not descended into.
#[must_use]
pub fn discover_apps(root: &Path) -> Vec<PathBuf> {
    let mut apps = Vec::new();

    if !root.is_dir() {
        tracing::warn!("Not a directory: {}", root.display());
        return apps;
    }

    let mut walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter();

    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Failed to read directory entry: {}", e);
                continue;
            }
        };

        if !entry.file_type().is_dir() {
            continue;
        }

        let name = entry.file_name().to_string_lossy();
        if name.starts_with('.') || name == DOCS_DIR {
            walker.skip_current_dir();
            continue;
        }

        if is_app_dir(entry.path()) {
            tracing::debug!("Discovered application: {}", entry.path().display());
            apps.push(entry.into_path());
            walker.skip_current_dir();
        }
    }

    apps
}
