//! Infrastructure layer - external adapters (filesystem, HTTP, processes).
//!
//! This layer handles all I/O operations and external dependencies.

pub mod app_paths;
pub mod config;
pub mod local_doc;
pub mod shell;
pub mod store_client;

pub use app_paths::{discover_apps, find_app_dir, DOCS_DIR, LOCAL_CONFIG_FILES};
pub use config::{rc_paths, read_json, write_json};
pub use local_doc::LocalDocument;
pub use shell::{CommandExtension, ShellHook};
pub use store_client::StoreClient;
