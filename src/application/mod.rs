//! Application layer - use cases and orchestration.
//!
//! This layer holds the configuration store, database resolution, hook
//! dispatch, and the push workflows built on top of them.

pub mod bulk_docs;
pub mod config_store;
pub mod environment;
pub mod formatter;
pub mod hooks;
pub mod loader;
pub mod push_service;

pub use config_store::ConfigStore;
pub use formatter::{format_config_json, format_env_table, format_extensions, format_hooks};
pub use push_service::{PushRequest, PushService};
