//! Domain layer - core types and contracts.
//!
//! This layer contains error types, store handles and the hook/extension
//! traits without any I/O of its own.

pub mod error;
pub mod hooks;
pub mod store;

pub use error::{AppError, Result};
pub use hooks::{Extension, Hook, HookContext, POST_PUSH, PRE_PUSH};
#[cfg(test)]
pub use store::StaticEnv;
pub use store::{CommandReport, EnvLookup, ProcessEnv, PushOptions, PushOutcome, StoreHandle};
