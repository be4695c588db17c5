//! Storage layer for headless-host
//!
//! Collection storage (JSONL files with an in-memory cache) plus the
//! per-experience stores the loader consumes at launch.

pub mod experience;
mod jsonl;
mod traits;

pub use experience::{
    ErrorRecoveryStore, LAST_ERRORS_KEY, MemoryMetadataStore, MemoryRecoveryStore, MetadataStore,
    StorageMetadataStore, StorageRecoveryStore, UNREAD_REMOTE_NOTIFICATIONS_KEY,
};
pub use jsonl::JsonlStorage;
pub use traits::{Filter, FilterOp, HasId, Storage};
