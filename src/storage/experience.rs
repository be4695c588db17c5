//! Per-experience persisted state
//!
//! Two stores are keyed by experience id:
//! - metadata: free-form JSON the host keeps per app, including delivery-once
//!   fields (`lastErrors`, `unreadRemoteNotifications`) consumed at launch
//! - error recovery: props an app stashed before crashing, popped on the next
//!   launch

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::traits::{HasId, Storage};
use crate::domain::ExperienceId;
use crate::error::{HostError, Result};
use crate::id::now_ms;

/// Metadata key holding errors from the previous run
pub const LAST_ERRORS_KEY: &str = "lastErrors";

/// Metadata key holding remote notifications received while the app was not running
pub const UNREAD_REMOTE_NOTIFICATIONS_KEY: &str = "unreadRemoteNotifications";

const METADATA_COLLECTION: &str = "experience_metadata";
const RECOVERY_COLLECTION: &str = "error_recovery";

/// Persisted metadata per experience
pub trait MetadataStore: Send + Sync {
    /// Current metadata, or None if nothing was ever stored
    fn get_metadata(&self, id: &ExperienceId) -> Result<Option<Map<String, Value>>>;

    /// Replace the stored metadata wholesale
    fn update_metadata(&self, id: &ExperienceId, metadata: Map<String, Value>) -> Result<()>;
}

/// Error-recovery props per experience, read-and-clear
pub trait ErrorRecoveryStore: Send + Sync {
    /// Take the stored props, leaving nothing behind
    fn pop_recovery_props(&self, id: &ExperienceId) -> Result<Option<Value>>;

    /// Stash props for the next launch, replacing anything already stored
    fn record_recovery_props(&self, id: &ExperienceId, props: Value) -> Result<()>;
}

/// In-memory metadata store
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    entries: RwLock<HashMap<ExperienceId, Map<String, Value>>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn get_metadata(&self, id: &ExperienceId) -> Result<Option<Map<String, Value>>> {
        let entries = self.entries.read().map_err(|e| HostError::Storage(e.to_string()))?;
        Ok(entries.get(id).cloned())
    }

    fn update_metadata(&self, id: &ExperienceId, metadata: Map<String, Value>) -> Result<()> {
        let mut entries = self.entries.write().map_err(|e| HostError::Storage(e.to_string()))?;
        entries.insert(id.clone(), metadata);
        Ok(())
    }
}

/// In-memory error-recovery store
#[derive(Debug, Default)]
pub struct MemoryRecoveryStore {
    entries: RwLock<HashMap<ExperienceId, Value>>,
}

impl MemoryRecoveryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ErrorRecoveryStore for MemoryRecoveryStore {
    fn pop_recovery_props(&self, id: &ExperienceId) -> Result<Option<Value>> {
        let mut entries = self.entries.write().map_err(|e| HostError::Storage(e.to_string()))?;
        Ok(entries.remove(id))
    }

    fn record_recovery_props(&self, id: &ExperienceId, props: Value) -> Result<()> {
        let mut entries = self.entries.write().map_err(|e| HostError::Storage(e.to_string()))?;
        entries.insert(id.clone(), props);
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MetadataRecord {
    id: String,
    metadata: Map<String, Value>,
    updated_at: u64,
}

impl HasId for MetadataRecord {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RecoveryRecord {
    id: String,
    props: Value,
    recorded_at: u64,
}

impl HasId for RecoveryRecord {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Metadata store persisted through a [`Storage`] backend
pub struct StorageMetadataStore<S: Storage> {
    storage: Arc<S>,
}

impl<S: Storage> StorageMetadataStore<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }
}

impl<S: Storage> MetadataStore for StorageMetadataStore<S> {
    fn get_metadata(&self, id: &ExperienceId) -> Result<Option<Map<String, Value>>> {
        let record: Option<MetadataRecord> = self.storage.get(METADATA_COLLECTION, id.as_str())?;
        Ok(record.map(|r| r.metadata))
    }

    fn update_metadata(&self, id: &ExperienceId, metadata: Map<String, Value>) -> Result<()> {
        let record = MetadataRecord {
            id: id.as_str().to_string(),
            metadata,
            updated_at: now_ms(),
        };
        self.storage.upsert(METADATA_COLLECTION, &record)
    }
}

/// Error-recovery store persisted through a [`Storage`] backend
pub struct StorageRecoveryStore<S: Storage> {
    storage: Arc<S>,
}

impl<S: Storage> StorageRecoveryStore<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }
}

impl<S: Storage> ErrorRecoveryStore for StorageRecoveryStore<S> {
    fn pop_recovery_props(&self, id: &ExperienceId) -> Result<Option<Value>> {
        let record: Option<RecoveryRecord> = self.storage.get(RECOVERY_COLLECTION, id.as_str())?;
        if record.is_some() {
            self.storage.delete(RECOVERY_COLLECTION, id.as_str())?;
        }
        Ok(record.map(|r| r.props))
    }

    fn record_recovery_props(&self, id: &ExperienceId, props: Value) -> Result<()> {
        let record = RecoveryRecord {
            id: id.as_str().to_string(),
            props,
            recorded_at: now_ms(),
        };
        self.storage.upsert(RECOVERY_COLLECTION, &record)
    }
}
