//! JSONL-based storage implementation with in-memory caching.
//!
//! Each collection is one `<collection>.jsonl` file. Creates append; updates
//! and deletes rewrite the file through a temp file and rename.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use super::traits::{Filter, HasId, Storage};
use crate::error::{HostError, Result};

/// JSONL-based storage with in-memory caching.
pub struct JsonlStorage {
    base_path: PathBuf,
    cache: RwLock<HashMap<String, Vec<Value>>>,
}

impl std::fmt::Debug for JsonlStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonlStorage")
            .field("base_path", &self.base_path)
            .finish_non_exhaustive()
    }
}

fn record_id(record: &Value) -> Option<&str> {
    record.get("id").and_then(Value::as_str)
}

impl JsonlStorage {
    /// Open (creating if needed) a storage directory.
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)?;
        Ok(Self {
            base_path,
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// Directory holding the collection files.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn collection_path(&self, collection: &str) -> PathBuf {
        self.base_path.join(format!("{}.jsonl", collection))
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Vec<Value>>>> {
        self.cache.read().map_err(|e| HostError::Storage(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Vec<Value>>>> {
        self.cache.write().map_err(|e| HostError::Storage(e.to_string()))
    }

    fn load_collection(&self, collection: &str) -> Result<Vec<Value>> {
        let path = self.collection_path(collection);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(&path)?);
        let mut records = Vec::new();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(record) => records.push(record),
                Err(e) => log::warn!(
                    "Skipping corrupt line {} in {}: {}",
                    lineno + 1,
                    path.display(),
                    e
                ),
            }
        }
        Ok(records)
    }

    /// Run `f` against the loaded collection under the write lock.
    fn with_collection<R>(
        &self,
        collection: &str,
        f: impl FnOnce(&mut Vec<Value>) -> Result<R>,
    ) -> Result<R> {
        let mut cache = self.write()?;
        if !cache.contains_key(collection) {
            let records = self.load_collection(collection)?;
            cache.insert(collection.to_string(), records);
        }
        let records = cache
            .get_mut(collection)
            .ok_or_else(|| HostError::Storage(format!("Collection not loaded: {}", collection)))?;
        f(records)
    }

    fn append_to_file(&self, collection: &str, record: &Value) -> Result<()> {
        let path = self.collection_path(collection);
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(file, "{}", serde_json::to_string(record)?)?;
        Ok(())
    }

    fn rewrite_file(&self, collection: &str, records: &[Value]) -> Result<()> {
        let path = self.collection_path(collection);
        let tmp = path.with_extension("jsonl.tmp");
        {
            let mut file = File::create(&tmp)?;
            for record in records {
                writeln!(file, "{}", serde_json::to_string(record)?)?;
            }
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

impl Storage for JsonlStorage {
    fn create<T: Serialize + HasId>(&self, collection: &str, record: &T) -> Result<()> {
        let value = serde_json::to_value(record)?;
        self.with_collection(collection, |records| {
            if records.iter().any(|r| record_id(r) == Some(record.id())) {
                return Err(HostError::Storage(format!(
                    "Record {} already exists in {}",
                    record.id(),
                    collection
                )));
            }
            // File first: it is the source of truth
            self.append_to_file(collection, &value)?;
            records.push(value);
            Ok(())
        })
    }

    fn upsert<T: Serialize + HasId>(&self, collection: &str, record: &T) -> Result<()> {
        let value = serde_json::to_value(record)?;
        self.with_collection(collection, |records| {
            match records.iter().position(|r| record_id(r) == Some(record.id())) {
                Some(pos) => {
                    records[pos] = value;
                    self.rewrite_file(collection, records)
                }
                None => {
                    self.append_to_file(collection, &value)?;
                    records.push(value);
                    Ok(())
                }
            }
        })
    }

    fn get<T: DeserializeOwned>(&self, collection: &str, id: &str) -> Result<Option<T>> {
        let found = self.with_collection(collection, |records| {
            Ok(records.iter().find(|r| record_id(r) == Some(id)).cloned())
        })?;
        found
            .map(|v| serde_json::from_value(v).map_err(HostError::from))
            .transpose()
    }

    fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        self.with_collection(collection, |records| {
            let original_len = records.len();
            records.retain(|r| record_id(r) != Some(id));
            if records.len() == original_len {
                return Ok(false);
            }
            self.rewrite_file(collection, records)?;
            Ok(true)
        })
    }

    fn query<T: DeserializeOwned>(&self, collection: &str, filters: &[Filter]) -> Result<Vec<T>> {
        let matching: Vec<Value> = self.with_collection(collection, |records| {
            Ok(records
                .iter()
                .filter(|r| filters.iter().all(|f| f.matches(r)))
                .cloned()
                .collect())
        })?;

        matching
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(HostError::from))
            .collect()
    }
}
