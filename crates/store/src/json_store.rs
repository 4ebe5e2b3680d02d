//! JSON-file-backed record store
//!
//! The CLI's repository format: one `repository.json` holding every table's
//! rows, with an `assets/` directory next to it as the blob store root.
//! Saving is atomic (temp file + rename) so an interrupted save never
//! leaves a truncated repository behind.

use sitepack_core::{Error, RecordData, Result};
use std::path::{Path, PathBuf};

use crate::memory::MemoryStore;
use crate::traits::RecordStore;

/// Repository file name inside a repository directory
pub const REPOSITORY_FILE: &str = "repository.json";

/// Asset directory name inside a repository directory
pub const ASSETS_DIR: &str = "assets";

/// Record store persisted as a JSON file
#[derive(Debug)]
pub struct JsonStore {
    inner: MemoryStore,
    path: PathBuf,
}

impl JsonStore {
    /// Open a repository directory, loading `repository.json` if present
    pub fn open(dir: &Path) -> Result<Self> {
        let path = dir.join(REPOSITORY_FILE);
        let inner = if path.exists() {
            let data = std::fs::read(&path)?;
            serde_json::from_slice(&data)
                .map_err(|e| Error::serialization(format!("repository load: {e}")))?
        } else {
            MemoryStore::new()
        };
        Ok(Self { inner, path })
    }

    /// The blob store root for this repository
    pub fn assets_dir(dir: &Path) -> PathBuf {
        dir.join(ASSETS_DIR)
    }

    /// Persist the store, atomically replacing the previous file
    pub fn save(&self) -> Result<()> {
        let json = serde_json::to_vec_pretty(&self.inner)
            .map_err(|e| Error::serialization(format!("repository save: {e}")))?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let temp = self.path.with_extension("json.tmp");
        std::fs::write(&temp, &json)?;
        std::fs::rename(&temp, &self.path)?;
        Ok(())
    }

    /// Access the in-memory half (test inspection)
    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    /// Mutable access to the in-memory half (seeding)
    pub fn inner_mut(&mut self) -> &mut MemoryStore {
        &mut self.inner
    }
}

impl RecordStore for JsonStore {
    fn get(
        &self,
        table: &str,
        uid: i64,
        fields: Option<&[String]>,
    ) -> Result<Option<RecordData>> {
        self.inner.get(table, uid, fields)
    }

    fn query(&self, table: &str, pid: i64, order_by: &str) -> Result<Vec<RecordData>> {
        self.inner.query(table, pid, order_by)
    }

    fn create(
        &mut self,
        table: &str,
        data: &RecordData,
        requested_uid: Option<i64>,
    ) -> Result<i64> {
        self.inner.create(table, data, requested_uid)
    }

    fn update(&mut self, table: &str, uid: i64, data: &RecordData) -> Result<()> {
        self.inner.update(table, uid, data)
    }

    fn move_record(&mut self, table: &str, uid: i64, new_pid: i64) -> Result<()> {
        self.inner.move_record(table, uid, new_pid)
    }
}
