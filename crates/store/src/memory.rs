//! In-memory record and blob stores
//!
//! The in-memory store is the reference `RecordStore` implementation used
//! by tests and as the live half of import targets. Data lives in nested
//! BTreeMaps so iteration order (and therefore test behavior) is
//! deterministic.

use serde::{Deserialize, Serialize};
use sitepack_core::{Error, RecordData, Result, Value};
use std::collections::BTreeMap;

use crate::traits::{BlobStore, RecordStore};

/// In-memory record store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStore {
    tables: BTreeMap<String, BTreeMap<i64, RecordData>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row directly, keyed by its `uid` field (test seeding)
    ///
    /// Panics if the row has no uid; seeding is programmer-controlled.
    pub fn seed(&mut self, table: &str, row: RecordData) {
        let uid = row.uid().expect("seeded row must carry a uid field");
        self.tables
            .entry(table.to_string())
            .or_default()
            .insert(uid, row);
    }

    /// All rows of a table in uid order
    pub fn rows(&self, table: &str) -> impl Iterator<Item = (&i64, &RecordData)> {
        self.tables.get(table).into_iter().flat_map(|t| t.iter())
    }

    /// Number of rows in a table
    pub fn count(&self, table: &str) -> usize {
        self.tables.get(table).map(|t| t.len()).unwrap_or(0)
    }

    /// Table names present in the store
    pub fn table_names(&self) -> impl Iterator<Item = &String> {
        self.tables.keys()
    }

    fn next_uid(&self, table: &str) -> i64 {
        self.tables
            .get(table)
            .and_then(|t| t.keys().next_back())
            .map(|max| max + 1)
            .unwrap_or(1)
            .max(1)
    }
}

impl RecordStore for MemoryStore {
    fn get(
        &self,
        table: &str,
        uid: i64,
        fields: Option<&[String]>,
    ) -> Result<Option<RecordData>> {
        let row = match self.tables.get(table).and_then(|t| t.get(&uid)) {
            Some(row) => row,
            None => return Ok(None),
        };
        match fields {
            None => Ok(Some(row.clone())),
            Some(wanted) => {
                let filtered = row
                    .iter()
                    .filter(|(name, _)| wanted.iter().any(|w| w == *name))
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect();
                Ok(Some(filtered))
            }
        }
    }

    fn query(&self, table: &str, pid: i64, order_by: &str) -> Result<Vec<RecordData>> {
        let mut rows: Vec<RecordData> = self
            .tables
            .get(table)
            .into_iter()
            .flat_map(|t| t.values())
            .filter(|row| row.pid().unwrap_or(0) == pid)
            .cloned()
            .collect();
        if !order_by.is_empty() {
            rows.sort_by_key(|row| (row.int(order_by).unwrap_or(0), row.uid().unwrap_or(0)));
        }
        Ok(rows)
    }

    fn create(
        &mut self,
        table: &str,
        data: &RecordData,
        requested_uid: Option<i64>,
    ) -> Result<i64> {
        let uid = match requested_uid {
            Some(uid) => {
                if self
                    .tables
                    .get(table)
                    .map(|t| t.contains_key(&uid))
                    .unwrap_or(false)
                {
                    return Err(Error::store(format!(
                        "uid {uid} already taken in table '{table}'"
                    )));
                }
                uid
            }
            None => self.next_uid(table),
        };
        let mut row = data.clone();
        row.set("uid", Value::Int(uid));
        self.tables.entry(table.to_string()).or_default().insert(uid, row);
        Ok(uid)
    }

    fn update(&mut self, table: &str, uid: i64, data: &RecordData) -> Result<()> {
        let row = self
            .tables
            .get_mut(table)
            .and_then(|t| t.get_mut(&uid))
            .ok_or_else(|| Error::store(format!("no record {table}:{uid} to update")))?;
        for (name, value) in data.iter() {
            if name != "uid" {
                row.set(name.clone(), value.clone());
            }
        }
        Ok(())
    }

    fn move_record(&mut self, table: &str, uid: i64, new_pid: i64) -> Result<()> {
        let row = self
            .tables
            .get_mut(table)
            .and_then(|t| t.get_mut(&uid))
            .ok_or_else(|| Error::store(format!("no record {table}:{uid} to move")))?;
        row.set("pid", Value::Int(new_pid));
        Ok(())
    }
}

/// In-memory blob store
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    blobs: BTreeMap<String, (Vec<u8>, i64)>,
}

impl MemoryBlobStore {
    /// Create an empty blob store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a blob with an mtime (test seeding)
    pub fn seed(&mut self, path: &str, bytes: &[u8], mtime: i64) {
        self.blobs.insert(path.to_string(), (bytes.to_vec(), mtime));
    }

    /// Number of stored blobs
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// True if no blobs are stored
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Paths of all stored blobs
    pub fn paths(&self) -> impl Iterator<Item = &String> {
        self.blobs.keys()
    }
}

impl BlobStore for MemoryBlobStore {
    fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.blobs
            .get(path)
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| Error::store(format!("no blob at '{path}'")))
    }

    fn write(&mut self, path: &str, bytes: &[u8]) -> Result<()> {
        self.blobs.insert(path.to_string(), (bytes.to_vec(), 0));
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        self.blobs.contains_key(path)
    }

    fn mtime(&self, path: &str) -> Option<i64> {
        self.blobs.get(path).map(|(_, mtime)| *mtime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(uid: i64, pid: i64, title: &str) -> RecordData {
        RecordData::new()
            .with("uid", uid)
            .with("pid", pid)
            .with("title", title)
    }

    #[test]
    fn test_get_and_field_projection() {
        let mut store = MemoryStore::new();
        store.seed("pages", row(1, 0, "Home"));

        let full = store.get("pages", 1, None).unwrap().unwrap();
        assert_eq!(full.len(), 3);

        let slim = store
            .get("pages", 1, Some(&["title".to_string()]))
            .unwrap()
            .unwrap();
        assert_eq!(slim.len(), 1);
        assert_eq!(slim.text("title"), Some("Home"));

        assert!(store.get("pages", 99, None).unwrap().is_none());
    }

    #[test]
    fn test_query_filters_by_pid_and_sorts() {
        let mut store = MemoryStore::new();
        store.seed("content", row(1, 5, "b").with("sorting", 20));
        store.seed("content", row(2, 5, "a").with("sorting", 10));
        store.seed("content", row(3, 6, "other"));

        let rows = store.query("content", 5, "sorting").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].uid(), Some(2));
        assert_eq!(rows[1].uid(), Some(1));
    }

    #[test]
    fn test_create_assigns_sequential_uids() {
        let mut store = MemoryStore::new();
        let a = store.create("pages", &row(0, 0, "x"), None).unwrap();
        let b = store.create("pages", &row(0, 0, "y"), None).unwrap();
        assert_eq!(a, 1);
        assert_eq!(b, 2);
    }

    #[test]
    fn test_create_with_requested_uid() {
        let mut store = MemoryStore::new();
        let uid = store.create("pages", &row(0, 0, "x"), Some(40)).unwrap();
        assert_eq!(uid, 40);
        // next auto uid continues past it
        assert_eq!(store.create("pages", &row(0, 0, "y"), None).unwrap(), 41);
        // a taken uid is refused
        assert!(store.create("pages", &row(0, 0, "z"), Some(40)).is_err());
    }

    #[test]
    fn test_update_merges_fields_keeps_uid() {
        let mut store = MemoryStore::new();
        store.seed("pages", row(7, 0, "old"));
        store
            .update(
                "pages",
                7,
                &RecordData::new().with("title", "new").with("uid", 999),
            )
            .unwrap();
        let updated = store.get("pages", 7, None).unwrap().unwrap();
        assert_eq!(updated.text("title"), Some("new"));
        assert_eq!(updated.uid(), Some(7));
    }

    #[test]
    fn test_move_record() {
        let mut store = MemoryStore::new();
        store.seed("content", row(1, 5, "x"));
        store.move_record("content", 1, 9).unwrap();
        assert_eq!(store.get("content", 1, None).unwrap().unwrap().pid(), Some(9));
        assert!(store.move_record("content", 99, 9).is_err());
    }

    #[test]
    fn test_memory_blob_store() {
        let mut blobs = MemoryBlobStore::new();
        blobs.seed("a.txt", b"abc", 100);
        assert_eq!(blobs.read("a.txt").unwrap(), b"abc");
        assert_eq!(blobs.mtime("a.txt"), Some(100));
        assert!(blobs.read("missing").is_err());
    }
}
