//! In-memory index of injectable functions keyed by subject type.
//!
//! An `Index` is immutable once built: builds produce a fresh value and the
//! daemon publishes it by swapping an `Arc`, so readers never observe a
//! partially merged state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::fingerprint::Fingerprint;
use crate::type_key::TypeKey;

/// One indexable declaration
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionRecord {
    /// Scope-qualified name, unique within a file
    pub qualified_name: String,
    /// Root-relative path with `/` separators
    pub file_path: String,
    /// 1-based line of the `def`
    pub line_number: usize,
    pub is_async: bool,
    /// Name of the subject parameter
    pub subject_param: String,
    /// Annotation as written
    pub subject_type_raw: String,
    /// Normalized lookup key
    pub subject_type_key: TypeKey,
}

impl FunctionRecord {
    /// Identity used for de-duplication
    pub fn identity(&self) -> (&str, &str) {
        (&self.qualified_name, &self.file_path)
    }
}

/// The product of a build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    /// Project root this index describes
    pub root_path: PathBuf,
    /// Fingerprint of the scanned files at build time
    pub fingerprint: Fingerprint,
    /// Number of source files scanned
    pub files_indexed: usize,
    /// Scanned files that could not be read or parsed
    pub files_failed: usize,
    /// RFC 3339 build timestamp
    pub built_at: String,
    entries: HashMap<TypeKey, Vec<FunctionRecord>>,
}

impl Index {
    /// Create an empty index for a root
    pub fn new(root_path: &Path, fingerprint: Fingerprint, files_indexed: usize) -> Self {
        Self {
            root_path: root_path.to_path_buf(),
            fingerprint,
            files_indexed,
            files_failed: 0,
            built_at: chrono::Utc::now().to_rfc3339(),
            entries: HashMap::new(),
        }
    }

    /// Insert a record into its bucket.
    ///
    /// A record with the same (qualified_name, file_path) already in the
    /// bucket is replaced in place, so the latest write wins and the
    /// bucket keeps its insertion order.
    pub fn insert(&mut self, record: FunctionRecord) {
        let bucket = self
            .entries
            .entry(record.subject_type_key.clone())
            .or_default();

        match bucket
            .iter_mut()
            .find(|existing| existing.identity() == record.identity())
        {
            Some(existing) => *existing = record,
            None => bucket.push(record),
        }
    }

    /// Records whose subject key equals `key`, in insertion order
    pub fn get(&self, key: &TypeKey) -> &[FunctionRecord] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of distinct type keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total records across all keys
    pub fn record_count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// All keys, sorted
    pub fn keys(&self) -> Vec<&TypeKey> {
        let mut keys: Vec<&TypeKey> = self.entries.keys().collect();
        keys.sort();
        keys
    }

    /// Iterate over (key, bucket) pairs in arbitrary order
    pub fn iter(&self) -> impl Iterator<Item = (&TypeKey, &[FunctionRecord])> {
        self.entries.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Compare entries as sets: same keys, same records per key,
    /// ignoring bucket order and build metadata.
    pub fn same_entries(&self, other: &Index) -> bool {
        if self.entries.len() != other.entries.len() {
            return false;
        }
        self.entries.iter().all(|(key, bucket)| {
            let Some(theirs) = other.entries.get(key) else {
                return false;
            };
            let mut a: Vec<&FunctionRecord> = bucket.iter().collect();
            let mut b: Vec<&FunctionRecord> = theirs.iter().collect();
            a.sort_by(|x, y| x.identity().cmp(&y.identity()));
            b.sort_by(|x, y| x.identity().cmp(&y.identity()));
            a == b
        })
    }

    /// Check that every record sits in the bucket of its own key
    pub fn is_consistent(&self) -> bool {
        self.entries
            .iter()
            .all(|(key, bucket)| bucket.iter().all(|r| &r.subject_type_key == key))
    }
}
