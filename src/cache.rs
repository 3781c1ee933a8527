//! Persistent warm-start cache for built indexes
//!
//! One file per project root at `<cache_dir>/<root_hash>/index.bin`:
//!
//! ```text
//! ┌──────────────────────────────┬──────────────────────────────┐
//! │ CacheHeader (bincode)        │ Index (bincode)              │
//! │ magic, format, fingerprint,  │ entries, root, fingerprint,  │
//! │ root, created_at             │ built_at                     │
//! └──────────────────────────────┴──────────────────────────────┘
//! ```
//!
//! The header is decoded first so a stale cache is rejected without
//! decoding the body. Every failure on the read path is a cache miss, never
//! an error. Writes are all-or-nothing (temp file + rename).

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use bincode::Options;
use serde::{Deserialize, Serialize};

use crate::config::StatePaths;
use crate::error::{IndexerError, Result};
use crate::fingerprint::Fingerprint;
use crate::fs_utils;
use crate::index::Index;

const CACHE_MAGIC: [u8; 4] = *b"IPXI";

/// Bumped whenever the serialized layout of `Index` changes
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// Metadata stored ahead of the index body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheHeader {
    magic: [u8; 4],
    pub format_version: u32,
    pub fingerprint: Fingerprint,
    pub root: PathBuf,
    pub created_at: String,
}

/// Why a cache lookup did not produce an index
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissReason {
    NotFound,
    Corrupt(String),
    VersionMismatch { found: u32 },
    RootMismatch,
    Stale,
}

impl fmt::Display for MissReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => f.write_str("no cache file"),
            Self::Corrupt(msg) => write!(f, "corrupt cache: {}", msg),
            Self::VersionMismatch { found } => write!(
                f,
                "cache format {} (expected {})",
                found, CACHE_FORMAT_VERSION
            ),
            Self::RootMismatch => f.write_str("cache belongs to a different root"),
            Self::Stale => f.write_str("source files changed"),
        }
    }
}

/// Result of a cache lookup
#[derive(Debug)]
pub enum CacheLookup {
    Hit(Index),
    Miss(MissReason),
}

/// Cache entry for one project root
#[derive(Debug, Clone)]
pub struct IndexCache {
    path: PathBuf,
    root: PathBuf,
}

fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes()
}

impl IndexCache {
    /// Cache entry for `root` under the configured cache directory
    pub fn for_root(paths: &StatePaths, root: &Path) -> Self {
        Self {
            path: paths.cache_file(root),
            root: root.to_path_buf(),
        }
    }

    /// Cache entry at an explicit file path
    pub fn at(path: PathBuf, root: &Path) -> Self {
        Self {
            path,
            root: root.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Persist an index snapshot.
    pub fn save(&self, index: &Index) -> Result<()> {
        let header = CacheHeader {
            magic: CACHE_MAGIC,
            format_version: CACHE_FORMAT_VERSION,
            fingerprint: index.fingerprint.clone(),
            root: index.root_path.clone(),
            created_at: chrono::Utc::now().to_rfc3339(),
        };

        let mut bytes = Vec::new();
        codec()
            .serialize_into(&mut bytes, &header)
            .and_then(|_| codec().serialize_into(&mut bytes, index))
            .map_err(|e| IndexerError::file(&self.path, format!("serialize failed: {}", e)))?;

        fs_utils::write_atomic(&self.path, &bytes).map_err(|e| IndexerError::file(&self.path, e))?;

        tracing::debug!(
            "Saved index cache {} ({} bytes, fingerprint {})",
            self.path.display(),
            bytes.len(),
            index.fingerprint
        );
        Ok(())
    }

    /// Load the cached index if it matches `current`.
    pub fn load(&self, current: &Fingerprint) -> CacheLookup {
        let lookup = self.load_inner(current);
        match &lookup {
            CacheLookup::Hit(index) => tracing::debug!(
                "Cache hit for {} ({} keys)",
                self.root.display(),
                index.len()
            ),
            CacheLookup::Miss(MissReason::Corrupt(msg)) => tracing::warn!(
                "Ignoring unreadable cache {}: {}",
                self.path.display(),
                msg
            ),
            CacheLookup::Miss(reason) => {
                tracing::info!("Cache miss for {}: {}", self.root.display(), reason)
            }
        }
        lookup
    }

    fn load_inner(&self, current: &Fingerprint) -> CacheLookup {
        let bytes = match fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return CacheLookup::Miss(MissReason::NotFound)
            }
            Err(e) => return CacheLookup::Miss(MissReason::Corrupt(e.to_string())),
        };

        let limit = bytes.len() as u64;
        let mut reader = bytes.as_slice();

        let header: CacheHeader = match codec().with_limit(limit).deserialize_from(&mut reader) {
            Ok(h) => h,
            Err(e) => return CacheLookup::Miss(MissReason::Corrupt(e.to_string())),
        };

        if header.magic != CACHE_MAGIC {
            return CacheLookup::Miss(MissReason::Corrupt("bad magic".to_string()));
        }
        if header.format_version != CACHE_FORMAT_VERSION {
            return CacheLookup::Miss(MissReason::VersionMismatch {
                found: header.format_version,
            });
        }
        if header.root != self.root {
            return CacheLookup::Miss(MissReason::RootMismatch);
        }
        if &header.fingerprint != current {
            return CacheLookup::Miss(MissReason::Stale);
        }

        let index: Index = match codec().with_limit(limit).deserialize_from(&mut reader) {
            Ok(i) => i,
            Err(e) => return CacheLookup::Miss(MissReason::Corrupt(e.to_string())),
        };

        if index.fingerprint != header.fingerprint || !index.is_consistent() {
            return CacheLookup::Miss(MissReason::Corrupt(
                "header and body disagree".to_string(),
            ));
        }

        CacheLookup::Hit(index)
    }

    /// Read only the header, for status display
    pub fn header(&self) -> Option<CacheHeader> {
        let bytes = fs::read(&self.path).ok()?;
        let limit = bytes.len() as u64;
        let header: CacheHeader = codec()
            .with_limit(limit)
            .deserialize_from(bytes.as_slice())
            .ok()?;
        (header.magic == CACHE_MAGIC).then_some(header)
    }

    /// Remove the cache file. Returns whether anything was removed.
    pub fn clear(&self) -> Result<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                if let Some(parent) = self.path.parent() {
                    let _ = fs::remove_dir(parent);
                }
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(IndexerError::file(&self.path, e)),
        }
    }
}
