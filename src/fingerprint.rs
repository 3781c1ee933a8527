//! Cheap change detection for a project root.
//!
//! A fingerprint summarizes the scanned file set (relative path, mtime,
//! size) plus the index settings digest. It does not read file contents,
//! so validating a cache costs one directory walk and one `stat` per file.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::config::IndexSettings;
use crate::fs_utils::Fnv1a;

/// Hex-encoded 64-bit fingerprint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of `files` under `root`.
    ///
    /// `files` must be the scanner's sorted output so the result does not
    /// depend on walk order.
    pub fn compute(root: &Path, files: &[PathBuf], settings: &IndexSettings) -> Self {
        let mut hasher = Fnv1a::default();
        hasher.write_u64(settings.digest());
        hasher.write_u64(files.len() as u64);

        for path in files {
            hasher.write_str(&relative_path(root, path));
            match fs::metadata(path) {
                Ok(meta) => {
                    let mtime = meta
                        .modified()
                        .ok()
                        .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
                        .map(|d| d.as_nanos() as u64)
                        .unwrap_or(0);
                    hasher.write_u64(mtime);
                    hasher.write_u64(meta.len());
                }
                Err(_) => hasher.write_str("<missing>"),
            }
        }

        Self(hasher.hex())
    }

    pub fn from_hex(hex: &str) -> Self {
        Self(hex.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Root-relative display path with `/` separators
pub fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}
