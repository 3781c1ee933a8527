//! Cross-platform filesystem utilities
//!
//! - `normalize_path`: Strips Windows `\\?\` prefix from canonicalized paths
//! - `atomic_rename` / `write_atomic`: all-or-nothing file replacement
//! - `get_cache_base_dir` / `get_runtime_base_dir`: per-user state locations
//! - `root_hash`: stable identifier for a project root

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "iproxy-indexer";

// FNV-1a constants for 64-bit hash
const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// Incremental FNV-1a hasher.
///
/// Stable across runs and platforms, unlike `std::hash::DefaultHasher`,
/// so it is safe to persist.
#[derive(Debug, Clone, Copy)]
pub struct Fnv1a(u64);

impl Default for Fnv1a {
    fn default() -> Self {
        Self(FNV_OFFSET)
    }
}

impl Fnv1a {
    pub fn write(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.0 ^= *byte as u64;
            self.0 = self.0.wrapping_mul(FNV_PRIME);
        }
    }

    pub fn write_str(&mut self, s: &str) {
        self.write(s.as_bytes());
        // Separator so ("ab", "c") and ("a", "bc") differ
        self.write(&[0xff]);
    }

    pub fn write_u64(&mut self, n: u64) {
        self.write(&n.to_le_bytes());
    }

    pub fn finish(&self) -> u64 {
        self.0
    }

    pub fn hex(&self) -> String {
        format!("{:016x}", self.0)
    }
}

/// Normalize Windows paths by removing the `\\?\` prefix if present.
///
/// No-op on Unix.
///
/// # Examples
///
/// ```
/// use std::path::PathBuf;
/// use iproxy_indexer::fs_utils::normalize_path;
///
/// let path = PathBuf::from("/home/user/repo");
/// assert_eq!(normalize_path(&path), path);
/// ```
pub fn normalize_path(path: &Path) -> PathBuf {
    #[cfg(windows)]
    {
        let s = path.to_string_lossy();
        if let Some(stripped) = s.strip_prefix(r"\\?\UNC\") {
            return PathBuf::from(format!(r"\\{}", stripped));
        }
        if let Some(stripped) = s.strip_prefix(r"\\?\") {
            return PathBuf::from(stripped);
        }
    }
    path.to_path_buf()
}

/// Canonicalize a project root, falling back to the path as given.
pub fn canonical_root(path: &Path) -> PathBuf {
    path.canonicalize()
        .map(|p| normalize_path(&p))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Stable 16-hex-char identifier for a project root.
///
/// Used to name both the cache entry and the daemon socket for the root.
pub fn root_hash(root: &Path) -> String {
    let mut hasher = Fnv1a::default();
    hasher.write_str(&root.to_string_lossy());
    hasher.hex()
}

/// Cross-platform atomic rename.
///
/// On Unix, `fs::rename` atomically replaces the target if it exists.
/// On Windows the target has to be deleted first.
pub fn atomic_rename(src: &Path, dst: &Path) -> io::Result<()> {
    #[cfg(windows)]
    {
        if dst.exists() {
            fs::remove_file(dst)?;
        }
    }
    fs::rename(src, dst)
}

/// Write `bytes` to `dst` via a sibling temp file and rename.
///
/// Readers see either the old file or the complete new one, never a prefix.
pub fn write_atomic(dst: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = dst.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let file_name = dst
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "out".to_string());
    let tmp = parent.join(format!(".{}.{}.tmp", file_name, std::process::id()));

    let result = (|| {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        atomic_rename(&tmp, dst)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// Get platform-appropriate cache base directory.
///
/// - **Windows**: `%LOCALAPPDATA%\iproxy-indexer\cache`
/// - **Unix**: `$XDG_CACHE_HOME/iproxy-indexer` or `~/.cache/iproxy-indexer`
/// - **Fallback**: System temp directory + `iproxy-indexer`
pub fn get_cache_base_dir() -> PathBuf {
    #[cfg(windows)]
    {
        if let Ok(local_appdata) = std::env::var("LOCALAPPDATA") {
            return PathBuf::from(local_appdata).join(APP_DIR).join("cache");
        }
    }

    #[cfg(not(windows))]
    {
        if let Ok(xdg_cache) = std::env::var("XDG_CACHE_HOME") {
            if !xdg_cache.is_empty() {
                return PathBuf::from(xdg_cache).join(APP_DIR);
            }
        }
        if let Some(home) = dirs::home_dir() {
            return home.join(".cache").join(APP_DIR);
        }
    }

    std::env::temp_dir().join(APP_DIR)
}

/// Get the per-user runtime directory for sockets and daemon logs.
///
/// - `$XDG_RUNTIME_DIR/iproxy-indexer` when available
/// - otherwise `<tmp>/iproxy-indexer-<user>`
pub fn get_runtime_base_dir() -> PathBuf {
    if let Some(runtime) = dirs::runtime_dir() {
        return runtime.join(APP_DIR);
    }
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "default".to_string());
    std::env::temp_dir().join(format!("{}-{}", APP_DIR, user))
}
