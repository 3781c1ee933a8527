//! Warm start: serve a validated cache hit, or build and persist.

use std::path::Path;

use crate::cache::{CacheLookup, IndexCache, MissReason};
use crate::config::IndexSettings;
use crate::error::Result;
use crate::fingerprint::Fingerprint;
use crate::index::Index;
use crate::scanner::SourceScanner;

use super::generation::{build_index, BuildReport, IndexingProgressCallback};

/// Where an index came from
#[derive(Debug)]
pub enum IndexSource {
    Cache,
    Built {
        report: BuildReport,
        miss: Option<MissReason>,
    },
}

/// An index ready to serve
#[derive(Debug)]
pub struct WarmIndex {
    pub index: Index,
    pub source: IndexSource,
}

impl WarmIndex {
    pub fn from_cache(&self) -> bool {
        matches!(self.source, IndexSource::Cache)
    }

    pub fn report(&self) -> Option<&BuildReport> {
        match &self.source {
            IndexSource::Built { report, .. } => Some(report),
            IndexSource::Cache => None,
        }
    }

    /// Why the cache could not be used, when one was consulted
    pub fn miss(&self) -> Option<&MissReason> {
        match &self.source {
            IndexSource::Built { miss, .. } => miss.as_ref(),
            IndexSource::Cache => None,
        }
    }
}

/// Fingerprint of `root` as it is on disk now.
///
/// Walks the tree and stats each file; never parses.
pub fn current_fingerprint(root: &Path, settings: &IndexSettings) -> Result<Fingerprint> {
    let scan = SourceScanner::new(root, settings).scan()?;
    Ok(Fingerprint::compute(root, &scan.files, settings))
}

/// Load `root`'s index from `cache` when it is fresh, otherwise build it.
///
/// A freshly built index is written back to the cache. Failing to write the
/// cache is logged and otherwise ignored. `root` must already be canonical.
pub fn load_or_build(
    root: &Path,
    settings: &IndexSettings,
    cache: Option<&IndexCache>,
    progress: Option<IndexingProgressCallback>,
) -> Result<WarmIndex> {
    let miss = match cache {
        Some(cache) => {
            let fingerprint = current_fingerprint(root, settings)?;
            match cache.load(&fingerprint) {
                CacheLookup::Hit(index) => {
                    return Ok(WarmIndex {
                        index,
                        source: IndexSource::Cache,
                    })
                }
                CacheLookup::Miss(reason) => Some(reason),
            }
        }
        None => None,
    };

    let outcome = build_index(root, settings, progress)?;

    if let Some(cache) = cache {
        if let Err(e) = cache.save(&outcome.index) {
            tracing::warn!("Could not write index cache: {}", e);
        }
    }

    Ok(WarmIndex {
        index: outcome.index,
        source: IndexSource::Built {
            report: outcome.report,
            miss,
        },
    })
}
