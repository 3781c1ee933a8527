//! Parallel index generation with progress reporting
//!
//! Files are fanned out over a dedicated Rayon pool. Each worker reads,
//! parses and validates its file independently and returns a local list of
//! records; the merge into the `Index` happens afterwards on the calling
//! thread, in scanned-file order, so the result does not depend on the
//! number of workers.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::Serialize;

use crate::config::IndexSettings;
use crate::error::{IndexerError, Result};
use crate::fingerprint::{relative_path, Fingerprint};
use crate::fs_utils;
use crate::index::{FunctionRecord, Index};
use crate::parsing::{mentions_marker, parse_declarations};
use crate::scanner::SourceScanner;
use crate::signature::{validate, Rejection};
use crate::type_key::TypeKey;

/// Progress callback type for index generation.
///
/// The callback receives (current_count, total_count) for progress reporting.
pub type IndexingProgressCallback = Box<dyn Fn(usize, usize) + Send + Sync>;

/// A file that could not be indexed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub path: String,
    pub message: String,
}

/// What happened during a build
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildReport {
    /// Candidate files found by the scanner
    pub files_scanned: usize,
    /// Files parsed successfully
    pub files_parsed: usize,
    /// Files skipped because they never mention a marker
    pub files_skipped: usize,
    /// Directory entries the scanner could not read
    pub unreadable_entries: usize,
    /// Per-file read/parse failures
    pub failures: Vec<FileFailure>,
    /// Function declarations seen in parsed files
    pub declarations_seen: usize,
    /// Records in the final index
    pub records_indexed: usize,
    /// Rejected declarations by reason (unmarked ones are not counted)
    pub rejections: BTreeMap<String, usize>,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl BuildReport {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// A built index plus its report
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub index: Index,
    pub report: BuildReport,
}

/// Per-file result from a worker
#[derive(Debug)]
enum FileOutcome {
    Skipped,
    Parsed {
        records: Vec<FunctionRecord>,
        declarations: usize,
        rejections: Vec<Rejection>,
    },
    Failed(FileFailure),
}

/// Build an index for `root`.
///
/// Per-file failures are collected into the report. The build is only
/// abandoned when the root cannot be scanned, the worker pool cannot be
/// created, or every scanned file failed.
pub fn build_index(
    root: &Path,
    settings: &IndexSettings,
    progress: Option<IndexingProgressCallback>,
) -> Result<BuildOutcome> {
    let started = Instant::now();
    let root = fs_utils::canonical_root(root);

    let scan = SourceScanner::new(&root, settings).scan()?;
    let fingerprint = Fingerprint::compute(&root, &scan.files, settings);

    tracing::info!(
        "Indexing {} files under {} with {} workers",
        scan.files.len(),
        root.display(),
        settings.workers
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(settings.workers)
        .thread_name(|i| format!("iproxy-index-{}", i))
        .build()
        .map_err(|e| IndexerError::ConfigError {
            message: format!("Failed to create worker pool: {}", e),
        })?;

    let outcomes = pool.install(|| analyze_files_parallel(&root, &scan.files, settings, progress));

    let mut report = BuildReport {
        files_scanned: scan.files.len(),
        unreadable_entries: scan.unreadable,
        ..Default::default()
    };

    let mut index = Index::new(&root, fingerprint, scan.files.len());
    let mut rejections: HashMap<Rejection, usize> = HashMap::new();

    for outcome in outcomes {
        match outcome {
            FileOutcome::Skipped => report.files_skipped += 1,
            FileOutcome::Parsed {
                records,
                declarations,
                rejections: rejected,
            } => {
                report.files_parsed += 1;
                report.declarations_seen += declarations;
                for reason in rejected {
                    *rejections.entry(reason).or_default() += 1;
                }
                for record in records {
                    index.insert(record);
                }
            }
            FileOutcome::Failed(failure) => {
                tracing::warn!("{}: {}", failure.path, failure.message);
                report.failures.push(failure);
            }
        }
    }

    report.rejections = rejections
        .into_iter()
        .map(|(reason, count)| (reason.to_string(), count))
        .collect();
    report.records_indexed = index.record_count();
    index.files_failed = report.failures.len();
    report.elapsed = started.elapsed();

    if report.files_scanned > 0 && report.failures.len() == report.files_scanned {
        return Err(IndexerError::ParseFailures {
            failed: report.failures.len(),
            total: report.files_scanned,
        });
    }

    tracing::info!(
        "Index built: {} records under {} keys from {} files ({} skipped, {} failed) in {:?}",
        report.records_indexed,
        index.len(),
        report.files_scanned,
        report.files_skipped,
        report.failures.len(),
        report.elapsed
    );

    Ok(BuildOutcome { index, report })
}

/// Process files in parallel on the current Rayon pool.
///
/// Output order matches `files` order.
fn analyze_files_parallel(
    root: &Path,
    files: &[PathBuf],
    settings: &IndexSettings,
    progress: Option<IndexingProgressCallback>,
) -> Vec<FileOutcome> {
    let total = files.len();
    let processed = AtomicUsize::new(0);

    let outcomes: Vec<FileOutcome> = files
        .par_iter()
        .map(|file_path| {
            let current = processed.fetch_add(1, Ordering::Relaxed);

            // Progress callback (every 50 files to avoid too much overhead)
            if let Some(ref cb) = progress {
                if current % 50 == 0 {
                    cb(current, total);
                }
            }

            index_file(root, file_path, &settings.markers)
        })
        .collect();

    if let Some(ref cb) = progress {
        cb(total, total);
    }

    outcomes
}

fn index_file(root: &Path, file_path: &Path, markers: &[String]) -> FileOutcome {
    let rel = relative_path(root, file_path);

    let source = match fs::read_to_string(file_path) {
        Ok(s) => s,
        Err(e) => {
            return FileOutcome::Failed(FileFailure {
                path: rel,
                message: format!("read failed: {}", e),
            })
        }
    };

    if !mentions_marker(&source, markers) {
        return FileOutcome::Skipped;
    }

    let declarations = match parse_declarations(file_path, &source, markers) {
        Ok(d) => d,
        Err(IndexerError::ParseFailure { message, .. }) => {
            return FileOutcome::Failed(FileFailure { path: rel, message })
        }
        Err(e) => {
            return FileOutcome::Failed(FileFailure {
                path: rel,
                message: e.to_string(),
            })
        }
    };

    let mut records: Vec<FunctionRecord> = Vec::new();
    let mut rejections = Vec::new();

    for decl in &declarations {
        // A later definition of the same name shadows the earlier one,
        // whether or not the later one is indexable
        records.retain(|r| r.qualified_name != decl.qualified_name);

        match validate(decl) {
            Ok(subject) => records.push(FunctionRecord {
                qualified_name: decl.qualified_name.clone(),
                file_path: rel.clone(),
                line_number: decl.line,
                is_async: decl.is_async,
                subject_param: subject.parameter.name.clone(),
                subject_type_raw: subject.type_raw.to_string(),
                subject_type_key: TypeKey::normalize(subject.type_raw),
            }),
            Err(Rejection::NoMarker) => {}
            Err(reason) => {
                tracing::debug!(
                    "{}:{} {} not indexed: {}",
                    rel,
                    decl.line,
                    decl.qualified_name,
                    reason
                );
                rejections.push(reason);
            }
        }
    }

    FileOutcome::Parsed {
        records,
        declarations: declarations.len(),
        rejections,
    }
}
