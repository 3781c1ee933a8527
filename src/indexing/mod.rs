//! Index build pipeline: scan, parse, validate, normalize, merge.

pub mod generation;
pub mod warm;

pub use generation::{
    build_index, BuildOutcome, BuildReport, FileFailure, IndexingProgressCallback,
};
pub use warm::{current_fingerprint, load_or_build, IndexSource, WarmIndex};
