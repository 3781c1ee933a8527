//! Build command handler - scan, index and persist

use indicatif::{ProgressBar, ProgressStyle};

use crate::cache::IndexCache;
use crate::cli::{BuildArgs, OutputFormat};
use crate::commands::{key_values, resolve_root, resolve_settings, to_json, CommandContext};
use crate::error::{IndexerError, Result};
use crate::indexing::{build_index, BuildReport, IndexingProgressCallback};

/// Run the build command
pub fn run_build(args: &BuildArgs, ctx: &CommandContext) -> Result<String> {
    let root = resolve_root(&args.root)?;
    let (config, settings) = resolve_settings(&root, &args.index)?;
    let strict = args.strict || config.strict.unwrap_or(false);

    let bar = args.progress.then(progress_bar);
    let progress = bar.clone().map(|bar| -> IndexingProgressCallback {
        Box::new(move |current, total| {
            bar.set_length(total as u64);
            bar.set_position(current as u64);
        })
    });

    let result = build_index(&root, &settings, progress);
    if let Some(bar) = &bar {
        bar.finish_and_clear();
    }
    let outcome = result?;

    check_strict(&outcome.report, strict)?;

    let cache_path = if args.no_cache {
        None
    } else {
        let cache = IndexCache::for_root(&ctx.paths, &root);
        cache.save(&outcome.index)?;
        Some(cache.path().to_path_buf())
    };

    let index = &outcome.index;
    let report = &outcome.report;

    match ctx.format {
        OutputFormat::Json => {
            let value = serde_json::json!({
                "root": root,
                "index_keys": index.len(),
                "records": index.record_count(),
                "fingerprint": index.fingerprint,
                "cache_file": cache_path,
                "elapsed_ms": report.elapsed.as_millis() as u64,
                "report": report,
            });
            Ok(format!("{}\n", to_json(&value)?))
        }
        OutputFormat::Text => {
            let mut out = format!(
                "Indexed {} functions under {} type keys from {} files\n",
                index.record_count(),
                index.len(),
                report.files_scanned
            );
            out.push_str(&key_values(&[
                ("root", root.display().to_string()),
                ("files_parsed", report.files_parsed.to_string()),
                ("files_skipped", report.files_skipped.to_string()),
                ("files_failed", report.failures.len().to_string()),
                ("declarations_seen", report.declarations_seen.to_string()),
                ("fingerprint", index.fingerprint.to_string()),
                (
                    "cache_file",
                    cache_path
                        .as_ref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| "(not written)".to_string()),
                ),
                ("elapsed_ms", report.elapsed.as_millis().to_string()),
            ]));
            if !report.rejections.is_empty() {
                out.push_str("rejected:\n");
                for (reason, count) in &report.rejections {
                    out.push_str(&format!("  {}: {}\n", reason, count));
                }
            }
            if report.has_failures() {
                out.push_str("failures:\n");
                for failure in &report.failures {
                    out.push_str(&format!("  {}: {}\n", failure.path, failure.message));
                }
            }
            Ok(out)
        }
    }
}

/// In strict mode any per-file failure fails the command
pub(crate) fn check_strict(report: &BuildReport, strict: bool) -> Result<()> {
    if strict && report.has_failures() {
        for failure in &report.failures {
            eprintln!("{}: {}", failure.path, failure.message);
        }
    }
    check_strict_index(report.failures.len(), report.files_scanned, strict)
}

/// Strict check for an index whose build report is gone (cache hit)
pub(crate) fn check_strict_index(failed: usize, total: usize, strict: bool) -> Result<()> {
    if strict && failed > 0 {
        return Err(IndexerError::ParseFailures { failed, total });
    }
    Ok(())
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::default_bar().template("{bar:40.cyan/blue} {pos}/{len} files") {
        bar.set_style(style);
    }
    bar
}
