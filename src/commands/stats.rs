//! Stats command handler

use crate::cache::IndexCache;
use crate::cli::{OutputFormat, StatsArgs};
use crate::commands::{key_values, resolve_root, resolve_settings, to_json, CommandContext};
use crate::error::Result;
use crate::indexing::load_or_build;

/// Number of largest buckets listed in the summary
const TOP_KEYS: usize = 10;

/// Run the stats command
pub fn run_stats(args: &StatsArgs, ctx: &CommandContext) -> Result<String> {
    let root = resolve_root(&args.root)?;
    let (_, settings) = resolve_settings(&root, &args.index)?;

    let cache = IndexCache::for_root(&ctx.paths, &root);
    let warm = load_or_build(&root, &settings, (!args.no_cache).then_some(&cache), None)?;
    let index = &warm.index;
    let cached = cache.header();

    let mut buckets: Vec<(&str, usize)> = index
        .iter()
        .map(|(key, records)| (key.as_str(), records.len()))
        .collect();
    buckets.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    buckets.truncate(TOP_KEYS);

    let source = if warm.from_cache() { "cache" } else { "build" };

    match ctx.format {
        OutputFormat::Json => {
            let top: Vec<serde_json::Value> = buckets
                .iter()
                .map(|(key, count)| serde_json::json!({ "type_key": key, "records": count }))
                .collect();
            let value = serde_json::json!({
                "root": index.root_path,
                "index_keys": index.len(),
                "records": index.record_count(),
                "files_indexed": index.files_indexed,
                "fingerprint": index.fingerprint,
                "built_at": index.built_at,
                "source": source,
                "cache_file": cached.as_ref().map(|_| cache.path()),
                "cached_at": cached.as_ref().map(|h| h.created_at.as_str()),
                "cache_miss": warm.miss().map(|reason| reason.to_string()),
                "top_keys": top,
            });
            Ok(format!("{}\n", to_json(&value)?))
        }
        OutputFormat::Text => {
            let mut out = key_values(&[
                ("root", index.root_path.display().to_string()),
                ("index_keys", index.len().to_string()),
                ("records", index.record_count().to_string()),
                ("files_indexed", index.files_indexed.to_string()),
                ("fingerprint", index.fingerprint.to_string()),
                ("built_at", index.built_at.clone()),
                (
                    "source",
                    match warm.miss() {
                        Some(reason) => format!("{} ({})", source, reason),
                        None => source.to_string(),
                    },
                ),
                (
                    "cache",
                    match &cached {
                        Some(header) => {
                            format!("{} (written {})", cache.path().display(), header.created_at)
                        }
                        None => "none".to_string(),
                    },
                ),
            ]);
            if !buckets.is_empty() {
                out.push_str("top_keys:\n");
                for (key, count) in &buckets {
                    out.push_str(&format!("  {}: {}\n", key, count));
                }
            }
            Ok(out)
        }
    }
}
