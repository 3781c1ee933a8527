//! Query command handler - one-shot lookup by subject type

use crate::cache::IndexCache;
use crate::cli::QueryArgs;
use crate::commands::build::{check_strict, check_strict_index};
use crate::commands::{records_json, resolve_root, resolve_settings, CommandContext};
use crate::error::Result;
use crate::indexing::load_or_build;
use crate::query::TypeQuery;

/// Run `query-iproxy-functions`.
///
/// Serves from the cache when it is fresh; otherwise builds and refreshes
/// the cache. Prints a JSON array, `[]` when nothing matches.
pub fn run_query(args: &QueryArgs, ctx: &CommandContext) -> Result<String> {
    let root = resolve_root(&args.root)?;
    let (config, settings) = resolve_settings(&root, &args.index)?;
    let strict = args.strict || config.strict.unwrap_or(false);

    let cache = (!args.no_cache).then(|| IndexCache::for_root(&ctx.paths, &root));
    let warm = load_or_build(&root, &settings, cache.as_ref(), None)?;

    match warm.report() {
        Some(report) => check_strict(report, strict)?,
        None => check_strict_index(warm.index.files_failed, warm.index.files_indexed, strict)?,
    }

    let query = TypeQuery {
        type_key: args.type_key.clone(),
        nested: args.nested,
    };
    let records = query.run(&warm.index);
    tracing::debug!("{} records for {:?}", records.len(), args.type_key);

    Ok(format!("{}\n", records_json(records)?))
}
