//! Cache command handler - remove a project's cached index

use crate::cache::IndexCache;
use crate::cli::RootArgs;
use crate::commands::{resolve_root, CommandContext};
use crate::error::Result;

/// Run `clear-cache`
pub fn run_clear_cache(args: &RootArgs, ctx: &CommandContext) -> Result<String> {
    let root = resolve_root(args)?;
    let cache = IndexCache::for_root(&ctx.paths, &root);

    if cache.clear()? {
        Ok(format!("Removed cache {}\n", cache.path().display()))
    } else {
        Ok(format!("No cache for {}\n", root.display()))
    }
}
