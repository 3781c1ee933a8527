//! iproxy-indexer CLI entry point

use std::process::ExitCode;

use clap::Parser;

use iproxy_indexer::cli::{Cli, Commands};
use iproxy_indexer::commands::{self, CommandContext};
use iproxy_indexer::config::StatePaths;
use iproxy_indexer::{logging, Result};

fn main() -> ExitCode {
    match run() {
        Ok(output) => {
            print!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) if e.is_informational() => {
            println!("{}", e);
            e.exit_code()
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    }
}

fn run() -> Result<String> {
    let cli = Cli::parse();

    let default_level = match cli.command {
        Commands::Serve(_) => "info",
        _ => "warn",
    };
    logging::init(cli.log_level.map(|l| l.as_str()).unwrap_or(default_level));

    let ctx = CommandContext::new(
        cli.format,
        cli.log_level,
        StatePaths::resolve(cli.cache_dir.clone(), cli.runtime_dir.clone()),
    );

    match &cli.command {
        Commands::Build(args) => commands::run_build(args, &ctx),
        Commands::Stats(args) => commands::run_stats(args, &ctx),
        Commands::QueryIproxyFunctions(args) => commands::run_query(args, &ctx),
        Commands::ClearCache(args) => commands::run_clear_cache(args, &ctx),

        #[cfg(unix)]
        Commands::Start(args) => commands::run_start(args, &ctx),
        #[cfg(unix)]
        Commands::Status(args) => commands::run_status(args, &ctx),
        #[cfg(unix)]
        Commands::Stop(args) => commands::run_stop(args, &ctx),
        #[cfg(unix)]
        Commands::TestIproxyQuery(args) => commands::run_test_query(args, &ctx),
        #[cfg(unix)]
        Commands::Serve(args) => commands::run_serve(args, &ctx),

        #[cfg(not(unix))]
        Commands::Start(_)
        | Commands::Status(_)
        | Commands::Stop(_)
        | Commands::TestIproxyQuery(_)
        | Commands::Serve(_) => Err(iproxy_indexer::IndexerError::ConfigError {
            message: "the daemon requires Unix domain sockets".to_string(),
        }),
    }
}
