//! Cache command - inspect or clear cached extraction results.

use clap::{Args, Subcommand};
use console::style;

use docex_core::ContentCache;

use super::load_config;

/// Arguments for the cache command.
#[derive(Args)]
pub struct CacheArgs {
    #[command(subcommand)]
    command: CacheCommand,
}

#[derive(Subcommand)]
enum CacheCommand {
    /// Show cache location and size
    Stats {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove every cached result
    Clear,
}

pub fn run(args: CacheArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let cache = ContentCache::open(&config.cache.dir)?;

    match args.command {
        CacheCommand::Stats { json } => {
            let stats = cache.stats();
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
                return Ok(());
            }

            println!("{}", style("Cache").bold());
            println!("Directory: {}", cache.dir().display());
            if !config.cache.enabled {
                println!("Status: {}", style("disabled").yellow());
            }
            println!("Entries: {}", stats.entries);
            println!("Size: {} bytes", stats.bytes);
        }
        CacheCommand::Clear => {
            let removed = cache.clear()?;
            println!(
                "{} Removed {} cached results from {}",
                style("✓").green(),
                removed,
                cache.dir().display()
            );
        }
    }

    Ok(())
}
