// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Engram - a relational memory store for fleets of AI agents.
//!
//! This is the binary entry point for the Engram service.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod maintain;
mod serve;
mod status;

/// Engram - a relational memory store for fleets of AI agents.
#[derive(Parser, Debug)]
#[command(name = "engram", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Print store statistics per organization.
    Status,
    /// Run one maintenance pass (queues, scores, retention, conflicts, promotion).
    Maintain,
    /// Run the background workers until interrupted.
    Serve,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load and validate configuration at startup.
    let config = match engram_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            engram_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.service.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let result = match cli.command {
        Some(Commands::Status) => status::run(&config).await,
        Some(Commands::Maintain) => maintain::run(&config).await,
        Some(Commands::Serve) => serve::run(&config).await,
        None => {
            println!("engram: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("engram: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        // Verify jemalloc is the global allocator by advancing the epoch.
        // Only jemalloc supports this -- the system allocator would fail.
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report non-zero allocation");
    }

    #[test]
    fn binary_loads_config_defaults() {
        let config = engram_config::load_config_from_str("")
            .expect("default config should be valid");
        assert_eq!(config.service.name, "engram");
    }
}
