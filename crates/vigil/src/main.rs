// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vigil - cache-invalidation broadcast coordinator.
//!
//! Binary entry point: watch for invalidations as a signed-in client,
//! publish new ones, and inspect local and remote state.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod client;
mod publish;
mod shutdown;
mod status;
mod terminal;
mod watch;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use vigil_config::VigilConfig;
use vigil_core::ClearType;

/// Vigil - cache-invalidation broadcast coordinator.
#[derive(Parser, Debug)]
#[command(name = "vigil", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the XDG hierarchy.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a client session that purges local state when an invalidation arrives.
    Watch {
        /// User the local session is signed in as.
        #[arg(long)]
        user: String,
    },
    /// Append an invalidation record for every client to pick up.
    Publish {
        /// What clients clear: full, storage or service_worker.
        #[arg(long)]
        clear_type: ClearType,
        /// Explanation shown to users.
        #[arg(long)]
        reason: Option<String>,
        /// Let users postpone the purge.
        #[arg(long)]
        skippable: bool,
    },
    /// Show the locally applied version and the latest published record.
    Status {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
        /// Disable colors.
        #[arg(long)]
        plain: bool,
    },
    /// Validate configuration and print the effective values.
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(errors) => {
            vigil_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Some(Commands::Watch { user }) => {
            init_tracing(&config.client.log_level);
            watch::run_watch(config, user).await
        }
        Some(Commands::Publish {
            clear_type,
            reason,
            skippable,
        }) => publish::run_publish(&config, clear_type, reason, skippable).await,
        Some(Commands::Status { json, plain }) => status::run_status(&config, json, plain).await,
        Some(Commands::Config) => print_config(&config),
        None => {
            println!("vigil: use --help for available commands");
            Ok(())
        }
    };

    // A prompt still blocked on stdin would otherwise hold the runtime open.
    std::process::exit(match result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("error: {e}");
            1
        }
    });
}

fn load_config(
    path: Option<&std::path::Path>,
) -> Result<VigilConfig, Vec<vigil_config::ConfigError>> {
    match path {
        Some(path) => vigil_config::load_and_validate_path(path),
        None => vigil_config::load_and_validate(),
    }
}

fn print_config(config: &VigilConfig) -> Result<(), vigil_core::VigilError> {
    let rendered = toml::to_string_pretty(config)
        .map_err(|e| vigil_core::VigilError::Internal(format!("failed to render config: {e}")))?;
    eprintln!("vigil: configuration is valid");
    print!("{rendered}");
    Ok(())
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("vigil={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
