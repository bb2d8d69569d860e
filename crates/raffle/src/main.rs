// SPDX-FileCopyrightText: 2026 Raffle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Raffle - sticker raffle purchase bot.
//!
//! This is the binary entry point for the bot.

mod bridge;
mod dispatch;
mod serve;
mod status;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use raffle_config::RaffleConfig;

/// Raffle - sticker raffle purchase bot.
#[derive(Parser, Debug)]
#[command(name = "raffle", version, about, long_about = None)]
struct Cli {
    /// Load configuration from this file instead of the default search path.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the bot over the stdin/stdout bridge.
    Serve,
    /// Show record counts per partition.
    Status {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
        /// Disable colors.
        #[arg(long)]
        plain: bool,
    },
    /// Print the effective configuration as TOML.
    Config,
}

fn load_config(path: Option<&PathBuf>) -> RaffleConfig {
    let loaded = match path {
        Some(path) => raffle_config::load_and_validate_path(path),
        None => raffle_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            raffle_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref());

    match cli.command {
        Some(Commands::Serve) => {
            if let Err(e) = serve::run_serve(config).await {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        }
        Some(Commands::Status { json, plain }) => {
            if let Err(e) = status::run_status(&config, json, plain).await {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        }
        Some(Commands::Config) => match toml::to_string_pretty(&config) {
            Ok(rendered) => print!("{rendered}"),
            Err(e) => {
                eprintln!("error: failed to render configuration: {e}");
                std::process::exit(1);
            }
        },
        None => {
            println!("raffle: use --help for available commands");
        }
    }
}
