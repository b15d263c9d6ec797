//! Binary crate for the `salahnow` command-line tool.
//!
//! This crate focuses on:
//! - Parsing CLI arguments
//! - Interactive configuration
//! - Human-friendly output and the notification loop

use clap::Parser;
use simplelog::{ColorChoice, ConfigBuilder, LevelFilter, TermLogger, TerminalMode};

mod cli;
mod notify;
mod render;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cmd = cli::Cli::parse();

    let log_config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .add_filter_allow_str("salah")
        .build();
    if let Err(err) = TermLogger::init(log_level(cmd.verbose), log_config, TerminalMode::Stderr, ColorChoice::Auto) {
        eprintln!("Logging disabled: {err}");
    }

    log::debug!("salahnow starting: {:?}", cmd.command);

    cmd.run().await
}

fn log_level(verbose: bool) -> LevelFilter {
    if verbose { LevelFilter::Debug } else { LevelFilter::Warn }
}
