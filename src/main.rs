#![allow(dead_code)]

mod app;
mod cli;
mod config;
mod data;
mod log;

use clap::Parser;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    ::log::info!("Starting ecumap v{}", env!("CARGO_PKG_VERSION"));

    cli::run(cli::Cli::parse())
}
