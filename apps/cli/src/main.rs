//! SiteGen CLI — generate a small website from a brief.
//!
//! Streams a theme, shared template parts and page sections from a
//! text-completion service, stores the sections and saves the run.

mod commands;
mod offline;
mod progress;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
