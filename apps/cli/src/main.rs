//! LeadSourcer CLI — repository-driven lead sourcing and enrichment.
//!
//! Registers repositories, enqueues sourcing/enrichment jobs, inspects
//! job progress, and runs the background worker that executes them.

mod commands;

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
