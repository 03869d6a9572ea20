//! Retexer CLI: rewrite config files in place; use --dry-run to preview.

use anyhow::Result;
use clap::Parser;
use retexer::engine::Cli;
use retexer::engine::handle_run;
use std::time::Instant;

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();
    handle_run(&cli)?;
    log::debug!("Total time: {:?}", start_time.elapsed());
    Ok(())
}
