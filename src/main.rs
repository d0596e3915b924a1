use anyhow::Result;
use clap::Parser;
use sstharm::cli::{run, summarise, Cli};
use sstharm::logging::init_logging;
use std::process::ExitCode;

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    let config = cli.run_config()?;
    let reports = run(cli.command, cli.store, &config)?;
    if summarise(&reports) {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
