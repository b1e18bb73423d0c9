use anyhow::Result;
use clap::Parser;

use keytone::cli;

fn main() -> Result<()> {
    env_logger::init();
    let cli = cli::Cli::parse();
    cli::run(cli)
}
