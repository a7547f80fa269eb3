use anyhow::Result;
use clap::Parser;
use fishpond::config::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();
    fishpond::app::run(cli)
}
