mod cli;
mod demo;

use clap::Parser;

fn main() -> anyhow::Result<()> {
    stencil_utils::init_logging();
    cli::run(cli::Cli::parse())
}
