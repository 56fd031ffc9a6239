//! protosync CLI. Gathers `.proto` files from plugin modules, keeps their
//! Elasticsearch mappings in sync, and compiles them.

mod commands;
mod summary;

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
