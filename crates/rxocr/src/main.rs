//! rxocr: read handwritten prescriptions from photos.

mod cli;
mod ipc_client;
mod output;
mod session_manager;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    // Logs go to stderr; stdout carries the recognized text
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    use output::Output;

    let output = Output::new(cli.json);

    match cli.command {
        Some(Commands::Session(ref args)) => {
            cli::commands::session::run(&cli, args, &output).await
        }
        None => cli::commands::recognize::run(&cli, &output).await,
    }
}
