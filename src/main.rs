use anyhow::Result;
use rustylang::cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let cli = <Cli as clap::Parser>::parse();

    match cli.command {
        Commands::Translate(args) => rustylang::cli::handle_translate(args).await,
        Commands::Glossary(args) => rustylang::cli::handle_glossary(args).await,
    }
}
