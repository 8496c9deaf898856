mod cmd;
mod config;
mod error;

use clap::Parser;
use config::{Cli, Commands, Effective};

use bench_core::Strategy;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let eff = match Effective::new(&cli) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let result = match &cli.command {
        Commands::Single(args) => cmd::run::run(&eff, Strategy::Single, args).await,
        Commands::Pool(args) => cmd::run::run(&eff, Strategy::Pool, args).await,
        Commands::Batch(args) => cmd::run::run(&eff, Strategy::Batch, args).await,
        Commands::UltraFast(args) => cmd::run::run(&eff, Strategy::UltraFast, args).await,
        Commands::UltraBatch(args) => cmd::run::run(&eff, Strategy::UltraBatch, args).await,
        Commands::Suite(args) => cmd::suite::run(&eff, args).await,
    };
    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
