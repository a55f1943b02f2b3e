mod asset;
mod cli;
mod config;
mod download;
mod error;
mod extract;
mod period;
mod pipeline;
mod projection;
mod raster;
mod region;

use anyhow::Result;
use clap::Parser;
use cli::{command, Cli, Commands};
use tracing::info;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting CHIRPS clipper");

    let summary = match cli.command {
        Commands::Monthly {
            start_year,
            end_year,
            options,
        } => command::monthly(start_year, end_year, options).await?,
        Commands::Daily {
            start_date,
            end_date,
            options,
        } => command::daily(start_date, end_date, options).await?,
    };

    println!("{}", summary);
    if summary.failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}
