//! Historical backfill: sweeps the player search for every requested
//! position and birth year, appending new players to the CSV.

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rinkscout_common::Config;
use rinkscout_extractor::{search::SearchWalker, session::Session};

#[derive(Parser, Debug)]
#[command(about = "Sweep the player search by position and birth year")]
struct Args {
    /// Comma-separated position filters (f, d, g)
    #[arg(long, default_value = "f")]
    positions: String,

    /// First birth year to sweep
    #[arg(long, default_value_t = 1992)]
    from_year: i32,

    /// Last birth year to sweep (inclusive)
    #[arg(long, default_value_t = 2026)]
    to_year: i32,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("rinkscout=info".parse()?))
        .init();

    let args = Args::parse();
    let positions: Vec<String> = args
        .positions
        .split(',')
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect();

    info!("Rinkscout backfill starting...");

    let config = Config::extractor_from_env()?;
    let session = Session::establish(&config).await?;

    let mut walker = SearchWalker::new(config, session);
    let stats = walker
        .run_sweep(&positions, args.from_year, args.to_year)
        .await?;
    info!("Backfill complete. {stats}");

    Ok(())
}
