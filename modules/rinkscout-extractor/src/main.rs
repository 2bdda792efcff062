use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rinkscout_common::Config;
use rinkscout_extractor::{extractor::RecentExtractor, session::Session};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("rinkscout=info".parse()?))
        .init();

    info!("Rinkscout extractor starting...");

    let config = Config::extractor_from_env()?;
    let session = Session::establish(&config).await?;

    let extractor = RecentExtractor::new(config, session);
    let stats = extractor.run().await?;
    info!("Extraction run complete. {stats}");

    Ok(())
}
