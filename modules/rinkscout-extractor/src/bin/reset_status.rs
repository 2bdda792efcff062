//! Deletes the extraction status file so the next run starts from a
//! clean slate. Output files are left alone.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use rinkscout_common::OutputPaths;
use rinkscout_extractor::status::StatusStore;

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("rinkscout=info".parse()?))
        .init();

    let paths = OutputPaths::from_env();
    StatusStore::reset(&paths.extractor_status)?;

    Ok(())
}
