use std::process::ExitCode;

use anyhow::Result;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use rinkscout_common::{Config, RinkscoutError, WrappedArrayFile};
use rinkscout_uploader::{lock::RunLock, uploader::BatchUploader};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    if let Err(e) = init_logging() {
        eprintln!("logging init failed: {e}");
        return ExitCode::from(1);
    }

    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(RinkscoutError::ResourceExhausted(msg)) => {
            error!("{msg}");
            ExitCode::from(137)
        }
        Err(e) => {
            error!("{e}");
            ExitCode::from(1)
        }
    }
}

fn init_logging() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("rinkscout=info".parse()?))
        .init();
    Ok(())
}

async fn run() -> Result<bool, RinkscoutError> {
    info!("Rinkscout uploader starting...");

    let config = Config::uploader_from_env()?;

    // Only a run that finished cleanly leaves the marker behind.
    if !config.paths.success_marker.exists() {
        return Err(RinkscoutError::Upload(format!(
            "extraction success marker {} not found, refusing to upload a partial data set",
            config.paths.success_marker.display()
        )));
    }

    let input_bytes = std::fs::metadata(&config.paths.players_data)
        .map(|m| m.len())
        .unwrap_or(0);
    if input_bytes > config.upload_max_input_bytes {
        return Err(RinkscoutError::ResourceExhausted(format!(
            "{} is {input_bytes} bytes, over the {} byte cap; split the export or raise UPLOAD_MAX_INPUT_BYTES",
            config.paths.players_data.display(),
            config.upload_max_input_bytes
        )));
    }

    let mut lock = RunLock::acquire(&config.paths.uploader_lock, &config.paths.uploader_pid)?;

    let records = WrappedArrayFile::new(&config.paths.players_data).load();
    if records.is_empty() {
        warn!(path = %config.paths.players_data.display(), "No records to upload");
        lock.release();
        return Ok(true);
    }

    let uploader = BatchUploader::new(&config)?;
    let stats = tokio::select! {
        result = uploader.upload(records) => result?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, releasing lock");
            lock.release();
            return Err(RinkscoutError::Upload("upload interrupted".to_string()));
        }
    };
    lock.release();

    info!("Upload run complete. {stats}");
    Ok(stats.is_success())
}
