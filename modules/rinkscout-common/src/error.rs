use thiserror::Error;

#[derive(Error, Debug)]
pub enum RinkscoutError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Upload error: {0}")]
    Upload(String),

    #[error("Uploader lock conflict: another upload run is in progress")]
    UploaderLockConflict,

    #[error("Resource exhaustion: {0}")]
    ResourceExhausted(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
