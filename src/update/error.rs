use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, UpdateError>;

/// Every failure aborts the current update attempt only.
#[derive(thiserror::Error, Debug)]
pub enum UpdateError {
    #[error("failed to fetch release info: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("GitHub API returned status {0}")]
    ApiStatus(u16),

    #[error("failed to decode release info: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("no binary found for platform {platform} (looking for {expected})")]
    NoAsset { platform: String, expected: String },

    #[error("download failed with status {0}")]
    DownloadStatus(u16),

    #[error("size mismatch: expected {expected} bytes, got {announced}")]
    SizeMismatch { expected: u64, announced: u64 },

    #[error("download exceeded the expected {expected} bytes")]
    Oversized { expected: u64 },

    #[error("incomplete download: expected {expected} bytes, got {written}")]
    Incomplete { expected: u64, written: u64 },

    #[error("no verified download to install")]
    NothingToInstall,

    #[error("failed to get executable path: {0}")]
    Executable(#[source] std::io::Error),

    #[error("insufficient permissions to update, cannot write to {dir}: {source}")]
    Permission {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create backup: {0}")]
    Backup(#[source] std::io::Error),

    #[error("failed to install new binary: {0}")]
    Install(#[source] std::io::Error),

    #[error("failed to install new binary and restore backup: {source} (restore error: {restore})")]
    Restore {
        #[source]
        source: std::io::Error,
        restore: std::io::Error,
    },

    #[error("filesystem operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("update task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
