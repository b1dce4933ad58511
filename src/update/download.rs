//! Verified asset download
//!
//! The asset is streamed into a private temporary file. The size the release
//! declares is checked against the announced `Content-Length`, while writing,
//! and once more at the end. The file only becomes executable after all three
//! agree. Any failure drops the [`TempPath`] which removes the file.

use super::error::{Result, UpdateError};
use super::release::{Asset, ReleaseSource};
use std::path::Path;
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tracing::info;

pub const TEMP_PREFIX: &str = "mac2mqtt-update-";

/// A verified download waiting to be installed
#[derive(Debug)]
pub struct PendingUpdate {
    path: TempPath,
    bytes: u64,
}

impl PendingUpdate {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn into_temp_path(self) -> TempPath {
        self.path
    }
}

pub async fn download(
    source: &dyn ReleaseSource,
    asset: &Asset,
    dir: &Path,
) -> Result<PendingUpdate> {
    info!(
        "Downloading update from {} ({} bytes)",
        asset.browser_download_url, asset.size
    );

    let mut stream = source.open_asset(asset).await?;
    match stream.content_length() {
        Some(announced) if announced > 0 && announced != asset.size => {
            return Err(UpdateError::SizeMismatch {
                expected: asset.size,
                announced,
            });
        }
        _ => {}
    }

    let (file, path) = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .tempfile_in(dir)?
        .into_parts();
    let mut file = tokio::fs::File::from_std(file);

    let mut written: u64 = 0;
    while let Some(chunk) = stream.next_chunk().await? {
        written += chunk.len() as u64;
        if written > asset.size {
            return Err(UpdateError::Oversized {
                expected: asset.size,
            });
        }
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    if written != asset.size {
        return Err(UpdateError::Incomplete {
            expected: asset.size,
            written,
        });
    }

    make_executable(&path).await?;

    info!("Downloaded {} bytes to {}", written, path.display());
    Ok(PendingUpdate {
        path,
        bytes: written,
    })
}

#[cfg(unix)]
pub(crate) async fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).await
}

#[cfg(not(unix))]
pub(crate) async fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
