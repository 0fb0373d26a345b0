//! Streaming download of release assets.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Download failures. Fatal for the current asset; the harvester's outer
/// loop logs them and moves on to the next independent asset.
#[derive(Error, Debug)]
pub enum DownloadError {
    /// HTTP-level failure (connect, status, body).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Local filesystem failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stream `url` into `dest_dir/filename`, returning the written path.
///
/// # Errors
///
/// [`DownloadError`] on any HTTP or filesystem failure; a partially
/// written file is left to the caller's scoped tempdir cleanup.
pub async fn download_to(
    client: &reqwest::Client,
    url: &str,
    dest_dir: &Path,
    filename: &str,
) -> Result<PathBuf, DownloadError> {
    let dest = dest_dir.join(filename);
    info!(url, dest = %dest.display(), "downloading");

    let response = client.get(url).send().await?.error_for_status()?;

    let mut file = File::create(&dest).await?;
    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        downloaded += chunk.len() as u64;
    }
    file.flush().await?;

    debug!(bytes = downloaded, "download complete");
    Ok(dest)
}
