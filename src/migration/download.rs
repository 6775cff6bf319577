//! Streaming asset downloads.
//!
//! Bytes go to a temporary file beside the destination and are renamed into
//! place once the body is complete, so a partial download is never visible
//! under the final path. No retries happen here.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use sha2::{Digest, Sha256};
use tracing::debug;
use url::Url;

use super::atomic::AtomicFile;
use crate::source_api::HttpClient;

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("download failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} downloading {url}")]
    Status { status: u16, url: String },

    #[error("cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid asset URL: {0}")]
    InvalidUrl(String),
}

impl DownloadError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) | Self::Io { .. } => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::InvalidUrl(_) => false,
        }
    }
}

/// What was stored by a successful download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedAsset {
    pub bytes: u64,
    /// Hex SHA-256 of the stored file.
    pub content_hash: String,
    pub content_type: Option<String>,
}

/// Fetches a binary resource into a local file.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn download(&self, url: &str, dest: &Path) -> Result<DownloadedAsset, DownloadError>;
}

/// [`AssetFetcher`] over HTTP.
#[derive(Clone)]
pub struct HttpAssetDownloader {
    client: HttpClient,
}

impl HttpAssetDownloader {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AssetFetcher for HttpAssetDownloader {
    async fn download(&self, url: &str, dest: &Path) -> Result<DownloadedAsset, DownloadError> {
        let parsed = Url::parse(url).map_err(|e| DownloadError::InvalidUrl(format!("{url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(DownloadError::InvalidUrl(url.to_string()));
        }

        let response = self.client.get(url).await?;
        if !response.is_success() {
            return Err(DownloadError::Status {
                status: response.status.as_u16(),
                url: url.to_string(),
            });
        }

        let content_type = response.content_type().map(str::to_string);
        let (bytes, content_hash) = write_stream(dest, response.bytes_stream()).await?;
        debug!("Downloaded {} ({} bytes) to {}", url, bytes, dest.display());

        Ok(DownloadedAsset {
            bytes,
            content_hash,
            content_type,
        })
    }
}

/// Write a byte stream to `dest` atomically. Returns size and hex SHA-256.
pub async fn write_stream<S, B, E>(dest: &Path, stream: S) -> Result<(u64, String), DownloadError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<DownloadError>,
{
    let io_error = |source| DownloadError::Io {
        path: dest.to_path_buf(),
        source,
    };

    let mut file = AtomicFile::create(dest).await.map_err(io_error)?;
    let mut hasher = Sha256::new();
    let mut total = 0u64;

    futures::pin_mut!(stream);
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(Into::into)?;
        let chunk = chunk.as_ref();
        hasher.update(chunk);
        total += chunk.len() as u64;
        file.write_all(chunk).await.map_err(io_error)?;
    }

    file.commit().await.map_err(io_error)?;
    Ok((total, hex::encode(hasher.finalize())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[tokio::test]
    async fn test_write_stream_hashes_and_places_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("2024/05/photo.jpg");
        let chunks = stream::iter(vec![
            Ok::<_, DownloadError>(b"hello ".to_vec()),
            Ok(b"world".to_vec()),
        ]);

        let (bytes, hash) = write_stream(&dest, chunks).await.unwrap();
        assert_eq!(bytes, 11);
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn test_failed_stream_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("asset.bin");
        let chunks = stream::iter(vec![
            Ok(b"partial".to_vec()),
            Err(DownloadError::Status {
                status: 500,
                url: "https://old.example/a.bin".into(),
            }),
        ]);

        assert!(write_stream(&dest, chunks).await.is_err());
        assert!(!dest.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_rejects_non_http_urls() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = HttpAssetDownloader::new(HttpClient::new(
            std::time::Duration::from_secs(1),
            std::time::Duration::ZERO,
        ));
        let err = downloader
            .download("file:///etc/passwd", &dir.path().join("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::InvalidUrl(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_retryable_classification() {
        let status = |status| DownloadError::Status {
            status,
            url: String::new(),
        };
        assert!(status(502).is_retryable());
        assert!(!status(404).is_retryable());
        assert!(!status(403).is_retryable());
    }
}
