//! GitHub release lookup and asset download streams

use super::error::{Result, UpdateError};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const RELEASES_URL: &str = "https://api.github.com/repos/roflmao/mac2mqtt/releases/latest";
pub const CHECK_TIMEOUT: Duration = Duration::from_secs(30);
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Asset {
    pub name: String,
    pub browser_download_url: String,
    pub size: u64,
}

impl Release {
    pub fn find_asset(&self, name: &str) -> Option<&Asset> {
        self.assets.iter().find(|a| a.name == name)
    }
}

/// Body of an asset download, read chunk by chunk
#[async_trait]
pub trait AssetStream: Send {
    /// Length announced by the server, if any
    fn content_length(&self) -> Option<u64>;

    async fn next_chunk(&mut self) -> Result<Option<Bytes>>;
}

/// Where releases come from.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    async fn latest_release(&self) -> Result<Release>;

    async fn open_asset(&self, asset: &Asset) -> Result<Box<dyn AssetStream>>;
}

/// The public GitHub releases API
#[derive(Clone)]
pub struct GithubReleases {
    client: Client,
    url: String,
}

impl GithubReleases {
    pub fn new(version: &str) -> Result<Self> {
        Self::with_url(version, RELEASES_URL)
    }

    pub fn with_url(version: &str, url: impl Into<String>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github.v3+json"),
        );

        // GitHub rejects requests without a User-Agent
        let client = Client::builder()
            .user_agent(format!("mac2mqtt/{}", version))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ReleaseSource for GithubReleases {
    async fn latest_release(&self) -> Result<Release> {
        let response = self
            .client
            .get(&self.url)
            .timeout(CHECK_TIMEOUT)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(UpdateError::ApiStatus(response.status().as_u16()));
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn open_asset(&self, asset: &Asset) -> Result<Box<dyn AssetStream>> {
        let response = self
            .client
            .get(&asset.browser_download_url)
            .timeout(DOWNLOAD_TIMEOUT)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(UpdateError::DownloadStatus(response.status().as_u16()));
        }

        Ok(Box::new(HttpAssetStream { response }))
    }
}

struct HttpAssetStream {
    response: Response,
}

#[async_trait]
impl AssetStream for HttpAssetStream {
    fn content_length(&self) -> Option<u64> {
        self.response.content_length()
    }

    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        Ok(self.response.chunk().await?)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves one release and fixed asset bytes from memory
    pub struct MemoryReleases {
        pub release: Release,
        pub body: Vec<u8>,
        pub announced: Option<u64>,
        pub chunk_size: usize,
        pub opened: AtomicUsize,
    }

    impl MemoryReleases {
        pub fn new(tag: &str, asset_name: &str, body: &[u8]) -> Self {
            Self {
                release: Release {
                    tag_name: tag.to_string(),
                    name: Some(tag.to_string()),
                    draft: false,
                    prerelease: false,
                    assets: vec![Asset {
                        name: asset_name.to_string(),
                        browser_download_url: format!("https://example.invalid/{}", asset_name),
                        size: body.len() as u64,
                    }],
                },
                body: body.to_vec(),
                announced: Some(body.len() as u64),
                chunk_size: 4,
                opened: AtomicUsize::new(0),
            }
        }

        pub fn opened(&self) -> usize {
            self.opened.load(Ordering::SeqCst)
        }
    }

    pub struct MemoryStream {
        chunks: VecDeque<Bytes>,
        announced: Option<u64>,
    }

    #[async_trait]
    impl AssetStream for MemoryStream {
        fn content_length(&self) -> Option<u64> {
            self.announced
        }

        async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
            Ok(self.chunks.pop_front())
        }
    }

    #[async_trait]
    impl ReleaseSource for MemoryReleases {
        async fn latest_release(&self) -> Result<Release> {
            Ok(self.release.clone())
        }

        async fn open_asset(&self, _asset: &Asset) -> Result<Box<dyn AssetStream>> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            let chunks = self
                .body
                .chunks(self.chunk_size.max(1))
                .map(Bytes::copy_from_slice)
                .collect();
            Ok(Box::new(MemoryStream {
                chunks,
                announced: self.announced,
            }))
        }
    }
}
