//! Fetch media from storage URLs and push it to the platform.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use thiserror::Error;

use crate::domain::posts::models::MediaRef;
use crate::services::platform::PlatformApi;
use crate::services::twitter::TwitterError;

#[derive(Debug, Error)]
pub enum MediaUploadError {
    #[error("failed to fetch media from {url}: {detail}")]
    Fetch { url: String, detail: String },
    #[error("failed to upload media from {url}: {source}")]
    Upload {
        url: String,
        #[source]
        source: TwitterError,
    },
}

impl MediaUploadError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, MediaUploadError::Upload { source, .. } if source.is_rate_limited())
    }
}

/// Where media bytes come from. Production uses HTTP against the storage
/// bucket's public URLs.
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes, MediaUploadError>;
}

pub struct HttpMediaSource {
    http: Client,
}

impl HttpMediaSource {
    pub fn new(http: Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl MediaSource for HttpMediaSource {
    async fn fetch(&self, url: &str) -> Result<Bytes, MediaUploadError> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| MediaUploadError::Fetch {
                url: url.to_string(),
                detail: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(MediaUploadError::Fetch {
                url: url.to_string(),
                detail: format!("status {}", status),
            });
        }

        resp.bytes().await.map_err(|e| MediaUploadError::Fetch {
            url: url.to_string(),
            detail: e.to_string(),
        })
    }
}

/// Fetch one attachment and upload it, returning the platform media id.
pub async fn upload_from_url(
    platform: &dyn PlatformApi,
    source: &dyn MediaSource,
    access_token: &str,
    media: &MediaRef,
) -> Result<String, MediaUploadError> {
    let data = source.fetch(&media.url).await?;

    platform
        .upload_media(access_token, &data, &media.mime_type)
        .await
        .map_err(|source| MediaUploadError::Upload {
            url: media.url.clone(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::mock::{MockMediaSource, MockPlatform};

    fn image(url: &str) -> MediaRef {
        MediaRef {
            url: url.to_string(),
            mime_type: "image/png".to_string(),
            name: None,
            size: None,
        }
    }

    #[tokio::test]
    async fn fetch_failure_never_reaches_platform() {
        let platform = MockPlatform::new();
        let source = MockMediaSource::new();
        source.fail_urls.lock().unwrap().push("https://cdn/bad.png".to_string());

        let err = upload_from_url(&platform, &source, "token", &image("https://cdn/bad.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaUploadError::Fetch { .. }));
        assert!(platform.upload_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rate_limited_upload_is_detectable() {
        let platform = MockPlatform::new();
        platform.script_upload(Err(TwitterError::RateLimited("429".to_string())));
        let source = MockMediaSource::new();

        let err = upload_from_url(&platform, &source, "token", &image("https://cdn/ok.png"))
            .await
            .unwrap_err();
        assert!(err.is_rate_limited());
    }

    #[tokio::test]
    async fn successful_upload_returns_platform_handle() {
        let platform = MockPlatform::new();
        let source = MockMediaSource::new();

        let id = upload_from_url(&platform, &source, "token", &image("https://cdn/ok.png"))
            .await
            .unwrap();
        assert_eq!(id, "media-1");
        assert_eq!(
            source.fetch_calls.lock().unwrap().as_slice(),
            ["https://cdn/ok.png"]
        );
    }
}
