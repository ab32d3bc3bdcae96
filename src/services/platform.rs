//! Platform API seam between the dispatch engine and the concrete client

use async_trait::async_trait;

use super::twitter::{TokenResponse, TwitterError};

/// Outbound platform operations the dispatch pipeline depends on.
///
/// `TwitterClient` is the production implementation; tests drive the
/// pipeline through a recording mock instead.
#[async_trait]
pub trait PlatformApi: Send + Sync {
    /// Exchange a refresh token for a new token pair.
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, TwitterError>;

    /// Upload one media object, returning the opaque platform media id.
    async fn upload_media(
        &self,
        access_token: &str,
        data: &[u8],
        media_type: &str,
    ) -> Result<String, TwitterError>;

    /// Publish one unit of content, optionally as a reply, returning the
    /// remote post id.
    async fn post_tweet(
        &self,
        access_token: &str,
        text: &str,
        in_reply_to: Option<&str>,
        media_ids: &[String],
    ) -> Result<String, TwitterError>;
}
