//! X API v2 client: token refresh, chunked media upload, tweet publishing

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use super::platform::PlatformApi;

const TOKEN_URL: &str = "https://api.x.com/2/oauth2/token";
const TWEETS_URL: &str = "https://api.x.com/2/tweets";
const MEDIA_UPLOAD_BASE: &str = "https://api.x.com/2/media/upload";

/// APPEND segment size (1MB)
const CHUNK_SIZE: usize = 1024 * 1024;

/// Total time allowed for async media processing before the upload is
/// abandoned
const PROCESSING_MAX_WAIT: Duration = Duration::from_secs(300);

/// Fallback STATUS poll interval when the platform gives no hint
const PROCESSING_POLL_SECS: u64 = 5;

#[derive(Debug, Error)]
pub enum TwitterError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Twitter API error: {0}")]
    Api(String),
    #[error("Twitter API rate limited: {0}")]
    RateLimited(String),
}

impl TwitterError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, TwitterError::RateLimited(_))
    }

    fn from_response(status: StatusCode, body: String) -> Self {
        if status == StatusCode::TOO_MANY_REQUESTS {
            TwitterError::RateLimited(body)
        } else {
            TwitterError::Api(format!("Status {}: {}", status, body))
        }
    }
}

/// Token endpoint response. The platform may or may not rotate the
/// refresh token.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: i64,
}

#[derive(Clone)]
pub struct TwitterClient {
    client_id: String,
    client_secret: String,
    http: Client,
}

impl TwitterClient {
    pub fn new(client_id: &str, client_secret: &str, timeout: Duration) -> Self {
        Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            http: Client::builder()
                .timeout(timeout)
                .build()
                .expect("Failed to build HTTP client"),
        }
    }

    /// Build Basic auth header for OAuth token requests
    fn basic_auth_header(&self) -> String {
        let credentials = format!("{}:{}", self.client_id, self.client_secret);
        format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(credentials)
        )
    }

    /// Refresh an access token
    pub async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenResponse, TwitterError> {
        let params = [
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
        ];

        let resp = self
            .http
            .post(TOKEN_URL)
            .header("Authorization", self.basic_auth_header())
            .header("Content-Type", "application/x-www-form-urlencoded")
            .form(&params)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await?;
            return Err(TwitterError::from_response(status, text));
        }

        let token: TokenResponse = resp.json().await?;
        Ok(token)
    }

    /// Publish a tweet.
    ///
    /// # Arguments
    /// * `access_token` - OAuth 2.0 bearer token for the user
    /// * `text` - The tweet text content
    /// * `in_reply_to` - If posting as part of a thread, the remote id of the previous tweet
    /// * `media_ids` - Platform media ids (uploaded via `upload_media_chunked`)
    pub async fn publish_tweet(
        &self,
        access_token: &str,
        text: &str,
        in_reply_to: Option<&str>,
        media_ids: &[String],
    ) -> Result<String, TwitterError> {
        let body = tweet_payload(text, in_reply_to, media_ids);

        let resp = self
            .http
            .post(TWEETS_URL)
            .header("Authorization", format!("Bearer {}", access_token))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await?;
            return Err(TwitterError::from_response(status, text));
        }

        let wrapper: TweetResponseWrapper = resp.json().await?;
        Ok(wrapper.data.id)
    }

    /// Upload media using the chunked INIT/APPEND/FINALIZE protocol.
    /// Works for any media type; required for video.
    pub async fn upload_media_chunked(
        &self,
        access_token: &str,
        data: &[u8],
        media_type: &str,
    ) -> Result<String, TwitterError> {
        // The v2 API doesn't accept video/quicktime, map to mp4
        let media_type = if media_type == "video/quicktime" {
            "video/mp4"
        } else {
            media_type
        };

        let media_category = if media_type.starts_with("video/") {
            "tweet_video"
        } else if media_type == "image/gif" {
            "tweet_gif"
        } else {
            "tweet_image"
        };

        debug!(
            media_type,
            total_bytes = data.len(),
            media_category,
            "media upload INIT"
        );

        let init_body = serde_json::json!({
            "media_type": media_type,
            "total_bytes": data.len(),
            "media_category": media_category
        });

        let resp = self
            .http
            .post(format!("{}/initialize", MEDIA_UPLOAD_BASE))
            .header("Authorization", format!("Bearer {}", access_token))
            .header("Content-Type", "application/json")
            .json(&init_body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(TwitterError::from_response(
                status,
                format!("INIT failed: {}", text),
            ));
        }

        let init_response: MediaUploadResponse = serde_json::from_str(&text).map_err(|e| {
            TwitterError::Api(format!("Failed to parse INIT response: {} - body: {}", e, text))
        })?;
        let media_id = init_response.data.id;

        for (segment_index, chunk) in data.chunks(CHUNK_SIZE).enumerate() {
            let part = reqwest::multipart::Part::bytes(chunk.to_vec())
                .mime_str(media_type)
                .map_err(|e| TwitterError::Api(format!("Invalid mime type: {}", e)))?;

            let append_form = reqwest::multipart::Form::new()
                .text("segment_index", segment_index.to_string())
                .part("media", part);

            let resp = self
                .http
                .post(format!("{}/{}/append", MEDIA_UPLOAD_BASE, media_id))
                .header("Authorization", format!("Bearer {}", access_token))
                .multipart(append_form)
                .send()
                .await?;

            let status = resp.status();
            if !status.is_success() {
                let text = resp.text().await?;
                return Err(TwitterError::from_response(
                    status,
                    format!("APPEND failed at segment {}: {}", segment_index, text),
                ));
            }
        }

        let resp = self
            .http
            .post(format!("{}/{}/finalize", MEDIA_UPLOAD_BASE, media_id))
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(TwitterError::from_response(
                status,
                format!("FINALIZE failed: {}", text),
            ));
        }

        let finalize_response: MediaUploadResponse = serde_json::from_str(&text).map_err(|e| {
            TwitterError::Api(format!(
                "Failed to parse FINALIZE response: {} - body: {}",
                e, text
            ))
        })?;

        if let Some(ref processing_info) = finalize_response.data.processing_info
            && processing_info.state != "succeeded"
        {
            self.wait_for_processing(access_token, &media_id).await?;
        }

        debug!(%media_id, "media upload complete");
        Ok(media_id)
    }

    /// Poll the STATUS endpoint until processing completes, bounded by
    /// `PROCESSING_MAX_WAIT` so a stuck upload cannot stall a dispatch run
    async fn wait_for_processing(
        &self,
        access_token: &str,
        media_id: &str,
    ) -> Result<(), TwitterError> {
        let url = format!("{}?command=STATUS&media_id={}", MEDIA_UPLOAD_BASE, media_id);
        let started = std::time::Instant::now();

        loop {
            let resp = self
                .http
                .get(&url)
                .header("Authorization", format!("Bearer {}", access_token))
                .send()
                .await?;

            let status = resp.status();
            let text = resp.text().await?;
            if !status.is_success() {
                return Err(TwitterError::from_response(
                    status,
                    format!("STATUS check failed: {}", text),
                ));
            }

            let status_response: MediaUploadResponse = serde_json::from_str(&text).map_err(|e| {
                TwitterError::Api(format!(
                    "Failed to parse STATUS response: {} - body: {}",
                    e, text
                ))
            })?;

            match next_poll_step(
                status_response.data.processing_info.as_ref(),
                started.elapsed(),
            )? {
                PollStep::Ready => return Ok(()),
                PollStep::Wait(delay) => tokio::time::sleep(delay).await,
            }
        }
    }
}

#[derive(Debug)]
enum PollStep {
    Ready,
    Wait(Duration),
}

/// Decide what the poll loop does next from one STATUS response
fn next_poll_step(
    info: Option<&MediaProcessingInfo>,
    elapsed: Duration,
) -> Result<PollStep, TwitterError> {
    // No processing_info means it's done
    let Some(info) = info else {
        return Ok(PollStep::Ready);
    };

    match info.state.as_str() {
        "succeeded" => Ok(PollStep::Ready),
        "failed" => Err(TwitterError::Api("Media processing failed".to_string())),
        _ => {
            if elapsed >= PROCESSING_MAX_WAIT {
                return Err(TwitterError::Api(format!(
                    "Media processing timed out after {}s",
                    elapsed.as_secs()
                )));
            }
            let wait_secs = info
                .check_after_secs
                .map(|s| s as u64)
                .unwrap_or(PROCESSING_POLL_SECS);
            Ok(PollStep::Wait(Duration::from_secs(wait_secs)))
        }
    }
}

/// Build the publish body. The media key is only present for a non-empty
/// handle list; the reply key only when chaining into a thread.
pub(crate) fn tweet_payload(
    text: &str,
    in_reply_to: Option<&str>,
    media_ids: &[String],
) -> serde_json::Value {
    let mut body = serde_json::json!({ "text": text });

    if let Some(parent_id) = in_reply_to {
        body["reply"] = serde_json::json!({
            "in_reply_to_tweet_id": parent_id
        });
    }

    if !media_ids.is_empty() {
        body["media"] = serde_json::json!({
            "media_ids": media_ids
        });
    }

    body
}

#[async_trait]
impl PlatformApi for TwitterClient {
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, TwitterError> {
        self.refresh_access_token(refresh_token).await
    }

    async fn upload_media(
        &self,
        access_token: &str,
        data: &[u8],
        media_type: &str,
    ) -> Result<String, TwitterError> {
        self.upload_media_chunked(access_token, data, media_type).await
    }

    async fn post_tweet(
        &self,
        access_token: &str,
        text: &str,
        in_reply_to: Option<&str>,
        media_ids: &[String],
    ) -> Result<String, TwitterError> {
        self.publish_tweet(access_token, text, in_reply_to, media_ids).await
    }
}

#[derive(Debug, Deserialize)]
struct MediaUploadResponse {
    data: MediaUploadData,
}

#[derive(Debug, Deserialize)]
struct MediaUploadData {
    id: String,
    processing_info: Option<MediaProcessingInfo>,
}

#[derive(Debug, Deserialize)]
struct MediaProcessingInfo {
    state: String,
    check_after_secs: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct TweetResponseWrapper {
    data: TweetData,
}

#[derive(Debug, Deserialize)]
struct TweetData {
    id: String,
}
