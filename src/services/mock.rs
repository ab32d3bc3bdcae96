//! Recording fakes for the platform and media-source seams.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use crate::services::media::{MediaSource, MediaUploadError};
use crate::services::platform::PlatformApi;
use crate::services::twitter::{TokenResponse, TwitterError};

#[derive(Debug, Clone)]
pub struct PublishCall {
    pub text: String,
    pub in_reply_to: Option<String>,
    pub media_ids: Vec<String>,
}

/// Records every call and replays scripted results. Unscripted uploads
/// and publishes succeed with sequential ids (`media-1`, `tweet-1`, ...).
#[derive(Default)]
pub struct MockPlatform {
    pub refresh_calls: Mutex<Vec<String>>,
    pub refresh_response: Mutex<Option<Result<TokenResponse, String>>>,
    pub upload_calls: Mutex<Vec<String>>,
    pub upload_results: Mutex<VecDeque<Result<String, TwitterError>>>,
    pub publish_calls: Mutex<Vec<PublishCall>>,
    pub publish_results: Mutex<VecDeque<Result<String, TwitterError>>>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_refresh_response(&self, response: Result<TokenResponse, String>) {
        *self.refresh_response.lock().unwrap() = Some(response);
    }

    pub fn script_upload(&self, result: Result<String, TwitterError>) {
        self.upload_results.lock().unwrap().push_back(result);
    }

    pub fn script_publish(&self, result: Result<String, TwitterError>) {
        self.publish_results.lock().unwrap().push_back(result);
    }
}

#[async_trait]
impl PlatformApi for MockPlatform {
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, TwitterError> {
        self.refresh_calls
            .lock()
            .unwrap()
            .push(refresh_token.to_string());
        match self.refresh_response.lock().unwrap().as_ref() {
            Some(Ok(token)) => Ok(token.clone()),
            Some(Err(detail)) => Err(TwitterError::Api(detail.clone())),
            None => Err(TwitterError::Api("no refresh scripted".to_string())),
        }
    }

    async fn upload_media(
        &self,
        _access_token: &str,
        _data: &[u8],
        media_type: &str,
    ) -> Result<String, TwitterError> {
        let call_count = {
            let mut calls = self.upload_calls.lock().unwrap();
            calls.push(media_type.to_string());
            calls.len()
        };
        match self.upload_results.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok(format!("media-{}", call_count)),
        }
    }

    async fn post_tweet(
        &self,
        _access_token: &str,
        text: &str,
        in_reply_to: Option<&str>,
        media_ids: &[String],
    ) -> Result<String, TwitterError> {
        let call_count = {
            let mut calls = self.publish_calls.lock().unwrap();
            calls.push(PublishCall {
                text: text.to_string(),
                in_reply_to: in_reply_to.map(str::to_string),
                media_ids: media_ids.to_vec(),
            });
            calls.len()
        };
        match self.publish_results.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok(format!("tweet-{}", call_count)),
        }
    }
}

/// Serves canned bytes for any URL not listed in `fail_urls`.
#[derive(Default)]
pub struct MockMediaSource {
    pub fetch_calls: Mutex<Vec<String>>,
    pub fail_urls: Mutex<Vec<String>>,
}

impl MockMediaSource {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MediaSource for MockMediaSource {
    async fn fetch(&self, url: &str) -> Result<Bytes, MediaUploadError> {
        self.fetch_calls.lock().unwrap().push(url.to_string());
        if self.fail_urls.lock().unwrap().iter().any(|u| u == url) {
            return Err(MediaUploadError::Fetch {
                url: url.to_string(),
                detail: "status 404".to_string(),
            });
        }
        Ok(Bytes::from_static(b"fake-bytes"))
    }
}
