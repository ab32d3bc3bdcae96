//! Thread publishing: each block replies to the one before it.

use tracing::debug;

use crate::domain::posts::models::ThreadBlock;
use crate::services::media::MediaSource;
use crate::services::platform::PlatformApi;

use super::{DispatchError, collect_media_handles};

/// Publish blocks in order, chaining each tweet to the previous one.
/// The first block falls back to `initial_media` when it has no images
/// of its own. A failed block aborts the rest; already-published tweets
/// stay up, there is no rollback.
pub(crate) async fn publish_thread(
    platform: &dyn PlatformApi,
    media: &dyn MediaSource,
    access_token: &str,
    blocks: &[ThreadBlock],
    initial_media: &[String],
    post_id: i64,
) -> Result<String, DispatchError> {
    let mut first_id: Option<String> = None;
    let mut previous_id: Option<String> = None;

    for (index, block) in blocks.iter().enumerate() {
        let handles = if !block.images.is_empty() {
            collect_media_handles(platform, media, access_token, &block.images, post_id).await?
        } else if index == 0 {
            initial_media.to_vec()
        } else {
            Vec::new()
        };

        let tweet_id = platform
            .post_tweet(access_token, &block.text, previous_id.as_deref(), &handles)
            .await?;

        debug!(post_id, block = index, %tweet_id, "thread block published");

        if first_id.is_none() {
            first_id = Some(tweet_id.clone());
        }
        previous_id = Some(tweet_id);
    }

    first_id.ok_or(DispatchError::EmptyThread)
}
