//! Dispatch run: claim due posts, publish each, record the outcome.

mod thread;

use std::sync::Arc;

use serde::Serialize;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::constants::{CLAIM_BATCH_SIZE, MAX_MEDIA_PER_POST};
use crate::domain::posts::models::{MediaRef, Post, PostBody};
use crate::domain::posts::queries;
use crate::services::auth::{self, AuthError};
use crate::services::media::{self, MediaSource};
use crate::services::platform::PlatformApi;
use crate::services::twitter::TwitterError;

/// What to do with a failed post. Failed posts currently stay failed;
/// re-queueing is an operator action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    None,
}

#[derive(Clone)]
pub struct DispatchContext {
    pub db: PgPool,
    pub platform: Arc<dyn PlatformApi>,
    pub media: Arc<dyn MediaSource>,
    pub retry_policy: RetryPolicy,
    pub lease_seconds: i64,
}

#[derive(Debug, Default, Serialize)]
pub struct RunSummary {
    pub selected: usize,
    pub posted: usize,
    pub failed: usize,
    pub halted: bool,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{0}")]
    Auth(#[from] AuthError),
    #[error("publish failed: {0}")]
    Publish(#[from] TwitterError),
    #[error("media upload rate limited: {0}")]
    MediaRateLimited(String),
    #[error("thread has no blocks")]
    EmptyThread,
}

impl DispatchError {
    /// Rate limiting affects the whole account, so one limited post
    /// stops the rest of the run.
    fn halts_run(&self) -> bool {
        match self {
            DispatchError::Publish(e) => e.is_rate_limited(),
            DispatchError::MediaRateLimited(_) => true,
            _ => false,
        }
    }
}

/// Execute one dispatch run over everything currently due.
pub async fn run(ctx: &DispatchContext) -> Result<RunSummary, sqlx::Error> {
    let posts = queries::claim_due_posts(&ctx.db, CLAIM_BATCH_SIZE, ctx.lease_seconds).await?;

    let mut summary = RunSummary {
        selected: posts.len(),
        ..Default::default()
    };

    if posts.is_empty() {
        info!("no due posts");
        return Ok(summary);
    }

    info!(count = posts.len(), "claimed due posts");

    let mut remaining = posts.into_iter();
    while let Some(post) = remaining.next() {
        let outcome = dispatch_one(ctx, &post).await;

        match &outcome {
            Ok(twitter_id) => {
                match queries::mark_posted(&ctx.db, post.id, twitter_id).await {
                    Ok(true) => {
                        info!(post_id = post.id, %twitter_id, "post published");
                        summary.posted += 1;
                    }
                    Ok(false) => {
                        warn!(post_id = post.id, "post already finalized by another run");
                    }
                    Err(e) => {
                        error!(post_id = post.id, "failed to record posted status: {}", e);
                    }
                }
            }
            Err(e) => {
                let detail = e.to_string();
                match queries::mark_failed(&ctx.db, post.id, &detail).await {
                    Ok(true) => {
                        warn!(post_id = post.id, "post failed: {}", detail);
                        summary.failed += 1;
                    }
                    Ok(false) => {
                        warn!(post_id = post.id, "post already finalized by another run");
                    }
                    Err(db_err) => {
                        error!(post_id = post.id, "failed to record failure: {}", db_err);
                    }
                }
            }
        }

        if let Err(e) = &outcome
            && e.halts_run()
        {
            summary.halted = true;
            let leftover: Vec<i64> = remaining.by_ref().map(|p| p.id).collect();
            if !leftover.is_empty() {
                warn!(
                    released = leftover.len(),
                    "rate limited, releasing remaining claims"
                );
                if let Err(db_err) = queries::release_claims(&ctx.db, &leftover).await {
                    error!("failed to release claims: {}", db_err);
                }
            }
            break;
        }
    }

    match ctx.retry_policy {
        RetryPolicy::None => {}
    }

    Ok(summary)
}

async fn dispatch_one(ctx: &DispatchContext, post: &Post) -> Result<String, DispatchError> {
    let access_token =
        auth::ensure_valid_access_token(&ctx.db, ctx.platform.as_ref(), post.user_id).await?;
    dispatch_post(
        ctx.platform.as_ref(),
        ctx.media.as_ref(),
        &access_token,
        post,
    )
    .await
}

/// Publish a single post, returning the remote id of the (first) tweet.
pub(crate) async fn dispatch_post(
    platform: &dyn PlatformApi,
    media: &dyn MediaSource,
    access_token: &str,
    post: &Post,
) -> Result<String, DispatchError> {
    match &*post.body {
        PostBody::Simple { text, media: refs } | PostBody::CarouselOnly { text, media: refs } => {
            let handles =
                collect_media_handles(platform, media, access_token, refs, post.id).await?;
            let id = platform
                .post_tweet(access_token, text, None, &handles)
                .await?;
            Ok(id)
        }
        PostBody::Thread { blocks, media: refs } => {
            let initial =
                collect_media_handles(platform, media, access_token, refs, post.id).await?;
            thread::publish_thread(platform, media, access_token, blocks, &initial, post.id).await
        }
    }
}

/// Upload attachments, capped at the platform limit. A failed upload is
/// logged and skipped so the post still goes out; a rate limit aborts.
pub(crate) async fn collect_media_handles(
    platform: &dyn PlatformApi,
    source: &dyn MediaSource,
    access_token: &str,
    refs: &[MediaRef],
    post_id: i64,
) -> Result<Vec<String>, DispatchError> {
    let mut handles = Vec::new();
    for media_ref in refs.iter().take(MAX_MEDIA_PER_POST) {
        match media::upload_from_url(platform, source, access_token, media_ref).await {
            Ok(id) => handles.push(id),
            Err(e) if e.is_rate_limited() => {
                return Err(DispatchError::MediaRateLimited(e.to_string()));
            }
            Err(e) => {
                warn!(
                    post_id,
                    url = %media_ref.url,
                    "media upload failed, continuing without it: {}",
                    e
                );
            }
        }
    }
    Ok(handles)
}
