//! Access-token resolution: reuse while valid, refresh once expired.

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use thiserror::Error;
use tracing::debug;

use crate::domain::users::{self, UserTokens};
use crate::services::platform::PlatformApi;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no credential found for user")]
    NotFound,
    #[error("access token expired and no refresh token is stored")]
    MissingRefreshToken,
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),
    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),
}

/// Outcome of resolving a token. `Refreshed` carries the new credential
/// so the caller can persist it.
#[derive(Debug)]
pub enum ResolvedToken {
    Cached(String),
    Refreshed(RefreshedCredential),
}

#[derive(Debug)]
pub struct RefreshedCredential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Decide whether stored credentials are still usable and refresh them if
/// not. When the platform does not rotate the refresh token, the stored
/// one is carried forward.
pub async fn resolve_access_token(
    platform: &dyn PlatformApi,
    tokens: &UserTokens,
    now: DateTime<Utc>,
) -> Result<ResolvedToken, AuthError> {
    if tokens.token_expires_at > now {
        return Ok(ResolvedToken::Cached(tokens.access_token.clone()));
    }

    let refresh_token = tokens
        .refresh_token
        .as_deref()
        .ok_or(AuthError::MissingRefreshToken)?;

    let response = platform
        .refresh_token(refresh_token)
        .await
        .map_err(|e| AuthError::RefreshFailed(e.to_string()))?;

    Ok(ResolvedToken::Refreshed(RefreshedCredential {
        refresh_token: response
            .refresh_token
            .clone()
            .or_else(|| tokens.refresh_token.clone()),
        expires_at: now + Duration::seconds(response.expires_in),
        access_token: response.access_token,
    }))
}

/// Load a user's credentials, refresh if expired, and persist the new
/// tokens before returning the usable access token.
pub async fn ensure_valid_access_token(
    db: &PgPool,
    platform: &dyn PlatformApi,
    user_id: i64,
) -> Result<String, AuthError> {
    let tokens = users::get_user_tokens(db, user_id)
        .await?
        .ok_or(AuthError::NotFound)?;

    match resolve_access_token(platform, &tokens, Utc::now()).await? {
        ResolvedToken::Cached(token) => Ok(token),
        ResolvedToken::Refreshed(credential) => {
            debug!(user_id, "access token refreshed");
            users::update_user_tokens(
                db,
                user_id,
                &credential.access_token,
                credential.refresh_token.as_deref(),
                credential.expires_at,
            )
            .await?;
            Ok(credential.access_token)
        }
    }
}
