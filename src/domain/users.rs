//! Credential storage for per-user platform authorization

use chrono::{DateTime, Utc};
use sqlx::{Executor, Postgres};

/// Per-user token pair, mutated only by the token broker on refresh.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_expires_at: DateTime<Utc>,
}

pub async fn get_user_tokens<'e, E>(
    executor: E,
    user_id: i64,
) -> Result<Option<UserTokens>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT access_token, refresh_token, token_expires_at
        FROM users WHERE id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(executor)
    .await
}

/// Persist a refreshed token pair. The caller decides the refresh-token
/// fallback, so the value is written as-is.
pub async fn update_user_tokens<'e, E>(
    executor: E,
    user_id: i64,
    access_token: &str,
    refresh_token: Option<&str>,
    expires_at: DateTime<Utc>,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        UPDATE users SET
            access_token = $2,
            refresh_token = $3,
            token_expires_at = $4,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(user_id)
    .bind(access_token)
    .bind(refresh_token)
    .bind(expires_at)
    .execute(executor)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use sqlx::PgPool;

    async fn insert_user(pool: &PgPool, expires_at: DateTime<Utc>) -> i64 {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO users (twitter_id, twitter_username, access_token, refresh_token, token_expires_at)
            VALUES ('tw-1', 'tester', 'old-access', 'old-refresh', $1)
            RETURNING id
            "#,
        )
        .bind(expires_at)
        .fetch_one(pool)
        .await
        .unwrap();
        id
    }

    #[sqlx::test]
    async fn missing_user_yields_none(pool: PgPool) {
        assert!(get_user_tokens(&pool, 999).await.unwrap().is_none());
    }

    #[sqlx::test]
    async fn refreshed_tokens_are_read_back(pool: PgPool) {
        let expires_at = Utc::now() + Duration::hours(1);
        let user_id = insert_user(&pool, expires_at).await;

        let new_expiry = Utc::now() + Duration::hours(2);
        update_user_tokens(&pool, user_id, "new-access", Some("new-refresh"), new_expiry)
            .await
            .unwrap();

        let tokens = get_user_tokens(&pool, user_id).await.unwrap().unwrap();
        assert_eq!(tokens.access_token, "new-access");
        assert_eq!(tokens.refresh_token.as_deref(), Some("new-refresh"));
        assert_eq!(tokens.token_expires_at.timestamp(), new_expiry.timestamp());
    }
}
