//! Post queue queries
//!
//! Terminal transitions are conditional on `status = 'pending'`; the
//! rows_affected check is the concurrency guard under overlapping runs.

use sqlx::{Executor, PgPool, Postgres};

use super::models::Post;

/// Atomically claim due pending posts for this run.
///
/// A claimed post carries a `dispatch_started_at` lease; a post whose lease
/// has expired (a previous run was abandoned mid-flight) becomes claimable
/// again without human intervention.
pub async fn claim_due_posts(
    pool: &PgPool,
    limit: i64,
    lease_seconds: i64,
) -> Result<Vec<Post>, sqlx::Error> {
    sqlx::query_as(
        r#"
        WITH claimed AS (
            SELECT id
            FROM posts
            WHERE status = 'pending'
              AND scheduled_at <= NOW()
              AND (
                  dispatch_started_at IS NULL
                  OR dispatch_started_at < NOW() - ($1::text || ' seconds')::interval
              )
            ORDER BY scheduled_at ASC
            LIMIT $2
            FOR UPDATE SKIP LOCKED
        )
        UPDATE posts p
        SET dispatch_started_at = NOW()
        FROM claimed
        WHERE p.id = claimed.id
        RETURNING p.id, p.user_id, p.body, p.scheduled_at, p.status, p.twitter_id, p.error
        "#,
    )
    .bind(lease_seconds.to_string())
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Terminal transition pending -> posted. Returns false when another run
/// already finalized the post, in which case the row is left untouched.
pub async fn mark_posted<'e, E>(
    executor: E,
    post_id: i64,
    twitter_id: &str,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        r#"
        UPDATE posts
        SET status = 'posted',
            twitter_id = $2,
            posted_at = NOW(),
            error = NULL,
            dispatch_started_at = NULL
        WHERE id = $1 AND status = 'pending'
        "#,
    )
    .bind(post_id)
    .bind(twitter_id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Terminal transition pending -> failed, recording the error for the UI.
pub async fn mark_failed<'e, E>(
    executor: E,
    post_id: i64,
    error: &str,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        r#"
        UPDATE posts
        SET status = 'failed',
            error = $2,
            failed_at = NOW(),
            dispatch_started_at = NULL
        WHERE id = $1 AND status = 'pending'
        "#,
    )
    .bind(post_id)
    .bind(error)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Drop the claim lease on posts this run will not process, so the next
/// trigger picks them up immediately instead of waiting out the lease.
pub async fn release_claims(pool: &PgPool, post_ids: &[i64]) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE posts
        SET dispatch_started_at = NULL
        WHERE id = ANY($1) AND status = 'pending'
        "#,
    )
    .bind(post_ids)
    .execute(pool)
    .await?;
    Ok(())
}
