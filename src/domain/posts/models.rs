//! Post model definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::{PgArgumentBuffer, PgTypeInfo, PgValueRef};
use sqlx::types::Json;
use sqlx::{Decode, Encode, Postgres, Type};

/// Post lifecycle status. `posted` and `failed` are terminal; only
/// `pending` posts are eligible for dispatch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    Pending,
    Posted,
    Failed,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Pending => "pending",
            PostStatus::Posted => "posted",
            PostStatus::Failed => "failed",
        }
    }

    /// Unknown strings are a decode error rather than defaulting to
    /// `pending`, so a corrupted row can never become eligible for
    /// dispatch again.
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s {
            "pending" => Ok(PostStatus::Pending),
            "posted" => Ok(PostStatus::Posted),
            "failed" => Ok(PostStatus::Failed),
            other => Err(format!("unknown post status: {}", other)),
        }
    }
}

// sqlx Type/Decode/Encode for PostStatus to enable FromRow on Post
impl Type<Postgres> for PostStatus {
    fn type_info() -> PgTypeInfo {
        <String as Type<Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        <String as Type<Postgres>>::compatible(ty)
    }
}

impl<'r> Decode<'r, Postgres> for PostStatus {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <String as Decode<Postgres>>::decode(value)?;
        PostStatus::from_str(&s).map_err(Into::into)
    }
}

impl Encode<'_, Postgres> for PostStatus {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        <String as Encode<Postgres>>::encode_by_ref(&self.as_str().to_owned(), buf)
    }
}

/// Reference to an already-uploaded blob in object storage. The blob is
/// fetched by plain HTTP GET at dispatch time; the mime type drives the
/// chunked-upload INIT declaration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaRef {
    pub url: String,
    pub mime_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub size: Option<i64>,
}

/// One block of a thread: its own text plus any images of its own.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThreadBlock {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub images: Vec<MediaRef>,
}

/// Content shape, decided once when the post is composed. Dispatch never
/// re-derives the shape from emptiness checks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PostBody {
    /// A single post: text plus up to the platform media limit.
    Simple {
        #[serde(default)]
        text: String,
        #[serde(default)]
        media: Vec<MediaRef>,
    },
    /// An ordered reply chain. `media` is the main media list, attached to
    /// block 0 when that block carries no images of its own.
    Thread {
        blocks: Vec<ThreadBlock>,
        #[serde(default)]
        media: Vec<MediaRef>,
    },
    /// Carousel media published through the single-publish path.
    CarouselOnly {
        #[serde(default)]
        text: String,
        media: Vec<MediaRef>,
    },
}

/// A claimed post row, as loaded by the dispatch queries.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Post {
    pub id: i64,
    pub user_id: i64,
    pub body: Json<PostBody>,
    pub scheduled_at: DateTime<Utc>,
    pub status: PostStatus,
    pub twitter_id: Option<String>,
    pub error: Option<String>,
}
