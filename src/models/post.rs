use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "post_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PostType {
    Text,
    Link,
    Image,
    Video,
    Poll,
    Vs,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "post_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Active,
    Removed,
    Deleted,
    Spam,
}

/// The slice of a post row the voting engine needs to decide whether a vote may land on it.
#[derive(Debug, Clone, FromRow)]
pub struct PostRef {
    pub id: Uuid,
    pub post_type: PostType,
    pub status: PostStatus,
}

impl PostRef {
    pub fn is_visible(&self) -> bool {
        self.status == PostStatus::Active
    }
}
