use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "comment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CommentStatus {
    Active,
    Removed,
    Deleted,
    Spam,
}

#[derive(Debug, Clone, FromRow)]
pub struct CommentRef {
    pub id: Uuid,
    pub post_id: Uuid,
    pub status: CommentStatus,
}

impl CommentRef {
    pub fn is_visible(&self) -> bool {
        self.status == CommentStatus::Active
    }
}
