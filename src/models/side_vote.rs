use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "vote_side")]
pub enum Side {
    A,
    B,
}

impl FromStr for Side {
    type Err = AppError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "A" | "a" => Ok(Side::A),
            "B" | "b" => Ok(Side::B),
            _ => Err(AppError::InvalidArgument(format!("Unknown side: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct SideTally {
    pub votes_a: i32,
    pub votes_b: i32,
}

#[derive(Debug, Deserialize)]
pub struct SideVoteRequest {
    pub side: String, // "A" or "B"
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SideCounts {
    pub post_id: Uuid,
    pub votes_a: i32,
    pub votes_b: i32,
    pub user_side: Option<Side>,
}

impl SideCounts {
    pub fn new(post_id: Uuid, tally: SideTally, user_side: Option<Side>) -> Self {
        Self {
            post_id,
            votes_a: tally.votes_a,
            votes_b: tally.votes_b,
            user_side,
        }
    }
}
