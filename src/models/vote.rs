use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "reaction_type", rename_all = "lowercase")]
#[serde(rename_all = "UPPERCASE")]
pub enum ReactionType {
    Upvote,
    Downvote,
}

impl FromStr for ReactionType {
    type Err = AppError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "UPVOTE" => Ok(ReactionType::Upvote),
            "DOWNVOTE" => Ok(ReactionType::Downvote),
            _ => Err(AppError::InvalidArgument(format!(
                "Unknown reaction type: {}",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Post,
    Comment,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::Post => f.write_str("post"),
            TargetKind::Comment => f.write_str("comment"),
        }
    }
}

/// Something a reaction can land on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ReactionTarget {
    pub kind: TargetKind,
    pub id: Uuid,
}

impl ReactionTarget {
    pub fn post(id: Uuid) -> Self {
        Self {
            kind: TargetKind::Post,
            id,
        }
    }

    pub fn comment(id: Uuid) -> Self {
        Self {
            kind: TargetKind::Comment,
            id,
        }
    }
}

impl fmt::Display for ReactionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

/// Counts derived from the reaction ledger for one target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct ReactionTally {
    pub upvotes: i32,
    pub downvotes: i32,
}

// Vote request
#[derive(Debug, Deserialize)]
pub struct ReactionRequest {
    pub reaction_type: String, // "UPVOTE" or "DOWNVOTE"
}

// Vote response
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ReactionCounts {
    pub target_id: Uuid,
    pub upvotes: i32,
    pub downvotes: i32,
    pub score: i32,
    pub user_reaction: Option<ReactionType>,
}

impl ReactionCounts {
    pub fn new(target_id: Uuid, tally: ReactionTally, user_reaction: Option<ReactionType>) -> Self {
        Self {
            target_id,
            upvotes: tally.upvotes,
            downvotes: tally.downvotes,
            score: tally.upvotes - tally.downvotes,
            user_reaction,
        }
    }
}
