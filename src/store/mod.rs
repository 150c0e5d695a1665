//! Storage seam for the voting engine.
//!
//! A [`VoteStore`] hands out [`VoteTx`] units of work. Everything the engine reads or writes for
//! one vote goes through a single `VoteTx`, and nothing it did is visible to anyone else until
//! [`VoteTx::commit`] succeeds. Dropping a transaction without committing discards it.
//!
//! Counter writes (`write_*`) exist only for the aggregate recalculator in
//! [`crate::services::recount`]; no other caller should touch them.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    error::Result,
    models::{
        CommentRef, NewPoll, Poll, PollOption, PostRef, ReactionTally, ReactionTarget,
        ReactionType, Side, SideTally,
    },
};

pub use memory::MemoryVoteStore;
pub use postgres::PgVoteStore;

/// How strongly a `lock_*` call holds the row it reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowLock {
    /// Exclusive. Taken on the row a vote mutates; concurrent votes on it queue behind.
    Update,
    /// Shared. Taken by snapshot reads and on parent rows whose status gates a vote. Shared
    /// holders don't block each other, only writers.
    Share,
}

#[async_trait]
pub trait VoteStore: Send + Sync + 'static {
    type Tx: VoteTx;

    /// Open a unit of work.
    async fn begin(&self) -> Result<Self::Tx>;
}

#[async_trait]
pub trait VoteTx: Send {
    // Targets. The `lock_*` calls take a row lock that is held until commit or rollback. An
    // `Update` lock serializes concurrent votes on the same target.
    async fn lock_post(&mut self, post_id: Uuid, lock: RowLock) -> Result<Option<PostRef>>;
    async fn lock_comment(&mut self, comment_id: Uuid, lock: RowLock)
    -> Result<Option<CommentRef>>;
    async fn lock_poll(&mut self, poll_id: Uuid, lock: RowLock) -> Result<Option<Poll>>;
    async fn find_poll_for_post(&mut self, post_id: Uuid) -> Result<Option<Poll>>;
    /// Options of a poll in display order.
    async fn poll_options(&mut self, poll_id: Uuid) -> Result<Vec<PollOption>>;

    // Reaction ledger
    async fn find_reaction(
        &mut self,
        user_id: Uuid,
        target: ReactionTarget,
    ) -> Result<Option<ReactionType>>;
    async fn insert_reaction(
        &mut self,
        user_id: Uuid,
        target: ReactionTarget,
        reaction_type: ReactionType,
    ) -> Result<()>;
    async fn update_reaction(
        &mut self,
        user_id: Uuid,
        target: ReactionTarget,
        reaction_type: ReactionType,
    ) -> Result<()>;
    async fn delete_reaction(&mut self, user_id: Uuid, target: ReactionTarget) -> Result<()>;
    async fn count_reactions(&mut self, target: ReactionTarget) -> Result<ReactionTally>;
    async fn stored_reaction_counts(&mut self, target: ReactionTarget) -> Result<ReactionTally>;
    async fn write_reaction_counts(
        &mut self,
        target: ReactionTarget,
        tally: ReactionTally,
    ) -> Result<()>;

    // Side-vote ledger
    async fn find_side_vote(&mut self, user_id: Uuid, post_id: Uuid) -> Result<Option<Side>>;
    async fn insert_side_vote(&mut self, user_id: Uuid, post_id: Uuid, side: Side) -> Result<()>;
    async fn update_side_vote(&mut self, user_id: Uuid, post_id: Uuid, side: Side) -> Result<()>;
    async fn delete_side_vote(&mut self, user_id: Uuid, post_id: Uuid) -> Result<()>;
    async fn count_side_votes(&mut self, post_id: Uuid) -> Result<SideTally>;
    async fn stored_side_counts(&mut self, post_id: Uuid) -> Result<SideTally>;
    async fn write_side_counts(&mut self, post_id: Uuid, tally: SideTally) -> Result<()>;

    // Poll ledger
    async fn insert_poll(&mut self, new_poll: &NewPoll) -> Result<()>;
    /// The caller's selected option ids, in option order.
    async fn poll_selection(&mut self, user_id: Uuid, poll_id: Uuid) -> Result<Vec<Uuid>>;
    async fn clear_poll_votes(&mut self, user_id: Uuid, poll_id: Uuid) -> Result<u64>;
    async fn insert_poll_vote(&mut self, user_id: Uuid, poll_id: Uuid, option_id: Uuid)
    -> Result<()>;
    /// Ledger row count per option id, including options nobody picked.
    async fn count_option_votes(&mut self, poll_id: Uuid) -> Result<Vec<(Uuid, i32)>>;
    async fn count_poll_votes(&mut self, poll_id: Uuid) -> Result<i32>;
    async fn write_option_count(&mut self, option_id: Uuid, vote_count: i32) -> Result<()>;
    async fn write_poll_total(&mut self, poll_id: Uuid, total_votes: i32) -> Result<()>;

    async fn commit(self) -> Result<()>;
}
