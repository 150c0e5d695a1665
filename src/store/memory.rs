//! In-process ledger for tests and local development.
//!
//! A transaction takes an exclusive async lock on the shared state and works on a private copy.
//! Commit publishes the copy; dropping the transaction throws it away. This gives the same
//! all-or-nothing visibility as a database transaction, with every unit of work fully
//! serialized, so the [`RowLock`] mode is irrelevant here.
//!
//! Ledger rows are indexed by their target, so a recount only visits the rows of the target it
//! rebuilds. Copying the whole state on `begin` makes this backend unsuitable for large data
//! sets; production runs on [`PgVoteStore`](super::PgVoteStore).

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::{
        CommentRef, CommentStatus, NewPoll, Poll, PollOption, PostRef, PostStatus, PostType,
        ReactionTally, ReactionTarget, ReactionType, Side, SideTally, TargetKind,
    },
};

use super::{RowLock, VoteStore, VoteTx};

#[derive(Debug, Clone)]
struct PostRow {
    post: PostRef,
    reactions: ReactionTally,
    sides: SideTally,
}

#[derive(Debug, Clone)]
struct CommentRow {
    comment: CommentRef,
    reactions: ReactionTally,
}

#[derive(Debug, Clone)]
struct PollRow {
    poll: Poll,
    // Display order.
    options: Vec<PollOption>,
    // (user_id, option_id)
    votes: HashSet<(Uuid, Uuid)>,
}

/// Everything the in-memory store holds. Returned by [`MemoryVoteStore::snapshot`] so tests
/// can compare stored counters against the ledger.
#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    posts: HashMap<Uuid, PostRow>,
    comments: HashMap<Uuid, CommentRow>,
    // target -> user -> reaction
    reactions: HashMap<ReactionTarget, HashMap<Uuid, ReactionType>>,
    // post -> user -> side
    side_votes: HashMap<Uuid, HashMap<Uuid, Side>>,
    polls: HashMap<Uuid, PollRow>,
    poll_by_post: HashMap<Uuid, Uuid>,
    poll_by_option: HashMap<Uuid, Uuid>,
}

impl MemoryState {
    /// Counters stored on the target row.
    pub fn stored_reactions(&self, target: ReactionTarget) -> Option<ReactionTally> {
        match target.kind {
            TargetKind::Post => self.posts.get(&target.id).map(|row| row.reactions),
            TargetKind::Comment => self.comments.get(&target.id).map(|row| row.reactions),
        }
    }

    /// Counts taken straight from the reaction ledger.
    pub fn ledger_reactions(&self, target: ReactionTarget) -> ReactionTally {
        let mut tally = ReactionTally::default();
        for reaction_type in self.reactions.get(&target).into_iter().flat_map(|m| m.values()) {
            match reaction_type {
                ReactionType::Upvote => tally.upvotes += 1,
                ReactionType::Downvote => tally.downvotes += 1,
            }
        }
        tally
    }

    pub fn reaction_rows(&self, target: ReactionTarget) -> usize {
        self.reactions.get(&target).map_or(0, HashMap::len)
    }

    pub fn stored_sides(&self, post_id: Uuid) -> Option<SideTally> {
        self.posts.get(&post_id).map(|row| row.sides)
    }

    pub fn ledger_sides(&self, post_id: Uuid) -> SideTally {
        let mut tally = SideTally::default();
        for side in self.side_votes.get(&post_id).into_iter().flat_map(|m| m.values()) {
            match side {
                Side::A => tally.votes_a += 1,
                Side::B => tally.votes_b += 1,
            }
        }
        tally
    }

    pub fn side_vote_rows(&self, post_id: Uuid) -> usize {
        self.side_votes.get(&post_id).map_or(0, HashMap::len)
    }

    pub fn poll(&self, poll_id: Uuid) -> Option<&Poll> {
        self.polls.get(&poll_id).map(|row| &row.poll)
    }

    /// Options of a poll in display order.
    pub fn poll_options(&self, poll_id: Uuid) -> Vec<&PollOption> {
        self.polls
            .get(&poll_id)
            .map(|row| row.options.iter().collect())
            .unwrap_or_default()
    }

    pub fn poll_vote_rows(&self, poll_id: Uuid) -> usize {
        self.polls.get(&poll_id).map_or(0, |row| row.votes.len())
    }

    pub fn option_vote_rows(&self, option_id: Uuid) -> usize {
        self.poll_by_option
            .get(&option_id)
            .and_then(|poll_id| self.polls.get(poll_id))
            .map_or(0, |row| {
                row.votes.iter().filter(|(_, o)| *o == option_id).count()
            })
    }

    pub fn user_poll_rows(&self, user_id: Uuid, poll_id: Uuid) -> usize {
        self.polls.get(&poll_id).map_or(0, |row| {
            row.votes.iter().filter(|(u, _)| *u == user_id).count()
        })
    }

    fn insert_poll_row(&mut self, new_poll: NewPoll) {
        let poll_id = new_poll.poll.id;
        let mut options = new_poll.options;
        options.sort_by_key(|o| o.position);
        for option in &options {
            self.poll_by_option.insert(option.id, poll_id);
        }
        self.poll_by_post.insert(new_poll.poll.post_id, poll_id);
        self.polls.insert(
            poll_id,
            PollRow {
                poll: new_poll.poll,
                options,
                votes: HashSet::new(),
            },
        );
    }

    fn remove_post(&mut self, post_id: Uuid) -> bool {
        if self.posts.remove(&post_id).is_none() {
            return false;
        }

        let comment_ids: Vec<Uuid> = self
            .comments
            .values()
            .filter(|row| row.comment.post_id == post_id)
            .map(|row| row.comment.id)
            .collect();
        for comment_id in comment_ids {
            self.comments.remove(&comment_id);
            self.reactions.remove(&ReactionTarget::comment(comment_id));
        }
        self.reactions.remove(&ReactionTarget::post(post_id));
        self.side_votes.remove(&post_id);

        if let Some(poll_id) = self.poll_by_post.remove(&post_id) {
            if let Some(row) = self.polls.remove(&poll_id) {
                for option in &row.options {
                    self.poll_by_option.remove(&option.id);
                }
            }
        }
        true
    }
}

#[derive(Debug, Default)]
struct Faults {
    conflicts: AtomicUsize,
    commit_failures: AtomicUsize,
}

impl Faults {
    fn take(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[derive(Clone, Default)]
pub struct MemoryVoteStore {
    state: Arc<Mutex<MemoryState>>,
    faults: Arc<Faults>,
}

impl MemoryVoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> MemoryState {
        self.state.lock().await.clone()
    }

    pub async fn add_post(&self, post_type: PostType) -> Uuid {
        let id = Uuid::new_v4();
        let row = PostRow {
            post: PostRef {
                id,
                post_type,
                status: PostStatus::Active,
            },
            reactions: ReactionTally::default(),
            sides: SideTally::default(),
        };
        self.state.lock().await.posts.insert(id, row);
        id
    }

    pub async fn set_post_status(&self, post_id: Uuid, status: PostStatus) {
        if let Some(row) = self.state.lock().await.posts.get_mut(&post_id) {
            row.post.status = status;
        }
    }

    /// Delete a post together with everything that hangs off it, mirroring the schema's
    /// `ON DELETE CASCADE` chain.
    pub async fn delete_post(&self, post_id: Uuid) -> bool {
        self.state.lock().await.remove_post(post_id)
    }

    pub async fn add_comment(&self, post_id: Uuid) -> Uuid {
        let id = Uuid::new_v4();
        let row = CommentRow {
            comment: CommentRef {
                id,
                post_id,
                status: CommentStatus::Active,
            },
            reactions: ReactionTally::default(),
        };
        self.state.lock().await.comments.insert(id, row);
        id
    }

    pub async fn set_comment_status(&self, comment_id: Uuid, status: CommentStatus) {
        if let Some(row) = self.state.lock().await.comments.get_mut(&comment_id) {
            row.comment.status = status;
        }
    }

    /// Store a poll as-is, skipping request validation. Lets tests set up polls whose deadline
    /// has already passed.
    pub async fn add_poll(&self, new_poll: NewPoll) {
        self.state.lock().await.insert_poll_row(new_poll);
    }

    /// Make the next `n` ledger inserts fail as a concurrent duplicate would.
    pub fn fail_next_inserts(&self, n: usize) {
        self.faults.conflicts.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` commits fail as a lost database connection would.
    pub fn fail_next_commits(&self, n: usize) {
        self.faults.commit_failures.store(n, Ordering::SeqCst);
    }

    #[cfg(test)]
    pub(crate) async fn overwrite_reaction_counts(
        &self,
        target: ReactionTarget,
        tally: ReactionTally,
    ) {
        let mut state = self.state.lock().await;
        match target.kind {
            TargetKind::Post => {
                if let Some(row) = state.posts.get_mut(&target.id) {
                    row.reactions = tally;
                }
            }
            TargetKind::Comment => {
                if let Some(row) = state.comments.get_mut(&target.id) {
                    row.reactions = tally;
                }
            }
        }
    }
}

#[async_trait]
impl VoteStore for MemoryVoteStore {
    type Tx = MemoryVoteTx;

    async fn begin(&self) -> Result<MemoryVoteTx> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(MemoryVoteTx {
            guard,
            working,
            faults: self.faults.clone(),
        })
    }
}

pub struct MemoryVoteTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    faults: Arc<Faults>,
}

impl MemoryVoteTx {
    fn check_insert(&self, what: &str) -> Result<()> {
        if Faults::take(&self.faults.conflicts) {
            return Err(AppError::Conflict(format!("duplicate {} (injected)", what)));
        }
        Ok(())
    }

    fn post_mut(&mut self, post_id: Uuid) -> Result<&mut PostRow> {
        self.working
            .posts
            .get_mut(&post_id)
            .ok_or_else(|| AppError::Internal(format!("post {} vanished mid-transaction", post_id)))
    }

    fn poll_mut(&mut self, poll_id: Uuid) -> Result<&mut PollRow> {
        self.working
            .polls
            .get_mut(&poll_id)
            .ok_or_else(|| AppError::Internal(format!("poll {} vanished mid-transaction", poll_id)))
    }
}

#[async_trait]
impl VoteTx for MemoryVoteTx {
    async fn lock_post(&mut self, post_id: Uuid, _lock: RowLock) -> Result<Option<PostRef>> {
        Ok(self.working.posts.get(&post_id).map(|row| row.post.clone()))
    }

    async fn lock_comment(
        &mut self,
        comment_id: Uuid,
        _lock: RowLock,
    ) -> Result<Option<CommentRef>> {
        Ok(self
            .working
            .comments
            .get(&comment_id)
            .map(|row| row.comment.clone()))
    }

    async fn lock_poll(&mut self, poll_id: Uuid, _lock: RowLock) -> Result<Option<Poll>> {
        Ok(self.working.poll(poll_id).cloned())
    }

    async fn find_poll_for_post(&mut self, post_id: Uuid) -> Result<Option<Poll>> {
        Ok(self
            .working
            .poll_by_post
            .get(&post_id)
            .and_then(|poll_id| self.working.poll(*poll_id))
            .cloned())
    }

    async fn poll_options(&mut self, poll_id: Uuid) -> Result<Vec<PollOption>> {
        Ok(self
            .working
            .poll_options(poll_id)
            .into_iter()
            .cloned()
            .collect())
    }

    async fn find_reaction(
        &mut self,
        user_id: Uuid,
        target: ReactionTarget,
    ) -> Result<Option<ReactionType>> {
        Ok(self
            .working
            .reactions
            .get(&target)
            .and_then(|ledger| ledger.get(&user_id))
            .copied())
    }

    async fn insert_reaction(
        &mut self,
        user_id: Uuid,
        target: ReactionTarget,
        reaction_type: ReactionType,
    ) -> Result<()> {
        self.check_insert("reaction")?;
        let ledger = self.working.reactions.entry(target).or_default();
        if ledger.contains_key(&user_id) {
            return Err(AppError::Conflict(format!(
                "reaction by {} on {} already exists",
                user_id, target
            )));
        }
        ledger.insert(user_id, reaction_type);
        Ok(())
    }

    async fn update_reaction(
        &mut self,
        user_id: Uuid,
        target: ReactionTarget,
        reaction_type: ReactionType,
    ) -> Result<()> {
        if let Some(existing) = self
            .working
            .reactions
            .get_mut(&target)
            .and_then(|ledger| ledger.get_mut(&user_id))
        {
            *existing = reaction_type;
        }
        Ok(())
    }

    async fn delete_reaction(&mut self, user_id: Uuid, target: ReactionTarget) -> Result<()> {
        if let Some(ledger) = self.working.reactions.get_mut(&target) {
            ledger.remove(&user_id);
        }
        Ok(())
    }

    async fn count_reactions(&mut self, target: ReactionTarget) -> Result<ReactionTally> {
        Ok(self.working.ledger_reactions(target))
    }

    async fn stored_reaction_counts(&mut self, target: ReactionTarget) -> Result<ReactionTally> {
        self.working
            .stored_reactions(target)
            .ok_or_else(|| AppError::NotFound(format!("{} not found", target.kind)))
    }

    async fn write_reaction_counts(
        &mut self,
        target: ReactionTarget,
        tally: ReactionTally,
    ) -> Result<()> {
        match target.kind {
            TargetKind::Post => self.post_mut(target.id)?.reactions = tally,
            TargetKind::Comment => {
                let row = self.working.comments.get_mut(&target.id).ok_or_else(|| {
                    AppError::Internal(format!("comment {} vanished mid-transaction", target.id))
                })?;
                row.reactions = tally;
            }
        }
        Ok(())
    }

    async fn find_side_vote(&mut self, user_id: Uuid, post_id: Uuid) -> Result<Option<Side>> {
        Ok(self
            .working
            .side_votes
            .get(&post_id)
            .and_then(|ledger| ledger.get(&user_id))
            .copied())
    }

    async fn insert_side_vote(&mut self, user_id: Uuid, post_id: Uuid, side: Side) -> Result<()> {
        self.check_insert("side vote")?;
        let ledger = self.working.side_votes.entry(post_id).or_default();
        if ledger.contains_key(&user_id) {
            return Err(AppError::Conflict(format!(
                "side vote by {} on post {} already exists",
                user_id, post_id
            )));
        }
        ledger.insert(user_id, side);
        Ok(())
    }

    async fn update_side_vote(&mut self, user_id: Uuid, post_id: Uuid, side: Side) -> Result<()> {
        if let Some(existing) = self
            .working
            .side_votes
            .get_mut(&post_id)
            .and_then(|ledger| ledger.get_mut(&user_id))
        {
            *existing = side;
        }
        Ok(())
    }

    async fn delete_side_vote(&mut self, user_id: Uuid, post_id: Uuid) -> Result<()> {
        if let Some(ledger) = self.working.side_votes.get_mut(&post_id) {
            ledger.remove(&user_id);
        }
        Ok(())
    }

    async fn count_side_votes(&mut self, post_id: Uuid) -> Result<SideTally> {
        Ok(self.working.ledger_sides(post_id))
    }

    async fn stored_side_counts(&mut self, post_id: Uuid) -> Result<SideTally> {
        self.working
            .stored_sides(post_id)
            .ok_or_else(|| AppError::NotFound("post not found".to_string()))
    }

    async fn write_side_counts(&mut self, post_id: Uuid, tally: SideTally) -> Result<()> {
        self.post_mut(post_id)?.sides = tally;
        Ok(())
    }

    async fn insert_poll(&mut self, new_poll: &NewPoll) -> Result<()> {
        self.check_insert("poll")?;
        if self.working.poll_by_post.contains_key(&new_poll.poll.post_id) {
            return Err(AppError::Conflict(format!(
                "post {} already has a poll",
                new_poll.poll.post_id
            )));
        }
        self.working.insert_poll_row(new_poll.clone());
        Ok(())
    }

    async fn poll_selection(&mut self, user_id: Uuid, poll_id: Uuid) -> Result<Vec<Uuid>> {
        let selection = match self.working.polls.get(&poll_id) {
            Some(row) => row
                .options
                .iter()
                .filter(|option| row.votes.contains(&(user_id, option.id)))
                .map(|option| option.id)
                .collect(),
            None => Vec::new(),
        };
        Ok(selection)
    }

    async fn clear_poll_votes(&mut self, user_id: Uuid, poll_id: Uuid) -> Result<u64> {
        let Some(row) = self.working.polls.get_mut(&poll_id) else {
            return Ok(0);
        };
        let before = row.votes.len();
        row.votes.retain(|(u, _)| *u != user_id);
        Ok((before - row.votes.len()) as u64)
    }

    async fn insert_poll_vote(
        &mut self,
        user_id: Uuid,
        poll_id: Uuid,
        option_id: Uuid,
    ) -> Result<()> {
        self.check_insert("poll vote")?;
        // Same guarantee as the composite foreign key on poll_votes.
        if self.working.poll_by_option.get(&option_id) != Some(&poll_id) {
            return Err(AppError::Internal(format!(
                "option {} is not part of poll {}",
                option_id, poll_id
            )));
        }
        if !self.poll_mut(poll_id)?.votes.insert((user_id, option_id)) {
            return Err(AppError::Conflict(format!(
                "poll vote by {} on option {} already exists",
                user_id, option_id
            )));
        }
        Ok(())
    }

    async fn count_option_votes(&mut self, poll_id: Uuid) -> Result<Vec<(Uuid, i32)>> {
        let Some(row) = self.working.polls.get(&poll_id) else {
            return Ok(Vec::new());
        };
        let mut counts: HashMap<Uuid, i32> = HashMap::new();
        for (_, option_id) in &row.votes {
            *counts.entry(*option_id).or_default() += 1;
        }
        Ok(row
            .options
            .iter()
            .map(|option| (option.id, counts.get(&option.id).copied().unwrap_or(0)))
            .collect())
    }

    async fn count_poll_votes(&mut self, poll_id: Uuid) -> Result<i32> {
        Ok(self.working.poll_vote_rows(poll_id) as i32)
    }

    async fn write_option_count(&mut self, option_id: Uuid, vote_count: i32) -> Result<()> {
        let poll_id = self
            .working
            .poll_by_option
            .get(&option_id)
            .copied()
            .ok_or_else(|| {
                AppError::Internal(format!("option {} vanished mid-transaction", option_id))
            })?;
        if let Some(option) = self
            .poll_mut(poll_id)?
            .options
            .iter_mut()
            .find(|o| o.id == option_id)
        {
            option.vote_count = vote_count;
        }
        Ok(())
    }

    async fn write_poll_total(&mut self, poll_id: Uuid, total_votes: i32) -> Result<()> {
        self.poll_mut(poll_id)?.poll.total_votes = total_votes;
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        if Faults::take(&self.faults.commit_failures) {
            return Err(AppError::Internal(
                "commit failed (injected storage fault)".to_string(),
            ));
        }
        let MemoryVoteTx {
            mut guard, working, ..
        } = self;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ledgers_are_scoped_to_their_target() {
        let store = MemoryVoteStore::new();
        let busy = store.add_post(PostType::Vs).await;
        let quiet = store.add_post(PostType::Vs).await;
        let user = Uuid::new_v4();

        let mut tx = store.begin().await.unwrap();
        for _ in 0..3 {
            tx.insert_reaction(Uuid::new_v4(), ReactionTarget::post(busy), ReactionType::Upvote)
                .await
                .unwrap();
            tx.insert_side_vote(Uuid::new_v4(), busy, Side::A).await.unwrap();
        }
        tx.insert_reaction(user, ReactionTarget::post(quiet), ReactionType::Downvote)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let state = store.snapshot().await;
        assert_eq!(
            state.ledger_reactions(ReactionTarget::post(quiet)),
            ReactionTally {
                upvotes: 0,
                downvotes: 1
            }
        );
        assert_eq!(state.reaction_rows(ReactionTarget::post(busy)), 3);
        assert_eq!(state.side_vote_rows(quiet), 0);
        assert_eq!(state.ledger_sides(busy).votes_a, 3);
    }

    #[tokio::test]
    async fn dropped_transaction_publishes_nothing() {
        let store = MemoryVoteStore::new();
        let post_id = store.add_post(PostType::Text).await;
        let target = ReactionTarget::post(post_id);

        let mut tx = store.begin().await.unwrap();
        tx.insert_reaction(Uuid::new_v4(), target, ReactionType::Upvote)
            .await
            .unwrap();
        drop(tx);

        assert_eq!(store.snapshot().await.reaction_rows(target), 0);
    }
}
