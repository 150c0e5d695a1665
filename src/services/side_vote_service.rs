use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::{PostRef, PostType, Side, SideCounts},
    store::{RowLock, VoteStore, VoteTx},
};

use super::{VoteEngine, recount, retry_on_conflict};

/// Per-(user, post) side-vote state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SideState {
    NoVote,
    Voted(Side),
}

impl From<Option<Side>> for SideState {
    fn from(side: Option<Side>) -> Self {
        side.map_or(SideState::NoVote, SideState::Voted)
    }
}

/// Voting the side already held withdraws the vote; any other vote moves to that side.
fn next_state(current: SideState, vote: Side) -> SideState {
    match current {
        SideState::Voted(side) if side == vote => SideState::NoVote,
        _ => SideState::Voted(vote),
    }
}

async fn lock_vs_post<T: VoteTx>(tx: &mut T, post_id: Uuid, lock: RowLock) -> Result<PostRef> {
    let post = tx
        .lock_post(post_id, lock)
        .await?
        .filter(PostRef::is_visible)
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;

    if post.post_type != PostType::Vs {
        return Err(AppError::InvalidArgument(
            "Side votes are only accepted on VS posts".to_string(),
        ));
    }
    Ok(post)
}

impl<S: VoteStore> VoteEngine<S> {
    /// Cast, switch or withdraw a side vote on a VS post.
    pub async fn vote_side(&self, user_id: Uuid, post_id: Uuid, side: Side) -> Result<SideCounts> {
        retry_on_conflict("vote_side", self.conflict_retries, move || {
            self.try_vote_side(user_id, post_id, side)
        })
        .await
    }

    pub async fn vote_side_str(
        &self,
        user_id: Uuid,
        post_id: Uuid,
        side: &str,
    ) -> Result<SideCounts> {
        let side = side.parse::<Side>()?;
        self.vote_side(user_id, post_id, side).await
    }

    async fn try_vote_side(&self, user_id: Uuid, post_id: Uuid, side: Side) -> Result<SideCounts> {
        let mut tx = self.store.begin().await?;
        lock_vs_post(&mut tx, post_id, RowLock::Update).await?;

        let current = SideState::from(tx.find_side_vote(user_id, post_id).await?);
        let next = next_state(current, side);
        match (current, next) {
            (SideState::NoVote, SideState::Voted(side)) => {
                tx.insert_side_vote(user_id, post_id, side).await?
            }
            (SideState::Voted(_), SideState::Voted(side)) => {
                tx.update_side_vote(user_id, post_id, side).await?
            }
            (SideState::Voted(_), SideState::NoVote) => {
                tx.delete_side_vote(user_id, post_id).await?
            }
            (SideState::NoVote, SideState::NoVote) => {}
        }

        let tally = recount::recount_side_votes(&mut tx, post_id).await?;
        tx.commit().await?;

        tracing::debug!(
            %user_id,
            %post_id,
            ?current,
            ?next,
            votes_a = tally.votes_a,
            votes_b = tally.votes_b,
            "Side vote applied"
        );

        let user_side = match next {
            SideState::Voted(side) => Some(side),
            SideState::NoVote => None,
        };
        Ok(SideCounts::new(post_id, tally, user_side))
    }

    pub async fn side_counts(&self, post_id: Uuid, viewer_id: Option<Uuid>) -> Result<SideCounts> {
        let mut tx = self.store.begin().await?;
        lock_vs_post(&mut tx, post_id, RowLock::Share).await?;

        let tally = tx.stored_side_counts(post_id).await?;
        let user_side = match viewer_id {
            Some(user_id) => tx.find_side_vote(user_id, post_id).await?,
            None => None,
        };
        tx.commit().await?;

        Ok(SideCounts::new(post_id, tally, user_side))
    }

    pub async fn reconcile_side_votes(&self, post_id: Uuid) -> Result<SideCounts> {
        let mut tx = self.store.begin().await?;
        lock_vs_post(&mut tx, post_id, RowLock::Update).await?;

        let tally = recount::recount_side_votes(&mut tx, post_id).await?;
        tx.commit().await?;

        tracing::info!(
            %post_id,
            votes_a = tally.votes_a,
            votes_b = tally.votes_b,
            "Side-vote counters reconciled"
        );
        Ok(SideCounts::new(post_id, tally, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{PostStatus, SideTally},
        store::MemoryVoteStore,
    };

    async fn engine_with_vs_post() -> (VoteEngine<MemoryVoteStore>, Uuid) {
        let store = MemoryVoteStore::new();
        let post_id = store.add_post(PostType::Vs).await;
        (VoteEngine::new(store), post_id)
    }

    #[test]
    fn state_machine_transitions() {
        use Side::*;
        assert_eq!(next_state(SideState::NoVote, A), SideState::Voted(A));
        assert_eq!(next_state(SideState::NoVote, B), SideState::Voted(B));
        assert_eq!(next_state(SideState::Voted(A), A), SideState::NoVote);
        assert_eq!(next_state(SideState::Voted(A), B), SideState::Voted(B));
        assert_eq!(next_state(SideState::Voted(B), B), SideState::NoVote);
        assert_eq!(next_state(SideState::Voted(B), A), SideState::Voted(A));
    }

    #[tokio::test]
    async fn two_users_and_a_switch() {
        let (engine, post_id) = engine_with_vs_post().await;
        let (u1, u2) = (Uuid::new_v4(), Uuid::new_v4());

        let counts = engine.vote_side(u1, post_id, Side::A).await.unwrap();
        assert_eq!((counts.votes_a, counts.votes_b), (1, 0));

        let counts = engine.vote_side(u2, post_id, Side::B).await.unwrap();
        assert_eq!((counts.votes_a, counts.votes_b), (1, 1));

        let counts = engine.vote_side(u1, post_id, Side::B).await.unwrap();
        assert_eq!((counts.votes_a, counts.votes_b), (0, 2));
        assert_eq!(counts.user_side, Some(Side::B));
    }

    #[tokio::test]
    async fn voting_the_same_side_twice_unvotes() {
        let (engine, post_id) = engine_with_vs_post().await;
        let user = Uuid::new_v4();

        engine.vote_side(user, post_id, Side::A).await.unwrap();
        let counts = engine.vote_side(user, post_id, Side::A).await.unwrap();

        assert_eq!((counts.votes_a, counts.votes_b), (0, 0));
        assert_eq!(counts.user_side, None);
        let state = engine.store().snapshot().await;
        assert_eq!(state.side_vote_rows(post_id), 0);
    }

    #[tokio::test]
    async fn non_vs_and_hidden_posts_are_rejected() {
        let store = MemoryVoteStore::new();
        let text_post = store.add_post(PostType::Text).await;
        let hidden_vs = store.add_post(PostType::Vs).await;
        store.set_post_status(hidden_vs, PostStatus::Spam).await;
        let engine = VoteEngine::new(store);
        let user = Uuid::new_v4();

        let err = engine.vote_side(user, text_post, Side::A).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));

        let err = engine.vote_side(user, hidden_vs, Side::A).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = engine
            .vote_side(user, Uuid::new_v4(), Side::B)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn side_strings_are_validated() {
        let (engine, post_id) = engine_with_vs_post().await;
        let err = engine
            .vote_side_str(Uuid::new_v4(), post_id, "C")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));

        let counts = engine
            .vote_side_str(Uuid::new_v4(), post_id, "b")
            .await
            .unwrap();
        assert_eq!(counts.votes_b, 1);
    }

    #[tokio::test]
    async fn stored_counts_match_the_ledger() {
        let (engine, post_id) = engine_with_vs_post().await;
        let users: Vec<Uuid> = (0..6).map(|_| Uuid::new_v4()).collect();

        for (i, user) in users.iter().enumerate() {
            let side = if i % 3 == 0 { Side::B } else { Side::A };
            engine.vote_side(*user, post_id, side).await.unwrap();
        }
        engine.vote_side(users[1], post_id, Side::A).await.unwrap();

        let state = engine.store().snapshot().await;
        let stored = state.stored_sides(post_id).unwrap();
        assert_eq!(stored, state.ledger_sides(post_id));
        assert_eq!(
            stored,
            SideTally {
                votes_a: 3,
                votes_b: 2
            }
        );
        assert_eq!(
            (stored.votes_a + stored.votes_b) as usize,
            state.side_vote_rows(post_id)
        );
    }

    #[tokio::test]
    async fn viewer_snapshot_and_reconcile() {
        let (engine, post_id) = engine_with_vs_post().await;
        let user = Uuid::new_v4();
        engine.vote_side(user, post_id, Side::B).await.unwrap();

        let counts = engine.side_counts(post_id, Some(user)).await.unwrap();
        assert_eq!(counts.user_side, Some(Side::B));
        assert_eq!(counts.votes_b, 1);

        let counts = engine.reconcile_side_votes(post_id).await.unwrap();
        assert_eq!((counts.votes_a, counts.votes_b), (0, 1));
    }
}
