use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::{ReactionCounts, ReactionTarget, ReactionType, TargetKind},
    store::{RowLock, VoteStore, VoteTx},
};

use super::{VoteEngine, recount, retry_on_conflict};

/// What a repeated reaction does to the caller's ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReactionChange {
    Insert,
    Remove,
    Switch,
}

fn reaction_change(existing: Option<ReactionType>, requested: ReactionType) -> ReactionChange {
    match existing {
        None => ReactionChange::Insert,
        Some(current) if current == requested => ReactionChange::Remove,
        Some(_) => ReactionChange::Switch,
    }
}

/// Lock the target row, failing with `NotFound` when it is missing or hidden. A comment is
/// also hidden when the post it belongs to is.
async fn lock_visible_target<T: VoteTx>(
    tx: &mut T,
    target: ReactionTarget,
    lock: RowLock,
) -> Result<()> {
    let visible = match target.kind {
        TargetKind::Post => tx
            .lock_post(target.id, lock)
            .await?
            .is_some_and(|post| post.is_visible()),
        TargetKind::Comment => match tx.lock_comment(target.id, lock).await? {
            Some(comment) if comment.is_visible() => tx
                .lock_post(comment.post_id, RowLock::Share)
                .await?
                .is_some_and(|post| post.is_visible()),
            _ => false,
        },
    };

    if visible {
        Ok(())
    } else {
        Err(AppError::NotFound(format!("{} not found", target.kind)))
    }
}

impl<S: VoteStore> VoteEngine<S> {
    /// Toggle an upvote/downvote: a first reaction is recorded, repeating it removes it, and
    /// the opposite reaction replaces it.
    pub async fn toggle_reaction(
        &self,
        user_id: Uuid,
        target: ReactionTarget,
        reaction_type: ReactionType,
    ) -> Result<ReactionCounts> {
        retry_on_conflict("toggle_reaction", self.conflict_retries, move || {
            self.try_toggle_reaction(user_id, target, reaction_type)
        })
        .await
    }

    /// Same as [`toggle_reaction`](Self::toggle_reaction) with the reaction given as a string,
    /// as it arrives from a request body.
    pub async fn toggle_reaction_str(
        &self,
        user_id: Uuid,
        target: ReactionTarget,
        reaction_type: &str,
    ) -> Result<ReactionCounts> {
        let reaction_type = reaction_type.parse::<ReactionType>()?;
        self.toggle_reaction(user_id, target, reaction_type).await
    }

    async fn try_toggle_reaction(
        &self,
        user_id: Uuid,
        target: ReactionTarget,
        reaction_type: ReactionType,
    ) -> Result<ReactionCounts> {
        let mut tx = self.store.begin().await?;
        lock_visible_target(&mut tx, target, RowLock::Update).await?;

        let existing = tx.find_reaction(user_id, target).await?;
        let change = reaction_change(existing, reaction_type);
        let user_reaction = match change {
            ReactionChange::Insert => {
                tx.insert_reaction(user_id, target, reaction_type).await?;
                Some(reaction_type)
            }
            ReactionChange::Remove => {
                tx.delete_reaction(user_id, target).await?;
                None
            }
            ReactionChange::Switch => {
                tx.update_reaction(user_id, target, reaction_type).await?;
                Some(reaction_type)
            }
        };

        let tally = recount::recount_reactions(&mut tx, target).await?;
        tx.commit().await?;

        tracing::debug!(
            %user_id,
            %target,
            ?change,
            upvotes = tally.upvotes,
            downvotes = tally.downvotes,
            "Reaction applied"
        );

        Ok(ReactionCounts::new(target.id, tally, user_reaction))
    }

    /// Stored counters for a target plus the viewer's own reaction, if any.
    pub async fn reaction_counts(
        &self,
        target: ReactionTarget,
        viewer_id: Option<Uuid>,
    ) -> Result<ReactionCounts> {
        let mut tx = self.store.begin().await?;
        lock_visible_target(&mut tx, target, RowLock::Share).await?;

        let tally = tx.stored_reaction_counts(target).await?;
        let user_reaction = match viewer_id {
            Some(user_id) => tx.find_reaction(user_id, target).await?,
            None => None,
        };
        tx.commit().await?;

        Ok(ReactionCounts::new(target.id, tally, user_reaction))
    }

    /// Rebuild a target's reaction counters from the ledger without changing any vote.
    pub async fn reconcile_reactions(&self, target: ReactionTarget) -> Result<ReactionCounts> {
        let mut tx = self.store.begin().await?;
        lock_visible_target(&mut tx, target, RowLock::Update).await?;

        let tally = recount::recount_reactions(&mut tx, target).await?;
        tx.commit().await?;

        tracing::info!(
            %target,
            upvotes = tally.upvotes,
            downvotes = tally.downvotes,
            "Reaction counters reconciled"
        );
        Ok(ReactionCounts::new(target.id, tally, None))
    }
}
