//! Aggregate recalculation.
//!
//! Counters on posts, comments, polls and poll options are always rebuilt by counting the
//! ledger rows of one target inside the caller's transaction, then written back verbatim. The
//! previous counter value is never read here, so a counter that drifted for any reason is
//! repaired by the next recount of its target.

use uuid::Uuid;

use crate::{
    error::Result,
    models::{Poll, PollOption, ReactionTally, ReactionTarget, SideTally},
    store::VoteTx,
};

pub async fn recount_reactions<T: VoteTx>(
    tx: &mut T,
    target: ReactionTarget,
) -> Result<ReactionTally> {
    let tally = tx.count_reactions(target).await?;
    tx.write_reaction_counts(target, tally).await?;
    Ok(tally)
}

pub async fn recount_side_votes<T: VoteTx>(tx: &mut T, post_id: Uuid) -> Result<SideTally> {
    let tally = tx.count_side_votes(post_id).await?;
    tx.write_side_counts(post_id, tally).await?;
    Ok(tally)
}

/// Rebuild every option count and the poll total. Returns the poll and its options carrying
/// the fresh counts, options in display order.
pub async fn recount_poll<T: VoteTx>(
    tx: &mut T,
    mut poll: Poll,
    mut options: Vec<PollOption>,
) -> Result<(Poll, Vec<PollOption>)> {
    let counts = tx.count_option_votes(poll.id).await?;
    for option in &mut options {
        let vote_count = counts
            .iter()
            .find(|(id, _)| *id == option.id)
            .map_or(0, |(_, count)| *count);
        tx.write_option_count(option.id, vote_count).await?;
        option.vote_count = vote_count;
    }

    let total_votes = tx.count_poll_votes(poll.id).await?;
    tx.write_poll_total(poll.id, total_votes).await?;
    poll.total_votes = total_votes;

    Ok((poll, options))
}
