use chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{AppError, Result},
    models::{CreatePollRequest, NewPoll, Poll, PollOption, PollResults, PostRef, PostType},
    store::{RowLock, VoteStore, VoteTx},
};

use super::{VoteEngine, recount, retry_on_conflict};

/// Collapse duplicate ids, keeping the first occurrence of each.
fn dedup_selection(option_ids: &[Uuid]) -> Vec<Uuid> {
    let mut selection = Vec::with_capacity(option_ids.len());
    for id in option_ids {
        if !selection.contains(id) {
            selection.push(*id);
        }
    }
    selection
}

/// Check a selection against poll policy. Checks run in a fixed order and the first failure
/// is reported.
fn check_selection(
    poll: &Poll,
    options: &[PollOption],
    selection: &[Uuid],
    now: DateTime<Utc>,
) -> Result<()> {
    if poll.has_ended_at(now) {
        return Err(AppError::PollEnded);
    }

    if let Some(unknown) = selection
        .iter()
        .find(|id| !options.iter().any(|option| option.id == **id))
    {
        return Err(AppError::InvalidOption(*unknown));
    }

    if !poll.allow_multiple {
        if selection.len() > 1 {
            return Err(AppError::MultipleNotAllowed);
        }
    } else if let Some(max) = poll.max_choices {
        if selection.len() > max.max(0) as usize {
            return Err(AppError::TooManyChoices { max });
        }
    }

    Ok(())
}

/// Lock a poll whose post is still visible.
async fn lock_open_poll<T: VoteTx>(tx: &mut T, poll_id: Uuid, lock: RowLock) -> Result<Poll> {
    let not_found = || AppError::NotFound("Poll not found".to_string());

    let poll = tx.lock_poll(poll_id, lock).await?.ok_or_else(not_found)?;
    let post_visible = tx
        .lock_post(poll.post_id, RowLock::Share)
        .await?
        .is_some_and(|post| post.is_visible());
    if !post_visible {
        return Err(not_found());
    }
    Ok(poll)
}

impl<S: VoteStore> VoteEngine<S> {
    /// Replace the caller's selection on a poll with `option_ids`.
    ///
    /// The submission is the voter's complete selection: every earlier vote of theirs on this
    /// poll is removed first, so an empty list withdraws them from the poll.
    pub async fn vote_poll(
        &self,
        user_id: Uuid,
        poll_id: Uuid,
        option_ids: &[Uuid],
    ) -> Result<PollResults> {
        let selection = dedup_selection(option_ids);
        let selection = selection.as_slice();
        retry_on_conflict("vote_poll", self.conflict_retries, move || {
            self.try_vote_poll(user_id, poll_id, selection)
        })
        .await
    }

    async fn try_vote_poll(
        &self,
        user_id: Uuid,
        poll_id: Uuid,
        selection: &[Uuid],
    ) -> Result<PollResults> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;

        let poll = lock_open_poll(&mut tx, poll_id, RowLock::Update).await?;
        let options = tx.poll_options(poll_id).await?;
        check_selection(&poll, &options, selection, now)?;

        let removed = tx.clear_poll_votes(user_id, poll_id).await?;
        for option_id in selection {
            tx.insert_poll_vote(user_id, poll_id, *option_id).await?;
        }

        let (poll, options) = recount::recount_poll(&mut tx, poll, options).await?;
        tx.commit().await?;

        tracing::debug!(
            %user_id,
            %poll_id,
            removed,
            selected = selection.len(),
            total_votes = poll.total_votes,
            "Poll selection replaced"
        );

        let user_choices = selection_in_option_order(&options, selection);
        Ok(PollResults::new(&poll, &options, user_choices, now))
    }

    /// Attach a poll to a poll-type post.
    pub async fn create_poll(
        &self,
        post_id: Uuid,
        request: &CreatePollRequest,
    ) -> Result<PollResults> {
        request.validate()?;
        retry_on_conflict("create_poll", self.conflict_retries, move || {
            self.try_create_poll(post_id, request)
        })
        .await
    }

    async fn try_create_poll(
        &self,
        post_id: Uuid,
        request: &CreatePollRequest,
    ) -> Result<PollResults> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;

        let post = tx
            .lock_post(post_id, RowLock::Update)
            .await?
            .filter(PostRef::is_visible)
            .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;
        if post.post_type != PostType::Poll {
            return Err(AppError::InvalidArgument(
                "Polls can only be attached to poll posts".to_string(),
            ));
        }
        if tx.find_poll_for_post(post_id).await?.is_some() {
            return Err(AppError::InvalidArgument(
                "This post already has a poll".to_string(),
            ));
        }

        let new_poll = NewPoll::from_request(post_id, request, now);
        tx.insert_poll(&new_poll).await?;
        tx.commit().await?;

        tracing::info!(
            %post_id,
            poll_id = %new_poll.poll.id,
            options = new_poll.options.len(),
            allow_multiple = new_poll.poll.allow_multiple,
            "Poll created"
        );

        Ok(PollResults::new(&new_poll.poll, &new_poll.options, Vec::new(), now))
    }

    pub async fn poll_results(
        &self,
        poll_id: Uuid,
        viewer_id: Option<Uuid>,
    ) -> Result<PollResults> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;

        let poll = lock_open_poll(&mut tx, poll_id, RowLock::Share).await?;
        let options = tx.poll_options(poll_id).await?;
        let user_choices = match viewer_id {
            Some(user_id) => tx.poll_selection(user_id, poll_id).await?,
            None => Vec::new(),
        };
        tx.commit().await?;

        Ok(PollResults::new(&poll, &options, user_choices, now))
    }

    pub async fn reconcile_poll(&self, poll_id: Uuid) -> Result<PollResults> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;

        let poll = lock_open_poll(&mut tx, poll_id, RowLock::Update).await?;
        let options = tx.poll_options(poll_id).await?;
        let (poll, options) = recount::recount_poll(&mut tx, poll, options).await?;
        tx.commit().await?;

        tracing::info!(%poll_id, total_votes = poll.total_votes, "Poll counters reconciled");
        Ok(PollResults::new(&poll, &options, Vec::new(), now))
    }
}

fn selection_in_option_order(options: &[PollOption], selection: &[Uuid]) -> Vec<Uuid> {
    options
        .iter()
        .filter(|option| selection.contains(&option.id))
        .map(|option| option.id)
        .collect()
}
