pub mod poll_service;
pub mod reaction_service;
pub mod recount;
pub mod side_vote_service;

use std::{future::Future, sync::Arc};

use crate::{
    error::{AppError, Result},
    store::VoteStore,
};

pub const DEFAULT_CONFLICT_RETRIES: u32 = 3;

/// Entry point for every vote operation.
///
/// Each public method is one unit of work against the ledger: it opens a transaction, applies
/// the caller's intent, re-derives the affected counters from the ledger and commits. Callers
/// never see the individual steps.
pub struct VoteEngine<S: VoteStore> {
    store: Arc<S>,
    conflict_retries: u32,
}

impl<S: VoteStore> Clone for VoteEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            conflict_retries: self.conflict_retries,
        }
    }
}

impl<S: VoteStore> VoteEngine<S> {
    pub fn new(store: S) -> Self {
        Self {
            store: Arc::new(store),
            conflict_retries: DEFAULT_CONFLICT_RETRIES,
        }
    }

    pub fn with_conflict_retries(mut self, retries: u32) -> Self {
        self.conflict_retries = retries;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

/// Run `attempt` until it stops failing with [`AppError::Conflict`].
///
/// A conflict means a concurrent request from the same user inserted the ledger row we were
/// about to insert. Re-running the whole unit of work sees that row and turns the insert into
/// an update or delete. Conflicts are never returned: once retries run out the failure is
/// reported as [`AppError::Internal`].
pub(crate) async fn retry_on_conflict<T, F, Fut>(
    operation: &'static str,
    max_retries: u32,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut retries = 0;
    loop {
        match attempt().await {
            Err(AppError::Conflict(reason)) if retries < max_retries => {
                retries += 1;
                tracing::warn!(operation, retries, %reason, "Ledger conflict, retrying");
            }
            Err(AppError::Conflict(reason)) => {
                tracing::error!(operation, retries, %reason, "Ledger conflict persisted");
                return Err(AppError::Internal(format!(
                    "{} kept conflicting after {} retries",
                    operation, retries
                )));
            }
            other => return other,
        }
    }
}
