use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
};
use uuid::Uuid;

use crate::{
    AppState,
    auth::{AuthUser, OptionalAuthUser},
    error::Result,
    extract::{AppJson, AppPath},
    models::{CreatePollRequest, PollResults, PollVoteRequest},
    store::VoteStore,
};

// Post ownership is checked by the content service before this route is reachable.
pub async fn create_poll<S: VoteStore>(
    State(state): State<AppState<S>>,
    _auth_user: AuthUser,
    AppPath(post_id): AppPath<Uuid>,
    AppJson(payload): AppJson<CreatePollRequest>,
) -> Result<(StatusCode, Json<PollResults>)> {
    let results = state.engine.create_poll(post_id, &payload).await?;
    Ok((StatusCode::CREATED, Json(results)))
}

pub async fn get_poll<S: VoteStore>(
    State(state): State<AppState<S>>,
    viewer: OptionalAuthUser,
    AppPath(poll_id): AppPath<Uuid>,
) -> Result<Json<PollResults>> {
    let results = state.engine.poll_results(poll_id, viewer.user_id()).await?;
    Ok(Json(results))
}

pub async fn vote_poll<S: VoteStore>(
    State(state): State<AppState<S>>,
    auth_user: AuthUser,
    AppPath(poll_id): AppPath<Uuid>,
    AppJson(payload): AppJson<PollVoteRequest>,
) -> Result<Json<PollResults>> {
    let results = state
        .engine
        .vote_poll(auth_user.user_id, poll_id, &payload.option_ids)
        .await?;

    Ok(Json(results))
}
