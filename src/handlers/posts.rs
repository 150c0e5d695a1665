use axum::{
    extract::State,
    response::Json,
};
use uuid::Uuid;

use crate::{
    AppState,
    auth::{AuthUser, OptionalAuthUser},
    error::Result,
    extract::{AppJson, AppPath},
    models::{ReactionCounts, ReactionRequest, ReactionTarget, SideCounts, SideVoteRequest},
    store::VoteStore,
};

pub async fn vote_post<S: VoteStore>(
    State(state): State<AppState<S>>,
    auth_user: AuthUser,
    AppPath(post_id): AppPath<Uuid>,
    AppJson(payload): AppJson<ReactionRequest>,
) -> Result<Json<ReactionCounts>> {
    let counts = state
        .engine
        .toggle_reaction_str(
            auth_user.user_id,
            ReactionTarget::post(post_id),
            &payload.reaction_type,
        )
        .await?;

    Ok(Json(counts))
}

pub async fn get_post_votes<S: VoteStore>(
    State(state): State<AppState<S>>,
    viewer: OptionalAuthUser,
    AppPath(post_id): AppPath<Uuid>,
) -> Result<Json<ReactionCounts>> {
    let counts = state
        .engine
        .reaction_counts(ReactionTarget::post(post_id), viewer.user_id())
        .await?;

    Ok(Json(counts))
}

pub async fn vote_side<S: VoteStore>(
    State(state): State<AppState<S>>,
    auth_user: AuthUser,
    AppPath(post_id): AppPath<Uuid>,
    AppJson(payload): AppJson<SideVoteRequest>,
) -> Result<Json<SideCounts>> {
    let counts = state
        .engine
        .vote_side_str(auth_user.user_id, post_id, &payload.side)
        .await?;

    Ok(Json(counts))
}

pub async fn get_side_votes<S: VoteStore>(
    State(state): State<AppState<S>>,
    viewer: OptionalAuthUser,
    AppPath(post_id): AppPath<Uuid>,
) -> Result<Json<SideCounts>> {
    let counts = state.engine.side_counts(post_id, viewer.user_id()).await?;
    Ok(Json(counts))
}
