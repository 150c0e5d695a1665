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
    models::{ReactionCounts, ReactionRequest, ReactionTarget},
    store::VoteStore,
};

pub async fn vote_comment<S: VoteStore>(
    State(state): State<AppState<S>>,
    auth_user: AuthUser,
    AppPath(comment_id): AppPath<Uuid>,
    AppJson(payload): AppJson<ReactionRequest>,
) -> Result<Json<ReactionCounts>> {
    let counts = state
        .engine
        .toggle_reaction_str(
            auth_user.user_id,
            ReactionTarget::comment(comment_id),
            &payload.reaction_type,
        )
        .await?;

    Ok(Json(counts))
}

pub async fn get_comment_votes<S: VoteStore>(
    State(state): State<AppState<S>>,
    viewer: OptionalAuthUser,
    AppPath(comment_id): AppPath<Uuid>,
) -> Result<Json<ReactionCounts>> {
    let counts = state
        .engine
        .reaction_counts(ReactionTarget::comment(comment_id), viewer.user_id())
        .await?;

    Ok(Json(counts))
}
