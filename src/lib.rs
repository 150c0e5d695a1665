pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod models;
pub mod services;
pub mod store;

use axum::{
    Json, Router,
    http::{
        HeaderValue, Method,
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    },
    routing::{get, post},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{config::Config, services::VoteEngine, store::VoteStore};

pub struct AppState<S: VoteStore> {
    pub engine: Arc<VoteEngine<S>>,
    pub config: Arc<Config>,
}

// Manual impl: a derive would demand `S: Clone`.
impl<S: VoteStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S: VoteStore> AppState<S> {
    pub fn new(store: S, config: Config) -> Self {
        let engine = VoteEngine::new(store).with_conflict_retries(config.vote_conflict_retries);
        Self {
            engine: Arc::new(engine),
            config: Arc::new(config),
        }
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub fn create_app<S: VoteStore>(state: AppState<S>) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid allowed origin: {}", origin);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([AUTHORIZATION, ACCEPT, CONTENT_TYPE]);

    let vote_routes = Router::new()
        // Post reactions
        .route(
            "/api/posts/{post_id}/vote",
            post(handlers::posts::vote_post::<S>),
        )
        .route(
            "/api/posts/{post_id}/votes",
            get(handlers::posts::get_post_votes::<S>),
        )
        // VS side votes
        .route(
            "/api/posts/{post_id}/side-vote",
            post(handlers::posts::vote_side::<S>),
        )
        .route(
            "/api/posts/{post_id}/side-votes",
            get(handlers::posts::get_side_votes::<S>),
        )
        // Comment reactions
        .route(
            "/api/comments/{comment_id}/vote",
            post(handlers::comments::vote_comment::<S>),
        )
        .route(
            "/api/comments/{comment_id}/votes",
            get(handlers::comments::get_comment_votes::<S>),
        )
        // Polls
        .route(
            "/api/posts/{post_id}/poll",
            post(handlers::polls::create_poll::<S>),
        )
        .route("/api/polls/{poll_id}", get(handlers::polls::get_poll::<S>))
        .route(
            "/api/polls/{poll_id}/vote",
            post(handlers::polls::vote_poll::<S>),
        );

    Router::new()
        .route("/health", get(health))
        .merge(vote_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
