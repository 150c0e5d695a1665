use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use discussion_votes::{
    AppState,
    auth::Claims,
    config::Config,
    create_app,
    models::{PostStatus, PostType},
    store::MemoryVoteStore,
};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

const SECRET: &str = "test-secret";

struct TestApp {
    router: Router,
    store: MemoryVoteStore,
}

impl TestApp {
    fn new() -> Self {
        let store = MemoryVoteStore::new();
        let state = AppState::new(store.clone(), Config::local(SECRET));
        Self {
            router: create_app(state),
            store,
        }
    }

    async fn send(
        &self,
        method: &str,
        uri: &str,
        user: Option<Uuid>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(user_id) = user {
            let (token, _) = Claims::new(user_id, SECRET).unwrap();
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }
}

#[tokio::test]
async fn health_is_public() {
    let app = TestApp::new();
    let (status, body) = app.send("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn post_reaction_round_trip() {
    let app = TestApp::new();
    let post_id = app.store.add_post(PostType::Text).await;
    let user = Uuid::new_v4();
    let uri = format!("/api/posts/{post_id}/vote");

    let (status, body) = app
        .send("POST", &uri, Some(user), Some(json!({ "reaction_type": "UPVOTE" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["upvotes"], 1);
    assert_eq!(body["downvotes"], 0);
    assert_eq!(body["user_reaction"], "UPVOTE");

    let (_, body) = app
        .send("POST", &uri, Some(user), Some(json!({ "reaction_type": "UPVOTE" })))
        .await;
    assert_eq!(body["upvotes"], 0);
    assert_eq!(body["user_reaction"], Value::Null);

    let (_, body) = app
        .send("POST", &uri, Some(user), Some(json!({ "reaction_type": "DOWNVOTE" })))
        .await;
    assert_eq!(body["downvotes"], 1);

    let (status, body) = app
        .send("GET", &format!("/api/posts/{post_id}/votes"), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["downvotes"], 1);
    assert_eq!(body["score"], -1);
}

#[tokio::test]
async fn voting_requires_a_token() {
    let app = TestApp::new();
    let post_id = app.store.add_post(PostType::Text).await;

    let (status, body) = app
        .send(
            "POST",
            &format!("/api/posts/{post_id}/vote"),
            None,
            Some(json!({ "reaction_type": "UPVOTE" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHENTICATED");
}

#[tokio::test]
async fn errors_carry_stable_reason_codes() {
    let app = TestApp::new();
    let post_id = app.store.add_post(PostType::Text).await;
    let user = Uuid::new_v4();

    let (status, body) = app
        .send(
            "POST",
            &format!("/api/posts/{post_id}/vote"),
            Some(user),
            Some(json!({ "reaction_type": "MEH" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_ARGUMENT");

    let (status, body) = app
        .send(
            "POST",
            &format!("/api/comments/{}/vote", Uuid::new_v4()),
            Some(user),
            Some(json!({ "reaction_type": "UPVOTE" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let (status, body) = app
        .send(
            "POST",
            &format!("/api/posts/{post_id}/side-vote"),
            Some(user),
            Some(json!({ "side": "A" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_ARGUMENT");
}

#[tokio::test]
async fn vs_post_side_votes() {
    let app = TestApp::new();
    let post_id = app.store.add_post(PostType::Vs).await;
    let uri = format!("/api/posts/{post_id}/side-vote");
    let (u1, u2) = (Uuid::new_v4(), Uuid::new_v4());

    app.send("POST", &uri, Some(u1), Some(json!({ "side": "A" }))).await;
    app.send("POST", &uri, Some(u2), Some(json!({ "side": "B" }))).await;
    let (status, body) = app
        .send("POST", &uri, Some(u1), Some(json!({ "side": "B" })))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["votes_a"], 0);
    assert_eq!(body["votes_b"], 2);
    assert_eq!(body["user_side"], "B");

    let (_, body) = app
        .send("GET", &format!("/api/posts/{post_id}/side-votes"), Some(u2), None)
        .await;
    assert_eq!(body["user_side"], "B");
}

#[tokio::test]
async fn poll_lifecycle_over_http() {
    let app = TestApp::new();
    let post_id = app.store.add_post(PostType::Poll).await;
    let author = Uuid::new_v4();
    let voter = Uuid::new_v4();

    let (status, created) = app
        .send(
            "POST",
            &format!("/api/posts/{post_id}/poll"),
            Some(author),
            Some(json!({
                "options": ["tea", "coffee", "water"],
                "allow_multiple": true,
                "max_choices": 2
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let poll_id = created["poll_id"].as_str().unwrap().to_string();
    let option_ids: Vec<String> = created["options"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(created["options"][2]["order"], 2);

    let vote_uri = format!("/api/polls/{poll_id}/vote");
    let (status, body) = app
        .send("POST", &vote_uri, Some(voter), Some(json!({ "option_ids": option_ids })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "TOO_MANY_CHOICES");

    let (status, body) = app
        .send(
            "POST",
            &vote_uri,
            Some(voter),
            Some(json!({ "option_ids": [option_ids[0], option_ids[1]] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_votes"], 2);
    assert_eq!(body["options"][0]["percentage"], 50);

    let (status, body) = app
        .send(
            "POST",
            &vote_uri,
            Some(voter),
            Some(json!({ "option_ids": [Uuid::new_v4()] })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_OPTION");

    let (_, body) = app
        .send("GET", &format!("/api/polls/{poll_id}"), Some(voter), None)
        .await;
    assert_eq!(body["user_choices"].as_array().unwrap().len(), 2);

    let (_, body) = app
        .send("POST", &vote_uri, Some(voter), Some(json!({ "option_ids": [] })))
        .await;
    assert_eq!(body["total_votes"], 0);
}

#[tokio::test]
async fn invalid_poll_definition_is_a_validation_error() {
    let app = TestApp::new();
    let post_id = app.store.add_post(PostType::Poll).await;

    let (status, body) = app
        .send(
            "POST",
            &format!("/api/posts/{post_id}/poll"),
            Some(Uuid::new_v4()),
            Some(json!({ "options": ["only", "two"] })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_FAILED");
}

#[tokio::test]
async fn malformed_paths_and_bodies_carry_a_reason_code() {
    let app = TestApp::new();
    let post_id = app.store.add_post(PostType::Poll).await;
    let user = Uuid::new_v4();
    let (_, created) = app
        .send(
            "POST",
            &format!("/api/posts/{post_id}/poll"),
            Some(user),
            Some(json!({ "options": ["a", "b", "c"] })),
        )
        .await;
    let poll_id = created["poll_id"].as_str().unwrap().to_string();

    let cases = [
        (
            format!("/api/polls/{poll_id}/vote"),
            json!({ "option_ids": ["not-a-uuid"] }),
        ),
        (
            format!("/api/posts/{post_id}/vote"),
            json!({ "reaction_type": 5 }),
        ),
        (
            "/api/posts/not-a-uuid/vote".to_string(),
            json!({ "reaction_type": "UPVOTE" }),
        ),
    ];
    for (uri, body) in cases {
        let (status, body) = app.send("POST", &uri, Some(user), Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["code"], "INVALID_ARGUMENT", "{uri}");
        assert_eq!(body["status"], 400, "{uri}");
    }

    let (status, body) = app
        .send("GET", "/api/polls/not-a-uuid", None, None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_ARGUMENT");
}

#[tokio::test]
async fn comment_under_removed_post_rejects_reactions() {
    let app = TestApp::new();
    let post_id = app.store.add_post(PostType::Text).await;
    let comment_id = app.store.add_comment(post_id).await;
    app.store
        .set_post_status(post_id, PostStatus::Removed)
        .await;

    let (status, body) = app
        .send(
            "POST",
            &format!("/api/comments/{comment_id}/vote"),
            Some(Uuid::new_v4()),
            Some(json!({ "reaction_type": "UPVOTE" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}
