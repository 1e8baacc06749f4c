//! Drives the client against a real server bound to a random local port.

use std::sync::Arc;
use std::time::Duration;

use orrange_api::auth::{AppState, AppStateInner};
use orrange_api::ledger::Ledger;
use orrange_api::services::ExternalServices;
use orrange_client::{ApiClient, ClientError, PostState};
use orrange_db::Database;
use orrange_gateway::dispatcher::Dispatcher;
use orrange_types::api::{RegisterRequest, RegisterResponse};

async fn spawn_server() -> (String, Arc<Database>) {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let state: AppState = Arc::new(AppStateInner {
        db: db.clone(),
        jwt_secret: "live-secret".into(),
        dispatcher: Dispatcher::new(),
        ledger: Ledger::new(),
        services: ExternalServices::new(
            "http://127.0.0.1:9/recommend",
            "http://127.0.0.1:9/moderate",
            Duration::from_millis(300),
        ),
        starting_coins: 1000,
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, orrange_api::router(state)).await.unwrap();
    });

    (format!("http://{}", addr), db)
}

async fn register(base: &str, username: &str) -> RegisterResponse {
    let body = RegisterRequest {
        username: username.into(),
        password: "correct-horse".into(),
        email: None,
    };
    reqwest::Client::new()
        .post(format!("{}/api/auth/register", base))
        .json(&body)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn like_bookmark_and_comment_reconcile_with_server() {
    let (base, db) = spawn_server().await;
    let alice = register(&base, "alice").await;
    register(&base, "bobby").await;
    db.create_post(alice.user_id, "first post", None, "text", "approved")
        .unwrap();

    let mut api = ApiClient::new(&base);
    api.login("bobby", "correct-horse").await.unwrap();

    let feed = api.feed(1, 20).await.unwrap();
    assert_eq!(feed.len(), 1);
    let state = PostState::new(feed[0].clone());

    state.toggle_like(&api).await.unwrap();
    let post = state.current();
    assert!(post.liked);
    assert_eq!(post.likes_count, 1);

    state.toggle_bookmark(&api).await.unwrap();
    assert!(state.current().bookmarked);

    let comment = state.add_comment(&api, "nice").await.unwrap();
    assert_eq!(comment.content, "nice");
    assert_eq!(state.current().comments_count, 1);

    state.toggle_like(&api).await.unwrap();
    let post = state.current();
    assert!(!post.liked);
    assert_eq!(post.likes_count, 0);
}

#[tokio::test]
async fn rejected_mutation_rolls_back() {
    let (base, db) = spawn_server().await;
    let alice = register(&base, "alice").await;
    let post_id = db
        .create_post(alice.user_id, "soon gone", None, "text", "approved")
        .unwrap();

    let mut api = ApiClient::new(&base);
    api.login("alice", "correct-horse").await.unwrap();
    let state = PostState::new(api.feed(1, 20).await.unwrap().remove(0));
    assert_eq!(state.current().id, post_id);

    // Deleted behind our back: the server answers 404.
    db.delete_post(post_id).unwrap();

    let err = state.toggle_like(&api).await.unwrap_err();
    assert!(matches!(err, ClientError::Api { status, .. } if status == reqwest::StatusCode::NOT_FOUND));
    let post = state.current();
    assert!(!post.liked);
    assert_eq!(post.likes_count, 0);
}

#[tokio::test]
async fn bad_login_reports_server_message() {
    let (base, _db) = spawn_server().await;
    register(&base, "alice").await;

    let mut api = ApiClient::new(&base);
    let err = api.login("alice", "wrong-password").await.unwrap_err();
    match err {
        ClientError::Api { status, message } => {
            assert_eq!(status, reqwest::StatusCode::UNAUTHORIZED);
            assert!(!message.is_empty());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(api.token().is_none());
}
