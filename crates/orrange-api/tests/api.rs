use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use orrange_api::auth::{AppState, AppStateInner};
use orrange_api::ledger::Ledger;
use orrange_api::services::ExternalServices;
use orrange_db::Database;
use orrange_gateway::dispatcher::Dispatcher;
use orrange_types::events::GatewayEvent;

fn test_state() -> AppState {
    Arc::new(AppStateInner {
        db: Arc::new(Database::open_in_memory().unwrap()),
        jwt_secret: "test-secret".into(),
        dispatcher: Dispatcher::new(),
        ledger: Ledger::new(),
        // Nothing listens on port 9, so both services are "down".
        services: ExternalServices::new(
            "http://127.0.0.1:9/recommend",
            "http://127.0.0.1:9/moderate",
            Duration::from_millis(500),
        ),
        starting_coins: 1000,
    })
}

async fn call(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn register(app: &Router, username: &str) -> (i64, String) {
    let (status, body) = call(
        app,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({ "username": username, "password": "correct-horse" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    (body["user_id"].as_i64().unwrap(), body["token"].as_str().unwrap().to_string())
}

#[tokio::test]
async fn register_and_login() {
    let app = orrange_api::router(test_state());
    let (alice, _) = register(&app, "alice").await;

    let (status, body) = call(
        &app,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({ "username": "alice", "password": "another-pass" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "Username already taken");

    let (status, _) = call(
        &app,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({ "username": "bob", "password": "short" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "username": "alice", "password": "wrong-password" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = call(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "username": "alice", "password": "correct-horse" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], alice);

    let token = body["token"].as_str().unwrap();
    let (status, me) = call(&app, "GET", "/api/users/me", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["coins"], 1000);
}

#[tokio::test]
async fn signup_losing_the_unique_race_is_a_conflict() {
    let app = orrange_api::router(test_state());
    let signup = |username: &str| json!({ "username": username, "password": "correct-horse", "email": "shared@example.com" });

    let (status, _) = call(&app, "POST", "/api/auth/register", None, Some(signup("alice"))).await;
    assert_eq!(status, StatusCode::CREATED);

    // Passes the username pre-check, then trips the UNIQUE constraint on insert.
    let (status, body) = call(&app, "POST", "/api/auth/register", None, Some(signup("alicia"))).await;
    assert_eq!(status, StatusCode::CONFLICT, "{}", body);
    assert_eq!(body["message"], "Username or email already taken");
}

#[tokio::test]
async fn routes_require_a_token() {
    let app = orrange_api::router(test_state());
    let (status, body) = call(&app, "GET", "/api/users/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["message"].is_string());

    let (status, _) = call(&app, "GET", "/api/users/me", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn post_is_held_for_review_when_moderation_is_down() {
    let app = orrange_api::router(test_state());
    let (_, token) = register(&app, "alice").await;

    let (status, body) = call(&app, "POST", "/api/posts", Some(&token), Some(json!({ "content": "hello world" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["moderationStatus"], "pending_review");
    assert_eq!(body["content"], "hello world");

    let (status, _) = call(&app, "POST", "/api/posts", Some(&token), Some(json!({ "content": "   " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn feed_falls_back_to_chronological() {
    let state = test_state();
    let app = orrange_api::router(state.clone());
    let (alice, token) = register(&app, "alice").await;
    let first = state.db.create_post(alice, "first", None, "text", "approved").unwrap();
    let second = state.db.create_post(alice, "second", None, "text", "approved").unwrap();

    let (status, body) = call(&app, "GET", "/api/posts?page=1&limit=10", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<i64> = body.as_array().unwrap().iter().map(|p| p["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![second, first]);
}

/// A recommender that always answers with `post_ids`.
async fn recommender_returning(post_ids: Vec<i64>) -> String {
    let app = Router::new().route(
        "/recommend",
        axum::routing::post(move || {
            let post_ids = post_ids.clone();
            async move { axum::Json(json!({ "post_ids": post_ids })) }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/recommend", addr)
}

#[tokio::test]
async fn recommended_feed_is_capped_at_page_size() {
    let db = Database::open_in_memory().unwrap();
    let alice = db.create_user("alice", None, "hash", 0).unwrap();
    let mut posts = Vec::new();
    for n in 0..5 {
        posts.push(db.create_post(alice, &format!("post {}", n), None, "text", "approved").unwrap());
    }

    // Real posts first, then far more ids than SQLite can bind at once.
    let mut recommended: Vec<i64> = posts.iter().rev().copied().collect();
    recommended.extend(1_000_000..1_040_000);
    let url = recommender_returning(recommended).await;

    let state: AppState = Arc::new(AppStateInner {
        db: Arc::new(db),
        jwt_secret: "test-secret".into(),
        dispatcher: Dispatcher::new(),
        ledger: Ledger::new(),
        services: ExternalServices::new(url, "http://127.0.0.1:9/moderate", Duration::from_secs(5)),
        starting_coins: 1000,
    });
    let app = orrange_api::router(state);
    let token = orrange_api::auth::create_token("test-secret", alice, "alice").unwrap();

    let (status, body) = call(&app, "GET", "/api/posts?page=1&limit=3", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let ids: Vec<i64> = body.as_array().unwrap().iter().map(|p| p["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![posts[4], posts[3], posts[2]]);
}

#[tokio::test]
async fn unknown_recommendations_fall_back_to_chronological() {
    let url = recommender_returning((1_000_000..1_000_600).collect()).await;
    let db = Database::open_in_memory().unwrap();
    let alice = db.create_user("alice", None, "hash", 0).unwrap();
    let only = db.create_post(alice, "only", None, "text", "approved").unwrap();

    let state: AppState = Arc::new(AppStateInner {
        db: Arc::new(db),
        jwt_secret: "test-secret".into(),
        dispatcher: Dispatcher::new(),
        ledger: Ledger::new(),
        services: ExternalServices::new(url, "http://127.0.0.1:9/moderate", Duration::from_secs(5)),
        starting_coins: 1000,
    });
    let app = orrange_api::router(state);
    let token = orrange_api::auth::create_token("test-secret", alice, "alice").unwrap();

    let (status, body) = call(&app, "GET", "/api/posts", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["id"], only);
}

#[tokio::test]
async fn like_toggles_and_notifies_author() {
    let state = test_state();
    let app = orrange_api::router(state.clone());
    let (alice, _) = register(&app, "alice").await;
    let (_, bob_token) = register(&app, "bob").await;
    let post = state.db.create_post(alice, "sunset", None, "image", "approved").unwrap();
    let mut events = state.dispatcher.subscribe();

    let uri = format!("/api/posts/{}/like", post);
    let (status, body) = call(&app, "POST", &uri, Some(&bob_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "liked": true, "likesCount": 1 }));

    match events.recv().await.unwrap() {
        GatewayEvent::PostLikeUpdate { post_id, liked, likes_count, .. } => {
            assert_eq!(post_id, post);
            assert!(liked);
            assert_eq!(likes_count, 1);
        }
        other => panic!("unexpected event: {:?}", other),
    }

    let (_, body) = call(&app, "POST", &uri, Some(&bob_token), None).await;
    assert_eq!(body, json!({ "liked": false, "likesCount": 0 }));

    // One notification for the like; unliking does not add another.
    assert_eq!(state.db.unread_notification_count(alice).unwrap(), 1);
}

#[tokio::test]
async fn only_owner_deletes_post() {
    let state = test_state();
    let app = orrange_api::router(state.clone());
    let (alice, alice_token) = register(&app, "alice").await;
    let (_, bob_token) = register(&app, "bob").await;
    let post = state.db.create_post(alice, "mine", None, "text", "approved").unwrap();
    let uri = format!("/api/posts/{}", post);

    let (status, _) = call(&app, "DELETE", &uri, Some(&bob_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(&app, "DELETE", &uri, Some(&alice_token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = call(&app, "GET", &uri, Some(&alice_token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn short_search_returns_nothing() {
    let state = test_state();
    let app = orrange_api::router(state.clone());
    let (_, token) = register(&app, "alice").await;
    register(&app, "alfred").await;

    let (status, body) = call(&app, "GET", "/api/search?q=%20a%20", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "users": [], "posts": [] }));

    let (_, body) = call(&app, "GET", "/api/search?q=al", Some(&token), None).await;
    assert_eq!(body["users"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn failed_purchase_changes_nothing() {
    let state = test_state();
    let app = orrange_api::router(state.clone());
    let (_, seller_token) = register(&app, "seller").await;
    let (_, buyer_token) = register(&app, "buyer").await;

    let (status, listing) = call(
        &app,
        "POST",
        "/api/marketplace",
        Some(&seller_token),
        Some(json!({ "title": "vintage camera", "price": 5000 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let listing_id = listing["id"].as_i64().unwrap();

    let (status, body) = call(&app, "POST", &format!("/api/marketplace/{}/buy", listing_id), Some(&buyer_token), None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "Insufficient coins: balance 1000, price 5000");

    let (_, wallet) = call(&app, "GET", "/api/marketplace/wallet", Some(&buyer_token), None).await;
    assert_eq!(wallet["coins"], 1000);
    let (_, wallet) = call(&app, "GET", "/api/marketplace/wallet", Some(&seller_token), None).await;
    assert_eq!(wallet["coins"], 1000);

    let (_, listing) = call(&app, "GET", &format!("/api/marketplace/{}", listing_id), Some(&buyer_token), None).await;
    assert_eq!(listing["is_sold"], false);
    assert!(state.ledger.entries().is_empty());

    let (status, body) = call(&app, "POST", &format!("/api/marketplace/{}/buy", listing_id), Some(&seller_token), None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "You cannot buy your own listing");
}

#[tokio::test]
async fn purchase_pays_seller_and_records_ledger() {
    let state = test_state();
    let app = orrange_api::router(state.clone());
    let (seller, seller_token) = register(&app, "seller").await;
    let (buyer, buyer_token) = register(&app, "buyer").await;

    let (conn, mut seller_rx) = state.dispatcher.connect().await;
    state.dispatcher.register_user(seller, conn).await;

    let (_, listing) = call(
        &app,
        "POST",
        "/api/marketplace",
        Some(&seller_token),
        Some(json!({ "title": "bike", "price": 250 })),
    )
    .await;
    let listing_id = listing["id"].as_i64().unwrap();

    let (status, body) = call(&app, "POST", &format!("/api/marketplace/{}/buy", listing_id), Some(&buyer_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["buyer_coins"], 750);

    let entries = state.ledger.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].from_user, Some(buyer));
    assert_eq!(entries[0].to_user, Some(seller));
    assert_eq!(body["transaction_hash"], entries[0].hash.as_str());

    let (_, wallet) = call(&app, "GET", "/api/marketplace/wallet", Some(&seller_token), None).await;
    assert_eq!(wallet["coins"], 1250);

    match seller_rx.try_recv().unwrap() {
        GatewayEvent::NewNotification { notification } => assert_eq!(notification.kind, "sale"),
        other => panic!("unexpected event: {:?}", other),
    }

    let (_, ledger) = call(&app, "GET", "/api/blockchain/transactions", Some(&buyer_token), None).await;
    assert_eq!(ledger.as_array().unwrap().len(), 1);
    assert_eq!(ledger[0]["kind"], "purchase");
}

#[tokio::test]
async fn message_reaches_room_once() {
    let state = test_state();
    let app = orrange_api::router(state.clone());
    let (alice, alice_token) = register(&app, "alice").await;
    let (bob, bob_token) = register(&app, "bob").await;
    let (_, carol_token) = register(&app, "carol").await;

    let (status, conversation) = call(
        &app,
        "POST",
        "/api/conversations",
        Some(&alice_token),
        Some(json!({ "participant_ids": [bob] })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let conversation_id = conversation["id"].as_i64().unwrap();

    // Opening the same pair again reuses the conversation.
    let (status, again) = call(
        &app,
        "POST",
        "/api/conversations",
        Some(&bob_token),
        Some(json!({ "participant_ids": [alice] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["id"], conversation_id);

    let (conn, mut bob_rx) = state.dispatcher.connect().await;
    state.dispatcher.register_user(bob, conn).await;
    state.dispatcher.join_room(conn, &format!("conversation:{}", conversation_id)).await;

    let uri = format!("/api/conversations/{}/messages", conversation_id);
    let (status, message) = call(&app, "POST", &uri, Some(&alice_token), Some(json!({ "content": "hi bob" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(message["content"], "hi bob");

    let mut new_messages = 0;
    let mut notifications = 0;
    while let Ok(event) = bob_rx.try_recv() {
        match event {
            GatewayEvent::NewMessage { message } => {
                assert_eq!(message.conversation_id, conversation_id);
                new_messages += 1;
            }
            GatewayEvent::NewNotification { .. } => notifications += 1,
            other => panic!("unexpected event: {:?}", other),
        }
    }
    assert_eq!(new_messages, 1);
    assert_eq!(notifications, 1);

    let (status, _) = call(&app, "GET", &uri, Some(&carol_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call(&app, "POST", &uri, Some(&carol_token), Some(json!({ "content": "let me in" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, history) = call(&app, "GET", &uri, Some(&bob_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn follow_rules() {
    let state = test_state();
    let app = orrange_api::router(state.clone());
    let (alice, alice_token) = register(&app, "alice").await;
    let (bob, _) = register(&app, "bob").await;

    let (status, _) = call(&app, "POST", &format!("/api/users/{}/follow", alice), Some(&alice_token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(&app, "POST", &format!("/api/users/{}/follow", bob), Some(&alice_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["following"], true);
    assert_eq!(state.db.unread_notification_count(bob).unwrap(), 1);

    let (_, followers) = call(&app, "GET", &format!("/api/users/{}/followers", bob), Some(&alice_token), None).await;
    assert_eq!(followers[0]["id"], alice);

    let (status, _) = call(&app, "POST", "/api/users/9999/follow", Some(&alice_token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn reports_and_verification_validate_input() {
    let app = orrange_api::router(test_state());
    let (_, token) = register(&app, "alice").await;

    let (status, _) = call(
        &app,
        "POST",
        "/api/reports",
        Some(&token),
        Some(json!({ "target_type": "planet", "target_id": 1, "reason": "spam" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        "POST",
        "/api/reports",
        Some(&token),
        Some(json!({ "target_type": "post", "target_id": 1, "reason": "spam" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let request = json!({ "reason": "I am famous" });
    let (status, _) = call(&app, "POST", "/api/verification", Some(&token), Some(request.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = call(&app, "POST", "/api/verification", Some(&token), Some(request)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = call(&app, "GET", "/api/verification", Some(&token), None).await;
    assert_eq!(body, json!({ "status": "pending", "is_verified": false }));
}
