pub mod auth;
pub mod bookmarks;
pub mod conversations;
pub mod error;
pub mod events;
pub mod highlights;
pub mod ledger;
pub mod marketplace;
pub mod middleware;
pub mod nfts;
pub mod notifications;
pub mod posts;
pub mod reels;
pub mod reports;
pub mod search;
pub mod services;
pub mod stories;
pub mod subscriptions;
pub mod uploads;
pub mod users;
pub mod verification;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{delete, get, post, put},
};
use tracing::error;

use orrange_db::Database;
use orrange_gateway::connection;

use crate::auth::AppState;
use crate::error::ApiError;

/// Run blocking storage work off the async runtime.
pub(crate) async fn blocking<F, T, E>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<ApiError> + Send + 'static,
{
    let db = state.db.clone();
    tokio::task::spawn_blocking(move || f(db.as_ref()))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::internal()
        })?
        .map_err(Into::into)
}

/// Every REST route, the auth middleware, and the `/ws` gateway.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login));

    let protected_routes = Router::new()
        .route("/api/users/me", get(users::me).put(users::update_me))
        .route("/api/users/{id}", get(users::get_user))
        .route("/api/users/{id}/follow", post(users::toggle_follow))
        .route("/api/users/{id}/followers", get(users::followers))
        .route("/api/users/{id}/following", get(users::following))
        .route("/api/users/{id}/posts", get(users::posts))
        .route("/api/posts", get(posts::feed).post(posts::create_post))
        .route("/api/posts/{id}", get(posts::get_post).delete(posts::delete_post))
        .route("/api/posts/{id}/like", post(posts::toggle_like))
        .route("/api/posts/{id}/bookmark", post(posts::toggle_bookmark))
        .route("/api/posts/{id}/comments", get(posts::list_comments).post(posts::create_comment))
        .route("/api/bookmarks", get(bookmarks::list_bookmarks))
        .route("/api/search", get(search::search))
        .route(
            "/api/conversations",
            get(conversations::list_conversations).post(conversations::create_conversation),
        )
        .route(
            "/api/conversations/{id}/messages",
            get(conversations::get_messages).post(conversations::send_message),
        )
        .route("/api/marketplace", get(marketplace::list_listings).post(marketplace::create_listing))
        .route("/api/marketplace/wallet", get(marketplace::wallet))
        .route("/api/marketplace/{id}", get(marketplace::get_listing))
        .route("/api/marketplace/{id}/buy", post(marketplace::buy))
        .route("/api/nfts", get(nfts::list_nfts).post(nfts::mint))
        .route("/api/nfts/mine", get(nfts::my_nfts))
        .route("/api/nfts/{id}/transfer", post(nfts::transfer))
        .route("/api/blockchain/transactions", get(ledger::transactions))
        .route("/api/notifications", get(notifications::list_notifications))
        .route("/api/notifications/unread-count", get(notifications::unread_count))
        .route("/api/notifications/read-all", put(notifications::mark_all_read))
        .route("/api/notifications/{id}/read", put(notifications::mark_read))
        .route("/api/events", get(events::list_events).post(events::create_event))
        .route("/api/events/{id}/attend", post(events::toggle_attendance))
        .route("/api/highlights", post(highlights::create_highlight))
        .route("/api/highlights/user/{id}", get(highlights::list_highlights))
        .route("/api/highlights/{id}", delete(highlights::delete_highlight))
        .route("/api/stories", get(stories::list_stories).post(stories::create_story))
        .route("/api/stories/{id}/react", post(stories::react))
        .route("/api/reels", get(reels::list_reels))
        .route("/api/reports", post(reports::create_report))
        .route("/api/subscriptions", get(subscriptions::list_subscriptions))
        .route("/api/subscriptions/{creator_id}", post(subscriptions::subscribe))
        .route(
            "/api/verification",
            get(verification::status).post(verification::request_verification),
        )
        .route("/api/uploads", post(uploads::upload))
        .route_layer(from_fn_with_state(state.clone(), middleware::require_auth));

    let ws_route = Router::new().route("/ws", get(ws_upgrade));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .with_state(state)
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let dispatcher = state.dispatcher.clone();
    let db = state.db.clone();
    let jwt_secret = state.jwt_secret.clone();
    ws.on_upgrade(move |socket| connection::handle_connection(socket, dispatcher, db, jwt_secret))
}
