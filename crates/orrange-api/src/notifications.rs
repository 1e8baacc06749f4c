use axum::{
    Extension, Json,
    extract::{Path, State},
};
use tracing::error;

use orrange_db::models::NotificationRow;
use orrange_gateway::dispatcher::Dispatcher;
use orrange_types::api::{Claims, UnreadCountResponse};
use orrange_types::events::GatewayEvent;
use orrange_types::models::Notification;

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;

const LIST_LIMIT: u32 = 50;

/// Push already-stored notifications to their recipients' sockets.
/// Offline recipients simply miss the push.
pub(crate) async fn push(dispatcher: &Dispatcher, rows: impl IntoIterator<Item = NotificationRow>) {
    for row in rows {
        let user_id = row.user_id;
        dispatcher
            .send_to_user(
                user_id,
                GatewayEvent::NewNotification {
                    notification: row.into_notification(),
                },
            )
            .await;
    }
}

/// Store a notification and push it. Failures are logged, not returned:
/// the action that caused the notification has already happened.
pub(crate) async fn notify(
    state: &AppState,
    user_id: i64,
    actor_id: i64,
    kind: &'static str,
    message: String,
    reference_id: Option<i64>,
) {
    let stored = blocking(state, move |db| {
        db.create_notification(user_id, Some(actor_id), kind, &message, reference_id)
    })
    .await;

    match stored {
        Ok(row) => push(&state.dispatcher, [row]).await,
        Err(e) => error!("Failed to store {} notification for {}: {}", kind, user_id, e),
    }
}

pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Notification>>, ApiError> {
    let rows = blocking(&state, move |db| db.list_notifications(claims.sub, LIST_LIMIT)).await?;
    Ok(Json(rows.into_iter().map(NotificationRow::into_notification).collect()))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<UnreadCountResponse>, ApiError> {
    let count = blocking(&state, move |db| db.unread_notification_count(claims.sub)).await?;
    Ok(Json(UnreadCountResponse { count }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let updated = blocking(&state, move |db| db.mark_notification_read(id, claims.sub)).await?;
    if !updated {
        return Err(ApiError::not_found("Notification not found"));
    }
    Ok(Json(serde_json::json!({ "id": id, "is_read": true })))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let updated = blocking(&state, move |db| db.mark_all_notifications_read(claims.sub)).await?;
    Ok(Json(serde_json::json!({ "updated": updated })))
}
