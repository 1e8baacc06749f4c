use std::collections::BTreeSet;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::debug;

use orrange_db::models::{ConversationRow, MessageRow};
use orrange_types::api::{Claims, CreateConversationRequest, SendMessageRequest};
use orrange_types::events::{GatewayEvent, conversation_room};
use orrange_types::models::{Conversation, Message};

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;
use crate::notifications::push;
use crate::users::ensure_user;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    50
}

pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Conversation>>, ApiError> {
    let rows = blocking(&state, move |db| db.list_conversations(claims.sub)).await?;
    Ok(Json(rows.into_iter().map(ConversationRow::into_conversation).collect()))
}

/// Open a conversation with the given users. A 1:1 conversation that
/// already exists for the pair is returned instead of creating another.
pub async fn create_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateConversationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let me = claims.sub;
    let mut participants: BTreeSet<i64> = req.participant_ids.into_iter().collect();
    participants.insert(me);
    if participants.len() < 2 {
        return Err(ApiError::bad_request("A conversation needs at least one other participant"));
    }
    for &id in &participants {
        if id != me {
            ensure_user(&state, id).await?;
        }
    }

    let ids: Vec<i64> = participants.into_iter().collect();
    let (conversation_id, created) = blocking(&state, move |db| -> anyhow::Result<(i64, bool)> {
        if let &[a, b] = ids.as_slice() {
            if let Some(existing) = db.find_direct_conversation(a, b)? {
                return Ok((existing, false));
            }
        }
        Ok((db.create_conversation(&ids)?, true))
    })
    .await?;

    let row = blocking(&state, move |db| db.get_conversation(conversation_id))
        .await?
        .ok_or_else(ApiError::internal)?;

    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(row.into_conversation())))
}

pub async fn get_messages(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<MessageQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Message>>, ApiError> {
    ensure_participant(&state, id, claims.sub).await?;

    let limit = query.limit.clamp(1, 200);
    let rows = blocking(&state, move |db| db.list_messages(id, limit)).await?;
    Ok(Json(rows.into_iter().map(MessageRow::into_message).collect()))
}

/// Store a message, emit it once to the conversation room, and notify
/// every other participant.
pub async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let content = req.content.trim().to_string();
    if content.is_empty() {
        return Err(ApiError::bad_request("Message content is required"));
    }

    let me = claims.sub;
    ensure_participant(&state, id, me).await?;

    let (row, notifications) = blocking(&state, move |db| db.insert_message(id, me, &content)).await?;
    let message = row.into_message();

    let delivered = state
        .dispatcher
        .emit_to_room(&conversation_room(id), GatewayEvent::NewMessage { message: message.clone() })
        .await;
    debug!("Message {} delivered to {} connections", message.id, delivered);

    push(&state.dispatcher, notifications).await;

    Ok((StatusCode::CREATED, Json(message)))
}

async fn ensure_participant(state: &AppState, conversation_id: i64, user_id: i64) -> Result<(), ApiError> {
    if blocking(state, move |db| db.is_participant(conversation_id, user_id)).await? {
        Ok(())
    } else {
        Err(ApiError::forbidden("You are not a participant in this conversation"))
    }
}
