use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use orrange_db::models::StoryRow;
use orrange_types::api::{Claims, CreateStoryRequest, StoryReactionRequest};
use orrange_types::models::Story;

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;

/// Unexpired stories from the caller and everyone they follow.
pub async fn list_stories(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Story>>, ApiError> {
    let rows = blocking(&state, move |db| db.active_stories(claims.sub)).await?;
    Ok(Json(rows.into_iter().map(StoryRow::into_story).collect()))
}

pub async fn create_story(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateStoryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let media_url = req.media_url.trim().to_string();
    if media_url.is_empty() {
        return Err(ApiError::bad_request("media_url is required"));
    }

    let row = blocking(&state, move |db| {
        db.create_story(claims.sub, &media_url, req.caption.as_deref())
    })
    .await?;

    Ok((StatusCode::CREATED, Json(row.into_story())))
}

pub async fn react(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<StoryReactionRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let emoji = req.emoji.trim().to_string();
    if emoji.is_empty() {
        return Err(ApiError::bad_request("emoji is required"));
    }

    let me = claims.sub;
    let stored = emoji.clone();
    let found = blocking(&state, move |db| -> anyhow::Result<bool> {
        if !db.story_exists(id)? {
            return Ok(false);
        }
        db.react_to_story(id, me, &stored)?;
        Ok(true)
    })
    .await?;

    if !found {
        return Err(ApiError::not_found("Story not found"));
    }
    Ok(Json(serde_json::json!({ "story_id": id, "emoji": emoji })))
}
