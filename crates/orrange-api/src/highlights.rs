use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use orrange_db::models::HighlightRow;
use orrange_types::api::{Claims, CreateHighlightRequest};
use orrange_types::models::Highlight;

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;

pub async fn list_highlights(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<Highlight>>, ApiError> {
    let rows = blocking(&state, move |db| db.list_highlights(user_id)).await?;
    Ok(Json(rows.into_iter().map(HighlightRow::into_highlight).collect()))
}

pub async fn create_highlight(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateHighlightRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let title = req.title.trim().to_string();
    if title.is_empty() {
        return Err(ApiError::bad_request("Highlight title is required"));
    }

    let row = blocking(&state, move |db| {
        db.create_highlight(claims.sub, &title, req.cover_url.as_deref())
    })
    .await?;

    Ok((StatusCode::CREATED, Json(row.into_highlight())))
}

pub async fn delete_highlight(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode, ApiError> {
    let owner = blocking(&state, move |db| db.get_highlight_owner(id))
        .await?
        .ok_or_else(|| ApiError::not_found("Highlight not found"))?;
    if owner != claims.sub {
        return Err(ApiError::forbidden("You can only delete your own highlights"));
    }

    blocking(&state, move |db| db.delete_highlight(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
