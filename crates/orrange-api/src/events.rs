use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use orrange_db::models::EventRow;
use orrange_types::api::{AttendResponse, Claims, CreateEventRequest};
use orrange_types::models::Event;

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;

/// Dated events soonest first, undated ones last.
pub async fn list_events(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Event>>, ApiError> {
    let rows = blocking(&state, move |db| db.list_events(claims.sub)).await?;
    Ok(Json(rows.into_iter().map(EventRow::into_event).collect()))
}

pub async fn create_event(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateEventRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let title = req.title.trim().to_string();
    if title.is_empty() {
        return Err(ApiError::bad_request("Event title is required"));
    }

    let me = claims.sub;
    let row = blocking(&state, move |db| {
        let id = db.create_event(
            me,
            &title,
            req.description.as_deref(),
            req.location.as_deref(),
            req.starts_at.as_deref(),
        )?;
        db.get_event(id, me)
    })
    .await?
    .ok_or_else(ApiError::internal)?;

    Ok((StatusCode::CREATED, Json(row.into_event())))
}

pub async fn toggle_attendance(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<AttendResponse>, ApiError> {
    let me = claims.sub;
    blocking(&state, move |db| db.get_event(id, me))
        .await?
        .ok_or_else(|| ApiError::not_found("Event not found"))?;

    let attending = blocking(&state, move |db| db.toggle_attendance(id, me)).await?;
    Ok(Json(AttendResponse { attending }))
}
