use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use orrange_types::api::{Claims, CreateReportRequest};

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;

const TARGET_TYPES: [&str; 4] = ["post", "comment", "user", "listing"];

pub async fn create_report(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateReportRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !TARGET_TYPES.contains(&req.target_type.as_str()) {
        return Err(ApiError::bad_request("target_type must be post, comment, user or listing"));
    }
    let reason = req.reason.trim().to_string();
    if reason.is_empty() {
        return Err(ApiError::bad_request("A reason is required"));
    }

    let me = claims.sub;
    let target_type = req.target_type;
    let target_id = req.target_id;
    let kind = target_type.clone();
    let id = blocking(&state, move |db| db.create_report(me, &kind, target_id, &reason)).await?;
    info!("Report {} filed by {} against {} {}", id, me, target_type, target_id);

    Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": id, "status": "open" }))))
}
