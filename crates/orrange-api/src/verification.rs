use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};

use orrange_types::api::{Claims, VerificationRequest, VerificationStatus};

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;

pub async fn request_verification(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<VerificationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let reason = req.reason.trim().to_string();
    if reason.is_empty() {
        return Err(ApiError::bad_request("A reason is required"));
    }

    let filed = blocking(&state, move |db| db.create_verification_request(claims.sub, &reason)).await?;
    if !filed {
        return Err(ApiError::Conflict("A verification request is already on file".into()));
    }

    Ok((
        StatusCode::CREATED,
        Json(VerificationStatus {
            status: Some("pending".into()),
            is_verified: false,
        }),
    ))
}

pub async fn status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<VerificationStatus>, ApiError> {
    let me = claims.sub;
    let (status, user) = blocking(&state, move |db| -> anyhow::Result<_> {
        Ok((db.verification_status(me)?, db.get_user_by_id(me)?))
    })
    .await?;
    let user = user.ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(VerificationStatus {
        status,
        is_verified: user.is_verified,
    }))
}
