use axum::{
    Extension, Json,
    extract::{Path, State},
};

use orrange_db::models::{AuthorRow, ProfileRow};
use orrange_types::api::{Claims, FollowResponse, UpdateProfileRequest};
use orrange_types::models::{Post, UserProfile, UserSummary};

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;
use crate::notifications::notify;
use crate::posts::to_posts;

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<UserProfile>, ApiError> {
    profile(&state, claims.sub, claims.sub).await.map(Json)
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<UserProfile>, ApiError> {
    profile(&state, id, claims.sub).await.map(Json)
}

pub async fn update_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<UserProfile>, ApiError> {
    let me = claims.sub;
    blocking(&state, move |db| {
        db.update_profile(
            me,
            req.display_name.as_deref(),
            req.bio.as_deref(),
            req.avatar_url.as_deref(),
        )
    })
    .await?;

    profile(&state, me, me).await.map(Json)
}

pub async fn toggle_follow(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<FollowResponse>, ApiError> {
    let me = claims.sub;
    if id == me {
        return Err(ApiError::bad_request("You cannot follow yourself"));
    }
    ensure_user(&state, id).await?;

    let following = blocking(&state, move |db| db.toggle_follow(me, id)).await?;
    if following {
        notify(
            &state,
            id,
            me,
            "follow",
            format!("{} started following you", claims.username),
            Some(me),
        )
        .await;
    }

    Ok(Json(FollowResponse { following }))
}

pub async fn followers(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    ensure_user(&state, id).await?;
    let rows = blocking(&state, move |db| db.list_followers(id)).await?;
    Ok(Json(rows.into_iter().map(AuthorRow::into_summary).collect()))
}

pub async fn following(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    ensure_user(&state, id).await?;
    let rows = blocking(&state, move |db| db.list_following(id)).await?;
    Ok(Json(rows.into_iter().map(AuthorRow::into_summary).collect()))
}

pub async fn posts(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Post>>, ApiError> {
    let me = claims.sub;
    ensure_user(&state, id).await?;
    let rows = blocking(&state, move |db| db.user_posts(id, me)).await?;
    Ok(Json(to_posts(rows)))
}

async fn profile(state: &AppState, id: i64, viewer: i64) -> Result<UserProfile, ApiError> {
    blocking(state, move |db| db.get_profile(id, viewer))
        .await?
        .map(ProfileRow::into_profile)
        .ok_or_else(|| ApiError::not_found("User not found"))
}

/// 404 unless the user exists.
pub(crate) async fn ensure_user(state: &AppState, id: i64) -> Result<AuthorRow, ApiError> {
    blocking(state, move |db| db.get_author(id))
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))
}
