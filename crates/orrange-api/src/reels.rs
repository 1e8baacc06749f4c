use axum::{
    Extension, Json,
    extract::{Query, State},
};

use orrange_types::api::Claims;
use orrange_types::models::Post;

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;
use crate::posts::{PageQuery, to_posts};

/// Approved video posts, newest first.
pub async fn list_reels(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Post>>, ApiError> {
    let (limit, offset) = query.window();
    let rows = blocking(&state, move |db| db.reels(claims.sub, limit, offset)).await?;
    Ok(Json(to_posts(rows)))
}
