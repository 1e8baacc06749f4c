use axum::{
    Extension, Json,
    extract::State,
};

use orrange_types::api::Claims;
use orrange_types::models::Post;

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;
use crate::posts::to_posts;

/// The caller's bookmarked posts, most recently saved first.
pub async fn list_bookmarks(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Post>>, ApiError> {
    let rows = blocking(&state, move |db| db.list_bookmarks(claims.sub)).await?;
    Ok(Json(to_posts(rows)))
}
