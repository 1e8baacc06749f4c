use axum::{
    Extension, Json,
    extract::{Query, State},
};
use serde::Deserialize;

use orrange_db::models::AuthorRow;
use orrange_types::api::{Claims, SearchResponse};

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;
use crate::posts::to_posts;

/// Results per category.
const SEARCH_LIMIT: u32 = 20;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

/// Queries shorter than two characters return nothing without hitting the database.
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<SearchResponse>, ApiError> {
    let term = query.q.trim().to_string();
    if term.chars().count() < 2 {
        return Ok(Json(SearchResponse {
            users: vec![],
            posts: vec![],
        }));
    }

    let me = claims.sub;
    let (users, posts) = blocking(&state, move |db| -> anyhow::Result<_> {
        let users = db.search_users(&term, SEARCH_LIMIT)?;
        let posts = db.search_posts(&term, me, SEARCH_LIMIT)?;
        Ok((users, posts))
    })
    .await?;

    Ok(Json(SearchResponse {
        users: users.into_iter().map(AuthorRow::into_summary).collect(),
        posts: to_posts(posts),
    }))
}
