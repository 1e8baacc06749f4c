use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{debug, info, warn};

use orrange_db::models::{CommentRow, PostRow};
use orrange_types::api::{BookmarkResponse, Claims, CreateCommentRequest, CreatePostRequest, LikeResponse};
use orrange_types::events::GatewayEvent;
use orrange_types::models::{Comment, ModerationStatus, Post};

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;
use crate::notifications::notify;
use crate::services::Verdict;

const MEDIA_TYPES: [&str; 3] = ["text", "image", "video"];

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    20
}

impl PageQuery {
    /// (limit, offset), with the limit clamped to 1..=50.
    pub fn window(&self) -> (u32, u32) {
        let limit = self.limit.clamp(1, 50);
        (limit, self.page.max(1).saturating_sub(1).saturating_mul(limit))
    }
}

pub(crate) fn to_posts(rows: Vec<PostRow>) -> Vec<Post> {
    rows.into_iter().map(PostRow::into_post).collect()
}

/// Recommended posts when the recommender answers with something we can
/// show, the chronological feed otherwise.
pub async fn feed(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Post>>, ApiError> {
    let me = claims.sub;
    let (limit, offset) = query.window();

    match state.services.recommend(me, limit, offset).await {
        Ok(mut ids) if !ids.is_empty() => {
            ids.truncate(limit as usize);
            match blocking(&state, move |db| db.posts_by_ids(me, &ids)).await {
                Ok(rows) if !rows.is_empty() => return Ok(Json(to_posts(rows))),
                Ok(_) => debug!("Recommended posts for {} are gone, using chronological feed", me),
                Err(e) => warn!("Could not load recommended posts, using chronological feed: {}", e),
            }
        }
        Ok(_) => debug!("No recommendations for {}, using chronological feed", me),
        Err(e) => warn!("Recommender failed, using chronological feed: {}", e),
    }

    let rows = blocking(&state, move |db| db.chronological_feed(me, limit, offset)).await?;
    Ok(Json(to_posts(rows)))
}

pub async fn create_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreatePostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let content = req.content.trim().to_string();
    if content.is_empty() {
        return Err(ApiError::bad_request("Post content is required"));
    }
    let media_type = req.media_type.unwrap_or_else(|| "text".into());
    if !MEDIA_TYPES.contains(&media_type.as_str()) {
        return Err(ApiError::bad_request("media_type must be text, image or video"));
    }

    let status = match state.services.moderate(&content).await {
        Verdict::Approved => ModerationStatus::Approved,
        Verdict::Rejected(reason) => {
            info!("Post by {} rejected by moderation", claims.sub);
            let message = match reason {
                Some(reason) => format!("Post rejected by moderation: {}", reason),
                None => "Post rejected by moderation".to_string(),
            };
            return Err(ApiError::BadRequest(message));
        }
        Verdict::Unavailable => ModerationStatus::PendingReview,
    };

    let me = claims.sub;
    let image_url = req.image_url;
    let row = blocking(&state, move |db| {
        let id = db.create_post(me, &content, image_url.as_deref(), &media_type, status.as_str())?;
        db.get_post(id, me)
    })
    .await?
    .ok_or_else(ApiError::internal)?;

    Ok((StatusCode::CREATED, Json(row.into_post())))
}

pub async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Post>, ApiError> {
    let post = visible_post(&state, id, claims.sub).await?;
    Ok(Json(post.into_post()))
}

pub async fn delete_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode, ApiError> {
    let owner = blocking(&state, move |db| db.get_post_owner(id))
        .await?
        .ok_or_else(|| ApiError::not_found("Post not found"))?;
    if owner != claims.sub {
        return Err(ApiError::forbidden("You can only delete your own posts"));
    }

    blocking(&state, move |db| db.delete_post(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn toggle_like(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<LikeResponse>, ApiError> {
    let me = claims.sub;
    let post = visible_post(&state, id, me).await?;

    let (liked, likes_count) = blocking(&state, move |db| db.toggle_like(id, me)).await?;

    state.dispatcher.broadcast(GatewayEvent::PostLikeUpdate {
        post_id: id,
        user_id: me,
        liked,
        likes_count,
    });

    if liked && post.author.id != me {
        notify(
            &state,
            post.author.id,
            me,
            "like",
            format!("{} liked your post", claims.username),
            Some(id),
        )
        .await;
    }

    Ok(Json(LikeResponse { liked, likes_count }))
}

pub async fn toggle_bookmark(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<BookmarkResponse>, ApiError> {
    let me = claims.sub;
    visible_post(&state, id, me).await?;
    let bookmarked = blocking(&state, move |db| db.toggle_bookmark(id, me)).await?;
    Ok(Json(BookmarkResponse { bookmarked }))
}

pub async fn list_comments(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Comment>>, ApiError> {
    visible_post(&state, id, claims.sub).await?;
    let rows = blocking(&state, move |db| db.list_comments(id)).await?;
    Ok(Json(rows.into_iter().map(CommentRow::into_comment).collect()))
}

pub async fn create_comment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let content = req.content.trim().to_string();
    if content.is_empty() {
        return Err(ApiError::bad_request("Comment content is required"));
    }

    let me = claims.sub;
    let post = visible_post(&state, id, me).await?;

    let (row, comments_count) = blocking(&state, move |db| db.create_comment(id, me, &content)).await?;
    let comment = row.into_comment();

    state.dispatcher.broadcast(GatewayEvent::PostNewComment {
        post_id: id,
        comment: comment.clone(),
        comments_count,
    });

    if post.author.id != me {
        notify(
            &state,
            post.author.id,
            me,
            "comment",
            format!("{} commented on your post", claims.username),
            Some(id),
        )
        .await;
    }

    Ok((StatusCode::CREATED, Json(comment)))
}

/// The post, if it exists and the viewer may see it.
async fn visible_post(state: &AppState, id: i64, viewer: i64) -> Result<PostRow, ApiError> {
    blocking(state, move |db| db.get_post(id, viewer))
        .await?
        .ok_or_else(|| ApiError::not_found("Post not found"))
}
