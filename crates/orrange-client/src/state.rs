use orrange_types::events::GatewayEvent;
use orrange_types::models::{Comment, Post};

use crate::client::{ApiClient, ClientError};
use crate::optimistic::Optimistic;

/// Local view of a single post. Interactions show up immediately and roll
/// back if the server rejects them.
#[derive(Debug, Clone)]
pub struct PostState {
    post: Optimistic<Post>,
}

impl PostState {
    pub fn new(post: Post) -> Self {
        Self {
            post: Optimistic::new(post),
        }
    }

    pub fn current(&self) -> Post {
        self.post.get()
    }

    pub async fn toggle_like(&self, api: &ApiClient) -> Result<(), ClientError> {
        let id = self.post.get().id;
        let confirmed = self
            .post
            .mutate(
                |p| {
                    p.liked = !p.liked;
                    p.likes_count = if p.liked { p.likes_count + 1 } else { (p.likes_count - 1).max(0) };
                },
                || api.toggle_like(id),
            )
            .await?;

        self.post.reconcile(|p| {
            p.liked = confirmed.liked;
            p.likes_count = confirmed.likes_count;
        });
        Ok(())
    }

    pub async fn toggle_bookmark(&self, api: &ApiClient) -> Result<(), ClientError> {
        let id = self.post.get().id;
        let confirmed = self
            .post
            .mutate(|p| p.bookmarked = !p.bookmarked, || api.toggle_bookmark(id))
            .await?;

        self.post.reconcile(|p| p.bookmarked = confirmed.bookmarked);
        Ok(())
    }

    pub async fn add_comment(&self, api: &ApiClient, content: &str) -> Result<Comment, ClientError> {
        let id = self.post.get().id;
        self.post
            .mutate(|p| p.comments_count += 1, || api.add_comment(id, content))
            .await
    }

    /// Fold a live gateway event into the local view. Only counts are taken
    /// from broadcasts; `liked` belongs to whoever triggered the event.
    pub fn apply_event(&self, event: &GatewayEvent) {
        match event {
            GatewayEvent::PostLikeUpdate {
                post_id, likes_count, ..
            } => self.post.reconcile(|p| {
                if p.id == *post_id {
                    p.likes_count = *likes_count;
                }
            }),
            GatewayEvent::PostNewComment {
                post_id, comments_count, ..
            } => self.post.reconcile(|p| {
                if p.id == *post_id {
                    p.comments_count = *comments_count;
                }
            }),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use orrange_types::models::{ModerationStatus, UserSummary};

    use super::*;

    fn sample_post() -> Post {
        Post {
            id: 7,
            author: UserSummary {
                id: 1,
                username: "alice".into(),
                display_name: None,
                avatar_url: None,
                is_verified: false,
            },
            content: "hello".into(),
            image_url: None,
            media_type: "text".into(),
            moderation_status: ModerationStatus::Approved,
            likes_count: 3,
            comments_count: 1,
            liked: false,
            bookmarked: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn unreachable_server_rolls_back_like() {
        let api = ApiClient::new("http://127.0.0.1:9").with_token("t");
        let state = PostState::new(sample_post());

        assert!(state.toggle_like(&api).await.is_err());
        let post = state.current();
        assert!(!post.liked);
        assert_eq!(post.likes_count, 3);

        assert!(state.add_comment(&api, "hi").await.is_err());
        assert_eq!(state.current().comments_count, 1);
    }

    #[test]
    fn events_for_other_posts_are_ignored() {
        let state = PostState::new(sample_post());

        state.apply_event(&GatewayEvent::PostLikeUpdate {
            post_id: 8,
            user_id: 2,
            liked: true,
            likes_count: 99,
        });
        assert_eq!(state.current().likes_count, 3);

        state.apply_event(&GatewayEvent::PostLikeUpdate {
            post_id: 7,
            user_id: 2,
            liked: true,
            likes_count: 4,
        });
        let post = state.current();
        assert_eq!(post.likes_count, 4);
        assert!(!post.liked);
    }
}
