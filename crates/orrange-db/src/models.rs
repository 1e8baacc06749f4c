//! Database row types. These map directly to SQLite rows; each converts
//! into the matching `orrange_types::models` type for the wire.

use chrono::{DateTime, Utc};
use orrange_types::models::{
    Comment, Conversation, Event, Highlight, Listing, Message, ModerationStatus, Nft, Notification, Post, Story,
    Subscription, UserProfile, UserSummary,
};
use tracing::warn;

/// SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without timezone.
/// Parse as naive UTC; fall back to RFC 3339 for values written by callers.
pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map(|ndt| ndt.and_utc())
        .or_else(|_| raw.parse::<DateTime<Utc>>())
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}

#[derive(Debug)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub password: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub coins: i64,
    pub is_verified: bool,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct AuthorRow {
    pub id: i64,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub is_verified: bool,
}

impl AuthorRow {
    pub fn into_summary(self) -> UserSummary {
        UserSummary {
            id: self.id,
            username: self.username,
            display_name: self.display_name,
            avatar_url: self.avatar_url,
            is_verified: self.is_verified,
        }
    }
}

#[derive(Debug)]
pub struct ProfileRow {
    pub user: UserRow,
    pub followers_count: i64,
    pub following_count: i64,
    pub posts_count: i64,
    pub is_following: bool,
}

impl ProfileRow {
    pub fn into_profile(self) -> UserProfile {
        UserProfile {
            id: self.user.id,
            username: self.user.username,
            display_name: self.user.display_name,
            bio: self.user.bio,
            avatar_url: self.user.avatar_url,
            is_verified: self.user.is_verified,
            coins: self.user.coins,
            followers_count: self.followers_count,
            following_count: self.following_count,
            posts_count: self.posts_count,
            is_following: self.is_following,
            created_at: parse_timestamp(&self.user.created_at),
        }
    }
}

#[derive(Debug)]
pub struct PostRow {
    pub id: i64,
    pub author: AuthorRow,
    pub content: String,
    pub image_url: Option<String>,
    pub media_type: String,
    pub moderation_status: String,
    pub likes_count: i64,
    pub comments_count: i64,
    pub liked: bool,
    pub bookmarked: bool,
    pub created_at: String,
}

impl PostRow {
    pub fn into_post(self) -> Post {
        Post {
            id: self.id,
            author: self.author.into_summary(),
            content: self.content,
            image_url: self.image_url,
            media_type: self.media_type,
            moderation_status: ModerationStatus::parse(&self.moderation_status),
            likes_count: self.likes_count,
            comments_count: self.comments_count,
            liked: self.liked,
            bookmarked: self.bookmarked,
            created_at: parse_timestamp(&self.created_at),
        }
    }
}

#[derive(Debug)]
pub struct CommentRow {
    pub id: i64,
    pub post_id: i64,
    pub author: AuthorRow,
    pub content: String,
    pub created_at: String,
}

impl CommentRow {
    pub fn into_comment(self) -> Comment {
        Comment {
            id: self.id,
            post_id: self.post_id,
            author: self.author.into_summary(),
            content: self.content,
            created_at: parse_timestamp(&self.created_at),
        }
    }
}

#[derive(Debug)]
pub struct MessageRow {
    pub id: i64,
    pub conversation_id: i64,
    pub sender: AuthorRow,
    pub content: String,
    pub created_at: String,
}

impl MessageRow {
    pub fn into_message(self) -> Message {
        Message {
            id: self.id,
            conversation_id: self.conversation_id,
            sender: self.sender.into_summary(),
            content: self.content,
            created_at: parse_timestamp(&self.created_at),
        }
    }
}

#[derive(Debug)]
pub struct ConversationRow {
    pub id: i64,
    pub participants: Vec<AuthorRow>,
    pub last_message: Option<MessageRow>,
    pub updated_at: String,
}

impl ConversationRow {
    pub fn into_conversation(self) -> Conversation {
        Conversation {
            id: self.id,
            participants: self.participants.into_iter().map(AuthorRow::into_summary).collect(),
            last_message: self.last_message.map(MessageRow::into_message),
            updated_at: parse_timestamp(&self.updated_at),
        }
    }
}

#[derive(Debug)]
pub struct ListingRow {
    pub id: i64,
    pub seller: AuthorRow,
    pub title: String,
    pub description: Option<String>,
    pub price: i64,
    pub image_url: Option<String>,
    pub is_sold: bool,
    pub buyer_id: Option<i64>,
    pub created_at: String,
}

impl ListingRow {
    pub fn into_listing(self) -> Listing {
        Listing {
            id: self.id,
            seller: self.seller.into_summary(),
            title: self.title,
            description: self.description,
            price: self.price,
            image_url: self.image_url,
            is_sold: self.is_sold,
            buyer_id: self.buyer_id,
            created_at: parse_timestamp(&self.created_at),
        }
    }
}

#[derive(Debug)]
pub struct NftRow {
    pub id: i64,
    pub owner_id: i64,
    pub creator_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub token_hash: String,
    pub created_at: String,
}

impl NftRow {
    pub fn into_nft(self) -> Nft {
        Nft {
            id: self.id,
            owner_id: self.owner_id,
            creator_id: self.creator_id,
            name: self.name,
            description: self.description,
            image_url: self.image_url,
            token_hash: self.token_hash,
            created_at: parse_timestamp(&self.created_at),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NotificationRow {
    pub id: i64,
    pub user_id: i64,
    pub actor_id: Option<i64>,
    pub kind: String,
    pub message: String,
    pub reference_id: Option<i64>,
    pub is_read: bool,
    pub created_at: String,
}

impl NotificationRow {
    pub fn into_notification(self) -> Notification {
        Notification {
            id: self.id,
            user_id: self.user_id,
            actor_id: self.actor_id,
            kind: self.kind,
            message: self.message,
            reference_id: self.reference_id,
            is_read: self.is_read,
            created_at: parse_timestamp(&self.created_at),
        }
    }
}

#[derive(Debug)]
pub struct EventRow {
    pub id: i64,
    pub creator: AuthorRow,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub starts_at: Option<String>,
    pub attendees_count: i64,
    pub attending: bool,
    pub created_at: String,
}

impl EventRow {
    pub fn into_event(self) -> Event {
        Event {
            id: self.id,
            creator: self.creator.into_summary(),
            title: self.title,
            description: self.description,
            location: self.location,
            starts_at: self.starts_at,
            attendees_count: self.attendees_count,
            attending: self.attending,
            created_at: parse_timestamp(&self.created_at),
        }
    }
}

#[derive(Debug)]
pub struct HighlightRow {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub cover_url: Option<String>,
    pub created_at: String,
}

impl HighlightRow {
    pub fn into_highlight(self) -> Highlight {
        Highlight {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            cover_url: self.cover_url,
            created_at: parse_timestamp(&self.created_at),
        }
    }
}

#[derive(Debug)]
pub struct StoryRow {
    pub id: i64,
    pub author: AuthorRow,
    pub media_url: String,
    pub caption: Option<String>,
    pub reactions_count: i64,
    pub my_reaction: Option<String>,
    pub created_at: String,
    pub expires_at: String,
}

impl StoryRow {
    pub fn into_story(self) -> Story {
        Story {
            id: self.id,
            author: self.author.into_summary(),
            media_url: self.media_url,
            caption: self.caption,
            reactions_count: self.reactions_count,
            my_reaction: self.my_reaction,
            created_at: parse_timestamp(&self.created_at),
            expires_at: parse_timestamp(&self.expires_at),
        }
    }
}

#[derive(Debug)]
pub struct SubscriptionRow {
    pub id: i64,
    pub subscriber_id: i64,
    pub creator_id: i64,
    pub price: i64,
    pub created_at: String,
    pub expires_at: String,
}

impl SubscriptionRow {
    pub fn into_subscription(self) -> Subscription {
        Subscription {
            id: self.id,
            subscriber_id: self.subscriber_id,
            creator_id: self.creator_id,
            price: self.price,
            created_at: parse_timestamp(&self.created_at),
            expires_at: parse_timestamp(&self.expires_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sqlite_and_rfc3339_timestamps() {
        let a = parse_timestamp("2024-05-01 10:20:30");
        assert_eq!(a.to_rfc3339(), "2024-05-01T10:20:30+00:00");

        let b = parse_timestamp("2024-05-01T10:20:30Z");
        assert_eq!(a, b);
    }

    #[test]
    fn corrupt_timestamp_defaults_to_epoch() {
        assert_eq!(parse_timestamp("yesterday"), DateTime::<Utc>::default());
    }
}
