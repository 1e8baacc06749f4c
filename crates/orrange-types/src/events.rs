use serde::{Deserialize, Serialize};

use crate::models::{Comment, Message, Notification};

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms the connection is bound to a user
    #[serde(rename = "registered")]
    Registered { user_id: i64 },

    /// Reply to `getOnlineUsers`
    #[serde(rename = "onlineUsers")]
    OnlineUsers { user_ids: Vec<i64> },

    #[serde(rename = "userOnline")]
    UserOnline { user_id: i64 },

    #[serde(rename = "userOffline")]
    UserOffline { user_id: i64 },

    #[serde(rename = "newNotification")]
    NewNotification { notification: Notification },

    /// Delivered to room `conversation:{id}`
    #[serde(rename = "newMessage")]
    NewMessage { message: Message },

    #[serde(rename = "post:likeUpdate")]
    PostLikeUpdate {
        post_id: i64,
        user_id: i64,
        liked: bool,
        likes_count: i64,
    },

    #[serde(rename = "post:newComment")]
    PostNewComment {
        post_id: i64,
        comment: Comment,
        comments_count: i64,
    },

    #[serde(rename = "video-offer")]
    VideoOffer { from: i64, offer: serde_json::Value },

    #[serde(rename = "video-answer")]
    VideoAnswer { from: i64, answer: serde_json::Value },

    #[serde(rename = "ice-candidate")]
    IceCandidate {
        from: i64,
        candidate: serde_json::Value,
    },

    #[serde(rename = "end-call")]
    EndCall { from: i64 },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Bind this connection to the user named in the session token
    #[serde(rename = "register")]
    Register { token: String },

    #[serde(rename = "getOnlineUsers")]
    GetOnlineUsers,

    #[serde(rename = "joinRoom")]
    JoinRoom { room: String },

    #[serde(rename = "leaveRoom")]
    LeaveRoom { room: String },

    #[serde(rename = "video-offer")]
    VideoOffer { to: i64, offer: serde_json::Value },

    #[serde(rename = "video-answer")]
    VideoAnswer { to: i64, answer: serde_json::Value },

    #[serde(rename = "ice-candidate")]
    IceCandidate {
        to: i64,
        candidate: serde_json::Value,
    },

    #[serde(rename = "end-call")]
    EndCall { to: i64 },
}

/// Room name used for conversation-scoped delivery.
pub fn conversation_room(conversation_id: i64) -> String {
    format!("conversation:{}", conversation_id)
}
