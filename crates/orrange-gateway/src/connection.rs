use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use orrange_db::Database;
use orrange_types::api::Claims;
use orrange_types::events::{GatewayCommand, GatewayEvent};

use crate::dispatcher::Dispatcher;

/// Server sends a Ping every 15 seconds; two missed Pongs drop the connection.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Per-connection state owned by the receive loop.
struct Session {
    conn_id: Uuid,
    user_id: Option<i64>,
}

/// Drive one WebSocket connection until either side hangs up.
///
/// The connection starts anonymous and only receives broadcasts until a
/// `register` command carrying a valid session token binds it to a user.
pub async fn handle_connection(socket: WebSocket, dispatcher: Dispatcher, db: Arc<Database>, jwt_secret: String) {
    let (mut sender, mut receiver) = socket.split();

    let (conn_id, mut conn_rx) = dispatcher.connect().await;
    let mut broadcast_rx = dispatcher.subscribe();
    debug!("Connection {} opened", conn_id);

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received;

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let event = match result {
                        Ok(event) => event,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Broadcast receiver lagged by {} events", n);
                            continue;
                        }
                        Err(_) => break,
                    };
                    if !send_event(&mut sender, &event).await {
                        break;
                    }
                }
                result = conn_rx.recv() => {
                    let Some(event) = result else { break };
                    if !send_event(&mut sender, &event).await {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let dispatcher_recv = dispatcher.clone();
    let mut recv_task = tokio::spawn(async move {
        let mut session = Session { conn_id, user_id: None };

        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => handle_command(&dispatcher_recv, &db, &jwt_secret, &mut session, cmd).await,
                    Err(e) => {
                        warn!(
                            "Connection {} bad command: {} -- raw: {}",
                            conn_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                    }
                },
                Message::Pong(_) => pong_flag_recv.store(true, Ordering::Release),
                Message::Close(_) => break,
                _ => {}
            }
        }

        session.user_id
    });

    let user_id = tokio::select! {
        result = &mut send_task => {
            recv_task.abort();
            let _ = result;
            None
        }
        result = &mut recv_task => {
            send_task.abort();
            result.ok().flatten()
        }
    };

    dispatcher.disconnect(conn_id).await;
    match user_id {
        Some(user_id) => info!("User {} disconnected from gateway", user_id),
        None => debug!("Connection {} closed", conn_id),
    }
}

/// Returns false once the socket is gone.
async fn send_event(sender: &mut SplitSink<WebSocket, Message>, event: &GatewayEvent) -> bool {
    match serde_json::to_string(event) {
        Ok(text) => sender.send(Message::Text(text.into())).await.is_ok(),
        Err(e) => {
            error!("Failed to serialize gateway event: {}", e);
            true
        }
    }
}

async fn handle_command(dispatcher: &Dispatcher, db: &Arc<Database>, jwt_secret: &str, session: &mut Session, cmd: GatewayCommand) {
    match cmd {
        GatewayCommand::Register { token } => {
            let Some(claims) = verify_token(&token, jwt_secret) else {
                warn!("Connection {} sent an invalid register token", session.conn_id);
                return;
            };
            session.user_id = Some(claims.sub);
            dispatcher.register_user(claims.sub, session.conn_id).await;
            dispatcher
                .send_to_connection(session.conn_id, GatewayEvent::Registered { user_id: claims.sub })
                .await;
            info!("{} ({}) registered on gateway", claims.username, claims.sub);
        }

        GatewayCommand::GetOnlineUsers => {
            let user_ids = dispatcher.online_users().await;
            dispatcher
                .send_to_connection(session.conn_id, GatewayEvent::OnlineUsers { user_ids })
                .await;
        }

        GatewayCommand::JoinRoom { room } => {
            if may_join(db, session.user_id, &room).await {
                dispatcher.join_room(session.conn_id, &room).await;
            } else {
                warn!("Connection {} denied room {}", session.conn_id, room);
            }
        }

        GatewayCommand::LeaveRoom { room } => {
            dispatcher.leave_room(session.conn_id, &room).await;
        }

        GatewayCommand::VideoOffer { to, offer } => {
            relay(dispatcher, session, to, |from| GatewayEvent::VideoOffer { from, offer }).await;
        }

        GatewayCommand::VideoAnswer { to, answer } => {
            relay(dispatcher, session, to, |from| GatewayEvent::VideoAnswer { from, answer }).await;
        }

        GatewayCommand::IceCandidate { to, candidate } => {
            relay(dispatcher, session, to, |from| GatewayEvent::IceCandidate { from, candidate }).await;
        }

        GatewayCommand::EndCall { to } => {
            relay(dispatcher, session, to, |from| GatewayEvent::EndCall { from }).await;
        }
    }
}

/// Forward a call signal to `to`, stamped with the sender's user id.
async fn relay(dispatcher: &Dispatcher, session: &Session, to: i64, build: impl FnOnce(i64) -> GatewayEvent) {
    let Some(from) = session.user_id else {
        warn!("Connection {} sent a call signal before registering", session.conn_id);
        return;
    };
    if !dispatcher.send_to_user(to, build(from)).await {
        debug!("Call signal from {} to offline user {} dropped", from, to);
    }
}

fn verify_token(token: &str, jwt_secret: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}

/// Conversation rooms are open to registered participants only.
async fn may_join(db: &Arc<Database>, user_id: Option<i64>, room: &str) -> bool {
    let Some(user_id) = user_id else {
        return false;
    };
    let Some(conversation_id) = parse_conversation_room(room) else {
        return false;
    };

    let db = db.clone();
    match tokio::task::spawn_blocking(move || db.is_participant(conversation_id, user_id)).await {
        Ok(Ok(allowed)) => allowed,
        Ok(Err(e)) => {
            error!("Failed to check room membership: {}", e);
            false
        }
        Err(e) => {
            error!("spawn_blocking panicked: {}", e);
            false
        }
    }
}

fn parse_conversation_room(room: &str) -> Option<i64> {
    room.strip_prefix("conversation:")?.parse().ok()
}
