//! WebSocket session handling: the server side of the event channel.
//!
//! Each accepted socket becomes one session. The first event must be
//! `join_user`; everything else before presence is answered with an
//! `error` event. After presence, events are dispatched against the hub
//! and replies flow through the session's bounded outbound queue.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use tutoria_shared::{ChatMessage, ClientEvent, ConversationId, ImageAttachment, ServerEvent, UserId};

use crate::api::AppState;
use crate::hub::ChatHub;

pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.hub.clone()))
}

async fn handle_socket(socket: WebSocket, hub: ChatHub) {
    let session_id = Uuid::new_v4();
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerEvent>(256);

    // Outbound pump: everything the hub or this loop queues goes out
    // as one JSON text frame per event.
    let pump = tokio::spawn(async move {
        while let Some(event) = out_rx.recv().await {
            match event.to_text() {
                Ok(text) => {
                    if ws_tx.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "Could not encode outbound event"),
            }
        }
    });

    info!(session = %session_id, "Channel opened");

    let mut identity: Option<UserId> = None;

    while let Some(Ok(frame)) = ws_rx.next().await {
        let text = match frame {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let event = match ClientEvent::from_text(text.as_str()) {
            Ok(event) => event,
            Err(e) => {
                debug!(session = %session_id, error = %e, "Undecodable frame");
                let _ = out_tx
                    .send(ServerEvent::Error {
                        message: format!("Unrecognized event: {e}"),
                    })
                    .await;
                continue;
            }
        };

        match (&identity, event) {
            (None, ClientEvent::JoinUser(user_id)) => {
                hub.register(session_id, user_id.clone(), out_tx.clone()).await;
                identity = Some(user_id);
            }
            (None, other) => {
                warn!(event = other.name(), "Event before presence announcement");
                let _ = out_tx
                    .send(ServerEvent::Error {
                        message: "Announce presence with join_user first".to_string(),
                    })
                    .await;
            }
            (Some(_), event) => dispatch(&hub, session_id, event, &out_tx).await,
        }
    }

    hub.unregister(session_id).await;
    info!(session = %session_id, "Channel closed");

    // All senders are gone once the hub handle is dropped; the pump
    // drains and exits on its own.
    drop(out_tx);
    let _ = pump.await;
}

async fn dispatch(
    hub: &ChatHub,
    session_id: Uuid,
    event: ClientEvent,
    out_tx: &mpsc::Sender<ServerEvent>,
) {
    match event {
        ClientEvent::JoinUser(_) => {
            debug!(session = %session_id, "Redundant presence announcement");
        }
        ClientEvent::JoinCommunity { course_id } => {
            let conversation = ConversationId::community(course_id);
            join_room(hub, session_id, conversation, out_tx).await;
        }
        ClientEvent::JoinPrivateChat(thread) => {
            let conversation = ConversationId::Private(thread);
            join_room(hub, session_id, conversation, out_tx).await;
        }
        ClientEvent::SendMessage { course_id, message } => {
            let conversation = ConversationId::community(course_id);
            deliver(hub, session_id, conversation, message, None, out_tx).await;
        }
        ClientEvent::SendPrivateMessage { thread, message } => {
            let conversation = ConversationId::Private(thread);
            deliver(hub, session_id, conversation, message, None, out_tx).await;
        }
        ClientEvent::SendImageMessage {
            course_id,
            message,
            image,
        } => {
            let conversation = ConversationId::community(course_id);
            deliver(hub, session_id, conversation, message, Some(image), out_tx).await;
        }
        ClientEvent::SendPrivateImageMessage {
            thread,
            message,
            image,
        } => {
            let conversation = ConversationId::Private(thread);
            deliver(hub, session_id, conversation, message, Some(image), out_tx).await;
        }
        ClientEvent::SendNotification {
            conversation_id,
            course_title,
            message,
            sender_id,
        } => {
            hub.send_notification(&conversation_id, &course_title, &message, &sender_id)
                .await;
        }
        ClientEvent::MarkPrivateMessageNotificationAsRead(receipt) => {
            if !hub.mark_read(session_id, &receipt).await {
                debug!(
                    notification = %receipt.notification_id,
                    "Read acknowledgment for an unknown or already-read entry"
                );
            }
        }
    }
}

async fn join_room(
    hub: &ChatHub,
    session_id: Uuid,
    conversation: ConversationId,
    out_tx: &mpsc::Sender<ServerEvent>,
) {
    // The hub queues the history reply itself, under its state lock.
    if !hub.join(session_id, &conversation).await {
        let _ = out_tx
            .send(ServerEvent::Error {
                message: "Session is not registered".to_string(),
            })
            .await;
    }
}

async fn deliver(
    hub: &ChatHub,
    session_id: Uuid,
    conversation: ConversationId,
    message: ChatMessage,
    image: Option<ImageAttachment>,
    out_tx: &mpsc::Sender<ServerEvent>,
) {
    if !hub.send_message(session_id, &conversation, message, image).await {
        let _ = out_tx
            .send(ServerEvent::Error {
                message: "Join the room before sending".to_string(),
            })
            .await;
    }
}
