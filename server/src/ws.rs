//! `/ws/chat/{sessionId}`: one inbound text frame in, one outbound frame out,
//! looped until the peer disconnects. Per-frame errors emit an `error` frame
//! without closing the channel.

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use chrono::Utc;
use uuid::Uuid;

use analysis_core::model::{Message, Role};

use crate::chat;
use crate::dto::{WsInbound, WsOutbound};
use crate::state::SharedState;

pub async fn handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<Uuid>,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| run(socket, session_id, state))
}

async fn run(mut socket: WebSocket, session_id: Uuid, state: SharedState) {
    state.sessions.create(Some(session_id));
    tracing::info!(%session_id, "websocket chat connected");

    while let Some(frame) = socket.recv().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(_) => break,
        };

        let text = match frame {
            WsMessage::Text(text) => text,
            WsMessage::Close(_) => break,
            _ => continue,
        };

        let outbound = match serde_json::from_str::<WsInbound>(&text) {
            Ok(inbound) => process(&state, session_id, &inbound.message).await,
            Err(err) => WsOutbound::Error { content: format!("malformed frame: {err}") },
        };

        let Ok(payload) = serde_json::to_string(&outbound) else { break };
        if socket.send(WsMessage::Text(payload)).await.is_err() {
            break;
        }
    }

    tracing::info!(%session_id, "websocket chat disconnected");
}

async fn process(state: &SharedState, session_id: Uuid, message: &str) -> WsOutbound {
    state
        .sessions
        .append(session_id, Message { role: Role::User, content: message.to_string(), timestamp: Utc::now() })
        .await;

    let reply = chat::respond_to(message);

    state
        .sessions
        .append(session_id, Message { role: Role::Assistant, content: reply.clone(), timestamp: Utc::now() })
        .await;

    WsOutbound::Message { content: reply, timestamp: Utc::now() }
}
