use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use conduit_core::SessionId;
use conduit_ws::{ClientFrame, ServerFrame};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tracing::{info, warn};

use crate::app::AppState;

/// GET /api/v1/realtime/ws/{session_id} — upgrades to a WS connection
/// registered on the session's fan-out group in the Hub (§4.H).
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state, session_id))
}

async fn handle_connection(socket: WebSocket, state: Arc<AppState>, session_id: String) {
    let (conn_id, mut outbound_rx) = state.hub.connect(&session_id);
    info!(session_id = %session_id, conn_id = %conn_id, "WS connection opened");

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(WsMessage::Text(text))) => {
                        let text_ref: &str = &text;
                        let reply = handle_client_frame(&state, &session_id, text_ref).await;
                        if let Some(frame) = reply {
                            if sink.send(WsMessage::Text(frame.to_json().into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        let _ = sink.send(WsMessage::Pong(data)).await;
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(session_id = %session_id, error = %e, "WS recv error");
                        break;
                    }
                    _ => {}
                }
            }
            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(payload) => {
                        if sink.send(WsMessage::Text(payload.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    state.hub.disconnect(&session_id, &conn_id);
    info!(session_id = %session_id, conn_id = %conn_id, "WS connection closed");
}

/// Decode one inbound frame and produce the direct reply, if any (§4.H).
/// Malformed JSON replies with an error frame without disconnecting.
/// `chat` frames also fan out a `chat_response` to every connection on the
/// session via the Hub, not just this one — so this returns `None` for
/// that case and pushes through the hub instead.
async fn handle_client_frame(state: &Arc<AppState>, session_id: &str, text: &str) -> Option<ServerFrame> {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            warn!(session_id, error = %e, "malformed WS frame");
            return Some(ServerFrame::invalid_json());
        }
    };

    match frame {
        ClientFrame::Ping => Some(ServerFrame::Pong),
        ClientFrame::GetStatus => {
            let id = SessionId::from(session_id);
            match state.coordinator.state().summary(&id).await {
                Ok(summary) => Some(ServerFrame::Status {
                    data: serde_json::to_value(summary).unwrap_or(json!({})),
                }),
                Err(e) => Some(ServerFrame::Error { message: e.to_string() }),
            }
        }
        ClientFrame::Chat { message, context } => {
            let id = SessionId::from(session_id);
            let context_patch = context.and_then(|v| serde_json::from_value(v).ok());
            match state.coordinator.handle_message(&message, Some(id), context_patch).await {
                Ok(response) => {
                    let frame = ServerFrame::ChatResponse {
                        data: serde_json::to_value(&response).unwrap_or(json!({})),
                    };
                    state.hub.send_to_session(session_id, &frame);
                    None
                }
                Err(e) => Some(ServerFrame::Error { message: e.to_string() }),
            }
        }
    }
}
