//! services/api/src/web/ws_handler.rs
//!
//! The scanner WebSocket: one connection per open scanner panel. Each decoded
//! badge is processed through the operator's desk and answered in order.

use crate::web::{
    protocol::{ClientMessage, ServerMessage},
    rest::{load_sync_key, scan_error_kind, ScanResponse},
    state::{AppState, AttendanceDesk, CurrentUser},
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use futures::{
    stream::{SplitSink, StreamExt},
    SinkExt,
};
use std::sync::Arc;
use tracing::{error, info, warn};

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, current))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, current: CurrentUser) {
    info!("Scanner connected for {}", current.user.email);

    let (mut sender, mut receiver) = socket.split();
    let desk = app_state.desk_for(&current).await;

    let ready = ServerMessage::Ready {
        syncing: desk.is_syncing(),
    };
    if send(&mut sender, &ready).await.is_err() {
        error!("Failed to send Ready message.");
        return;
    }

    loop {
        // Logout closes the desk; the socket must not outlive its auth session.
        let frame = tokio::select! {
            _ = desk.closed() => {
                info!("Session for {} ended; closing scanner.", current.user.email);
                let _ = send(&mut sender, &session_ended()).await;
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
            frame = receiver.next() => frame,
        };
        let Some(frame) = frame else {
            break;
        };
        let text = match frame {
            Ok(Message::Text(text)) => text.to_string(),
            Ok(Message::Close(_)) => {
                info!("Scanner sent close message.");
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!("Scanner connection error: {}", e);
                break;
            }
        };

        let reply = match load_sync_key(&app_state).await {
            Ok(key) => handle_text_message(&text, &desk, key.as_deref()).await,
            Err(_) => ServerMessage::Error {
                message: "Failed to read the sync key".to_string(),
            },
        };
        if send(&mut sender, &reply).await.is_err() {
            error!("Failed to send scanner reply. Closing connection.");
            break;
        }
    }

    info!("Scanner disconnected for {}", current.user.email);
}

async fn send(
    sender: &mut SplitSink<WebSocket, Message>,
    message: &ServerMessage,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(message).map_err(axum::Error::new)?;
    sender.send(Message::Text(json.into())).await
}

fn session_ended() -> ServerMessage {
    ServerMessage::Error {
        message: "This session has ended. Please sign in again.".to_string(),
    }
}

/// Processes one text frame against the desk and builds the reply.
pub async fn handle_text_message(
    text: &str,
    desk: &AttendanceDesk,
    sync_key: Option<&str>,
) -> ServerMessage {
    let client_msg = match serde_json::from_str::<ClientMessage>(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("Unreadable scanner message: {}", e);
            return ServerMessage::Error {
                message: "Unrecognised message".to_string(),
            };
        }
    };

    match client_msg {
        ClientMessage::Status => ServerMessage::SyncStatus {
            syncing: desk.is_syncing(),
        },
        ClientMessage::Scan { decoded_text } => {
            let Some(mut session) = desk.lock_open().await else {
                return session_ended();
            };
            let result = session.scan(&decoded_text, sync_key).await;
            match result {
                Ok(outcome) => {
                    let view = ScanResponse::from(&outcome);
                    ServerMessage::Welcome {
                        kind: view.kind,
                        id: view.id,
                        name: view.name,
                        message: view.message,
                    }
                }
                Err(e) => ServerMessage::ScanRejected {
                    error: scan_error_kind(&e).1.to_string(),
                    message: e.to_string(),
                },
            }
        }
    }
}
