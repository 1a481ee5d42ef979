use axum::body::Bytes;
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use markswift_events::{ClientMessage, HubFrame, Notification, NotificationSink};
use serde::Deserialize;

use crate::state::AppState;

/// Query string of the WebSocket upgrade request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsParams {
    pub session_id: Option<String>,
}

/// HTTP handler that upgrades the connection to WebSocket.
///
/// Connections without a `sessionId` are closed with code 1008 right after
/// the upgrade.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let session_id = params.session_id.filter(|s| !s.trim().is_empty());
    ws.on_upgrade(move |socket| async move {
        match session_id {
            Some(session_id) => handle_socket(socket, session_id, state).await,
            None => reject_socket(socket).await,
        }
    })
}

async fn reject_socket(mut socket: WebSocket) {
    tracing::warn!("WebSocket connection without sessionId, closing");
    let frame = CloseFrame {
        code: close_code::POLICY,
        reason: "Session ID required".into(),
    };
    let _ = socket.send(Message::Close(Some(frame))).await;
}

/// Manage a single session socket after upgrade.
///
///   1. Registers the session with the hub, replacing any older socket.
///   2. Sends `connection_ack`, then replays the session's queue state.
///   3. Spawns a sender task that forwards hub frames to the socket.
///   4. Answers inbound `getStatus` requests on the current task, until the
///      client disconnects or the sender task ends.
///   5. Unregisters on disconnect.
async fn handle_socket(socket: WebSocket, session_id: String, state: AppState) {
    let (conn_id, mut rx) = state.hub.register(session_id.clone());
    tracing::info!(session_id = %session_id, conn_id = %conn_id, "WebSocket connected");

    state
        .hub
        .try_send(&session_id, &Notification::connection_ack());
    state.queue.resend_state(&session_id).await;

    let (mut sink, mut stream) = socket.split();

    let sender_session = session_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let (message, closing) = match frame {
                HubFrame::Text(text) => (Message::Text(text.into()), false),
                HubFrame::Ping => (Message::Ping(Bytes::new()), false),
                HubFrame::Close => (Message::Close(None), true),
            };
            if sink.send(message).await.is_err() {
                tracing::debug!(session_id = %sender_session, "WebSocket sink closed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    // Stop reading once the sender is gone, e.g. after a newer socket
    // replaced this one.
    loop {
        let result = tokio::select! {
            _ = &mut send_task => break,
            next = stream.next() => match next {
                Some(result) => result,
                None => break,
            },
        };
        match result {
            Ok(Message::Text(text)) => {
                handle_client_message(&state, &session_id, &conn_id, text.as_str()).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(session_id = %session_id, "Pong received");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(session_id = %session_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    state.hub.remove(&session_id, &conn_id);
    send_task.abort();
    tracing::info!(session_id = %session_id, conn_id = %conn_id, "WebSocket disconnected");
}

async fn handle_client_message(state: &AppState, session_id: &str, conn_id: &str, text: &str) {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::GetStatus) => {
            let job = state.queue.status_of(session_id).await;
            let reply = Notification::CurrentStatus {
                status: job.as_ref().map(|j| j.status),
                job_id: job.as_ref().map(|j| j.id),
            };
            state.hub.send_to_connection(session_id, conn_id, &reply);
        }
        Err(e) => {
            tracing::debug!(session_id, error = %e, "Ignoring unrecognized client message");
        }
    }
}
