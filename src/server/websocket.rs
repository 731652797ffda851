//! Control channel WebSocket
//!
//! Each connection gets one [`SessionManager`] running on its own task. The
//! reader forwards parsed messages to it in arrival order; stop, restart and
//! disconnect additionally abort a start that is still waiting on its
//! playlist. Server shutdown closes every connection the same way a
//! disconnect does.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::protocol::{ClientMessage, ServerMessage};
use crate::server::AppState;
use crate::session::SessionManager;

/// Inbound messages buffered per connection before the reader backs off
const INBOUND_QUEUE: usize = 256;

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let sessions = state.sessions.clone();
    ws.on_upgrade(move |socket| sessions.track_future(handle_socket(socket, state)))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (sender, receiver) = socket.split();
    serve_connection(state, receiver, sender).await;
}

/// Run one client connection over any frame stream / sink pair
///
/// Returns once the client is gone (or the server shuts down) and the
/// connection's relay has been torn down.
pub async fn serve_connection<R, W, E>(state: Arc<AppState>, mut receiver: R, mut sender: W)
where
    R: Stream<Item = Result<Message, E>> + Unpin + Send,
    W: Sink<Message> + Unpin + Send + 'static,
    E: Display + Send,
{
    let connection_id = Uuid::new_v4();
    info!(connection_id = %connection_id, "Client connected");

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let (in_tx, in_rx) = mpsc::channel::<ClientMessage>(INBOUND_QUEUE);

    let manager = SessionManager::new(
        connection_id,
        state.api.clone(),
        state.config.clone(),
        state.registry.clone(),
        out_tx,
    );
    let pending = manager.pending_start();
    let session = tokio::spawn(manager.run(in_rx));

    // Outbound: session -> client
    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            let text = match serde_json::to_string(&msg) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to serialize message: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    // Inbound: client -> session
    loop {
        let frame = tokio::select! {
            frame = receiver.next() => frame,
            _ = state.shutdown.cancelled() => {
                info!(connection_id = %connection_id, "Server shutting down, closing connection");
                break;
            }
        };

        let msg = match frame {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(msg) => msg,
                Err(e) => {
                    warn!(connection_id = %connection_id, "Invalid message: {}", e);
                    continue;
                }
            },
            Some(Ok(Message::Binary(data))) => ClientMessage::audio(data),
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                debug!(connection_id = %connection_id, "WebSocket error: {}", e);
                break;
            }
        };

        if matches!(msg, ClientMessage::StartStream { .. } | ClientMessage::StopStream) {
            pending.cancel();
        }

        // Stale audio is worthless; never let it hold back control messages
        if let ClientMessage::AudioData { .. } = msg {
            match in_tx.try_send(msg) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!(connection_id = %connection_id, "Inbound queue full, audio frame dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => break,
            }
            continue;
        }

        if in_tx.send(msg).await.is_err() {
            break;
        }
    }

    // Closing the inbound queue makes the session tear down its relay
    pending.cancel();
    drop(in_tx);

    if let Err(e) = session.await {
        warn!(connection_id = %connection_id, "Session task failed: {}", e);
    }
    writer.abort();
    info!(connection_id = %connection_id, "Connection closed");
}
