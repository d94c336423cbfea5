//! `GET /ws`: the browser peer's socket.
//!
//! Only one peer is active at a time; a new connection replaces the old one,
//! whose outbound channel closes and ends its loop.

use super::state::AppState;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use relay_infrastructure::RelayState;
use std::sync::Arc;
use tracing::{info, warn};

pub async fn peer_socket(State(app): State<Arc<AppState>>, ws: WebSocketUpgrade) -> Response {
    let relay = Arc::clone(&app.relay);
    ws.on_upgrade(move |socket| serve_peer(relay, socket))
}

async fn serve_peer(relay: Arc<RelayState>, mut socket: WebSocket) {
    let (epoch, mut outbound) = relay.peer_connected();
    info!(epoch, "Browser peer connected");

    loop {
        tokio::select! {
            message = outbound.recv() => {
                let Some(text) = message else {
                    info!(epoch, "Peer connection replaced");
                    break;
                };
                if let Err(e) = socket.send(Message::Text(text.into())).await {
                    warn!(epoch, "Failed to send to peer: {e}");
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => relay.handle_inbound(text.as_str()),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(epoch, "Peer socket error: {e}");
                        break;
                    }
                }
            }
        }
    }

    relay.peer_disconnected(epoch);
    info!(epoch, "Browser peer disconnected");
}
