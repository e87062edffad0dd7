use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use tracing::{debug, info, warn};

use crate::{
    gateway::{dispatch, hub},
    server::AppState,
};

/// Runs one viewer connection until either side closes it.
pub async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let (tx, rx) = hub::outbox();
    let conn = state.hub.register(tx);
    info!("viewer connected: {}", conn);

    loop {
        tokio::select! {
            msg = rx.recv_async() => {
                // The hub drops the sender when it evicts this viewer.
                let Ok(msg) = msg else {
                    debug!("viewer {} evicted, closing", conn);
                    break;
                };
                if let Err(e) = socket.send(msg).await {
                    warn!("socket send error: viewer={} err={}", conn, e);
                    break;
                }
            }
            msg = socket.recv() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        warn!("websocket error: viewer={} err={}", conn, e);
                        break;
                    }
                    None => break,
                };

                match msg {
                    Message::Text(text) => dispatch::handle_message(&state, conn, text.as_str()).await,
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }

    state.hub.unregister(conn);
    debug!("viewer disconnected: {}", conn);
}
