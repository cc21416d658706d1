use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use common::SignalUpdate;

use crate::auth::{token_matches, unauthorized};
use crate::AppState;

pub fn ws_router() -> Router<AppState> {
    Router::new().route("/ws/signals", get(ws_signals_handler))
}

#[derive(Deserialize)]
struct WsQuery {
    token: Option<String>,
}

/// Streams every `SignalUpdate` as a JSON text frame.
/// Auth via `?token=<DASHBOARD_TOKEN>`; browsers cannot set WS headers.
async fn ws_signals_handler(
    State(state): State<AppState>,
    Query(q): Query<WsQuery>,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    if !token_matches(&state, q.token.as_deref()) {
        return unauthorized();
    }
    let Some(ws) = ws else {
        return (StatusCode::BAD_REQUEST, "expected a websocket upgrade").into_response();
    };

    let update_rx = state.update_tx.subscribe();
    ws.on_upgrade(move |socket| stream_updates(socket, update_rx))
}

async fn stream_updates(mut socket: WebSocket, mut update_rx: broadcast::Receiver<SignalUpdate>) {
    debug!("Signal stream client connected");
    loop {
        match update_rx.recv().await {
            Ok(update) => {
                let text = match serde_json::to_string(&update) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, "Failed to encode signal update");
                        continue;
                    }
                };
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            Err(RecvError::Lagged(n)) => {
                warn!(dropped = n, "Signal stream client lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
    debug!("Signal stream client disconnected");
}
