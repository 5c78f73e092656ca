use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::types::{ClientMessage, ServerMessage};
use crate::AppState;

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Create a channel for sending messages to this client
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    // Register the client
    let client_id = state.room_manager.register(tx);
    info!("WebSocket client connected: {}", client_id);

    // Spawn a task to forward messages from the channel to the WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    // New clients get the current market right away instead of waiting a tick
    send_message(
        &state,
        client_id,
        &ServerMessage::Market {
            data: state.market.snapshot(),
        },
    );

    // Handle incoming messages
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                debug!("Received message from {}: {}", client_id, text);
                handle_message(&state, client_id, &text);
            }
            Ok(Message::Close(_)) => {
                info!("WebSocket client disconnecting: {}", client_id);
                break;
            }
            Ok(Message::Ping(_)) => {
                // Pong is handled automatically by axum
                debug!("Received ping from {}", client_id);
            }
            Err(e) => {
                error!("WebSocket error for {}: {}", client_id, e);
                break;
            }
            _ => {}
        }
    }

    // Clean up
    state.room_manager.unregister(client_id);
    send_task.abort();
    info!("WebSocket client disconnected: {}", client_id);
}

fn handle_message(state: &AppState, client_id: Uuid, text: &str) {
    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            send_error(state, client_id, &format!("Invalid message: {}", e));
            return;
        }
    };

    match msg {
        ClientMessage::SubscribeAccount { uid } => {
            if uid.trim().is_empty() {
                send_error(state, client_id, "uid is required");
                return;
            }
            state.room_manager.subscribe(client_id, &uid);
            debug!("Client {} subscribed to account {}", client_id, uid);
            send_message(state, client_id, &ServerMessage::AccountSubscribed { uid: uid.clone() });

            // Current balances, so the client does not need a separate fetch
            match state.trading.get_account(&uid) {
                Ok(account) => {
                    send_message(state, client_id, &ServerMessage::AccountUpdate { data: account })
                }
                Err(e) => debug!("No account snapshot for {}: {}", uid, e),
            }
        }
        ClientMessage::UnsubscribeAccount { uid } => {
            state.room_manager.unsubscribe(client_id, &uid);
            debug!("Client {} unsubscribed from account {}", client_id, uid);
            send_message(state, client_id, &ServerMessage::AccountUnsubscribed { uid });
        }
        ClientMessage::Ping => send_message(state, client_id, &ServerMessage::Pong),
    }
}

fn send_message(state: &AppState, client_id: Uuid, msg: &ServerMessage) {
    if let Ok(json) = serde_json::to_string(msg) {
        state.room_manager.send_to(client_id, &json);
    }
}

fn send_error(state: &AppState, client_id: Uuid, error: &str) {
    let msg = ServerMessage::Error {
        error: error.to_string(),
    };
    send_message(state, client_id, &msg);
}
