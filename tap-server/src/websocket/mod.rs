use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use warp::ws::{Message, WebSocket};

use tap_types::{ClientMessage, ServerMessage};

pub mod connection;

pub use connection::{Connection, ConnectionId, ConnectionServices};

pub async fn handle_connection(websocket: WebSocket, services: ConnectionServices) {
    let connection_id = ConnectionId::new();
    info!("New WebSocket connection: {}", connection_id);

    let (mut ws_sender, mut ws_receiver) = websocket.split();
    let (outbox, mut outgoing) = mpsc::unbounded_channel();

    let mut connection = match Connection::open(connection_id, &services, outbox.clone()) {
        Ok(connection) => connection,
        Err(e) => {
            error!("Could not open connection {}: {}", connection_id, e);
            return;
        }
    };

    let incoming_handler = async {
        while let Some(result) = ws_receiver.next().await {
            let msg = match result {
                Ok(msg) => msg,
                Err(e) => {
                    warn!("WebSocket error for {}: {}", connection_id, e);
                    break;
                }
            };
            if msg.is_close() {
                break;
            }

            match parse_message(&msg) {
                Some(Ok(client_message)) => connection.handle_message(client_message).await,
                Some(Err(e)) => {
                    warn!("Invalid message from {}: {}", connection_id, e);
                    let _ = outbox.send(ServerMessage::Error {
                        message: format!("Invalid message: {}", e),
                    });
                }
                None => {}
            }
        }
    };

    let outgoing_handler = async {
        while let Some(message) = outgoing.recv().await {
            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize message: {:?}", e);
                    continue;
                }
            };

            if let Err(e) = ws_sender.send(Message::text(json)).await {
                warn!("Failed to send message to {}: {:?}", connection_id, e);
                break;
            }
        }
    };

    tokio::select! {
        _ = incoming_handler => {},
        _ = outgoing_handler => {},
    }

    info!("Connection {} disconnected", connection_id);
}

/// `None` for frames that carry no client message (binary, ping).
fn parse_message(msg: &Message) -> Option<Result<ClientMessage, serde_json::Error>> {
    let text = msg.to_str().ok()?;
    Some(serde_json::from_str(text))
}
