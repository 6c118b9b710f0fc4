//! WebSocket handler for real-time climate events

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

use crate::api::AppState;

/// Greeting sent when a client connects
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Hello {
    Connected,
}

/// Handle a WebSocket connection
pub async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let mut event_rx = match state.engine.subscribe().await {
        Ok(rx) => rx,
        Err(e) => {
            tracing::warn!("WebSocket client rejected: {}", e);
            return;
        }
    };

    let Ok(connected) = serde_json::to_string(&Hello::Connected) else {
        return;
    };
    if sender.send(Message::Text(connected)).await.is_err() {
        return;
    }

    let send_task = tokio::spawn(async move {
        loop {
            match event_rx.recv().await {
                Ok(event) => {
                    let json = match serde_json::to_string(&event) {
                        Ok(json) => json,
                        Err(e) => {
                            tracing::warn!("Failed to encode climate event: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    tracing::debug!("WebSocket client skipped {} events", missed);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    // clients only listen; drain until they hang up
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {}
        }
    }

    send_task.abort();
}
