//! WebSocket device link.
//!
//! The companion side of the device connection. Each inbound text frame is
//! a JSON device message and is handed to the session; settings messages
//! published by the session are sent back as text frames.

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use lifelog_types::DeviceMessage;

use crate::state::AppState;

/// Create the WebSocket router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/api/device/ws", get(ws_handler))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.device_tx.subscribe();

    info!("Device link connected");

    let mut send_task = tokio::spawn(async move {
        loop {
            let msg = match rx.recv().await {
                Ok(msg) => msg,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Device link lagged, skipped {} message(s)", skipped);
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            let json = match serde_json::to_string(&msg) {
                Ok(j) => j,
                Err(e) => {
                    warn!("Failed to serialize device message: {}", e);
                    continue;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let session = state.session.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Text(text)) => match parse_frame(text.as_str()) {
                    Some(msg) => {
                        if session.device_message(msg).is_err() {
                            warn!("Session stopped, closing device link");
                            break;
                        }
                    }
                    None => continue,
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!("Device link receive error: {}", e);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        },
        _ = &mut recv_task => {
            send_task.abort();
        },
    }

    info!("Device link disconnected");
}

/// Decode one inbound text frame.
fn parse_frame(text: &str) -> Option<DeviceMessage> {
    match serde_json::from_str(text) {
        Ok(msg) => {
            debug!("Received device message");
            Some(msg)
        }
        Err(e) => {
            warn!("Ignoring undecodable device frame: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifelog_types::{Tuple, keys};

    #[test]
    fn test_parse_frame() {
        let msg = parse_frame(r#"{"500": 7, "510": "line"}"#).unwrap();
        assert_eq!(msg.get(keys::RECORD_KEY), Some(&Tuple::Int(7)));
        assert_eq!(msg.get(keys::RECORD_LINE), Some(&Tuple::from("line")));
    }

    #[test]
    fn test_parse_frame_rejects_garbage() {
        assert!(parse_frame("hello").is_none());
        assert!(parse_frame(r#"{"not-a-number": 1}"#).is_none());
    }

    #[test]
    fn test_parse_frame_skips_unsupported_values() {
        let msg = parse_frame(r#"{"500": 7, "510": "line", "700": [1, 2], "701": false}"#).unwrap();
        let record = crate::bridge::parse_inbound(&msg).unwrap();
        assert_eq!(record.key, "7");
        assert_eq!(record.line, "line");

        // A record key of an unsupported type reads as missing
        let msg = parse_frame(r#"{"500": [1, 2], "510": "line"}"#).unwrap();
        assert!(crate::bridge::parse_inbound(&msg).is_err());
    }
}
