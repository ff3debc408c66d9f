use std::sync::Arc;

use axum::extract::rejection::PathRejection;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use futures::SinkExt;
use futures::StreamExt;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::notify::Subscription;
use crate::state::AppState;

/// Streams every post-update snapshot of one booking, keyed by its internal id.
pub async fn ws_handler(
    id: Result<Path<Uuid>, PathRejection>,
    State(state): State<Arc<AppState>>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let id = match id {
        Ok(Path(id)) => id,
        Err(rejection) => {
            return AppError::Validation(format!("invalid booking id: {}", rejection.body_text()))
                .into_response();
        }
    };

    // Unknown bookings get a 404 before any upgrade negotiation.
    if let Err(err) = state.store.get_by_id(id) {
        return err.into_response();
    }

    match ws {
        Ok(ws) => {
            let subscription = state.notifier.subscribe(id);
            ws.on_upgrade(move |socket| handle_socket(socket, subscription))
        }
        Err(rejection) => rejection.into_response(),
    }
}

async fn handle_socket(socket: WebSocket, mut subscription: Subscription) {
    let booking_id = subscription.booking_id();
    let (mut sender, mut receiver) = socket.split();

    info!(%booking_id, "websocket subscriber connected");

    let mut send_task = tokio::spawn(async move {
        while let Some(booking) = subscription.recv().await {
            let json = match serde_json::to_string(&booking) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize booking for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            if matches!(message, Message::Close(_)) {
                break;
            }
        }
    });

    // Whichever side ends first, the other is torn down so the
    // subscription is released with the socket.
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!(%booking_id, "websocket subscriber disconnected");
}
