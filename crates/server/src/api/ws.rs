//! WebSocket change feed.
//!
//! `GET /ws?path=favorites` upgrades and streams every change event under
//! that path as JSON. Events carry no rows; clients re-query.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use moviecache_core::{ChangeEvent, ChangeKind, ResourcePath, Subscription};

use super::handlers::cache_error;
use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_MESSAGES_SENT};
use crate::state::AppState;

/// WebSocket message sent to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// Sent once after the upgrade.
    Subscribed { path: String },
    /// Something under the subscribed path changed.
    Change {
        path: String,
        kind: ChangeKind,
        at: DateTime<Utc>,
    },
}

impl From<ChangeEvent> for WsMessage {
    fn from(event: ChangeEvent) -> Self {
        WsMessage::Change {
            path: event.path.to_string(),
            kind: event.kind,
            at: event.at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub path: String,
}

/// WebSocket upgrade handler.
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let path = match ResourcePath::parse(&params.path) {
        Ok(path) => path,
        Err(e) => return cache_error(e.into()).into_response(),
    };

    // Subscribe before the upgrade so no event between the two is lost.
    let subscription = state.cache().subscribe(path);
    ws.on_upgrade(move |socket| handle_socket(socket, subscription))
}

async fn send(
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &WsMessage,
) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            error!("Failed to serialize WsMessage: {}", e);
            true
        }
    }
}

/// Handle a single WebSocket connection.
async fn handle_socket(socket: WebSocket, mut subscription: Subscription) {
    let (mut sender, mut receiver) = socket.split();
    let path = subscription.path();

    WS_CONNECTIONS_TOTAL.inc();
    WS_CONNECTIONS_ACTIVE.inc();
    info!("WebSocket client subscribed to {}", path);

    let send_task = tokio::spawn(async move {
        let hello = WsMessage::Subscribed {
            path: path.to_string(),
        };
        if !send(&mut sender, &hello).await {
            return;
        }

        while let Some(event) = subscription.recv().await {
            WS_MESSAGES_SENT
                .with_label_values(&[event.kind.as_str()])
                .inc();
            if !send(&mut sender, &WsMessage::from(event)).await {
                debug!("WebSocket send failed, client disconnected");
                break;
            }
        }
    });

    // Drain client messages until close; the feed is one-way.
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Close(_)) => {
                debug!("WebSocket client requested close");
                break;
            }
            Ok(Message::Text(text)) => {
                debug!("Ignoring client message: {}", text);
            }
            Ok(_) => {}
            Err(e) => {
                warn!("WebSocket receive error: {}", e);
                break;
            }
        }
    }

    // Aborting drops the subscription, which unsubscribes it.
    send_task.abort();
    WS_CONNECTIONS_ACTIVE.dec();
    info!("WebSocket client disconnected");
}
