use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use cache::{Clock, SharedClock};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use presence::PlayerId;
use serde::Deserialize;
use tokio::time::MissedTickBehavior;

use crate::channels::{DisconnectCause, NetEvent, NetTx};
use crate::protocol::{ClientMessage, PushEvent, PushMessage};
use crate::push_hub::{PushHub, PushRx};

/// Push connection timing.
#[derive(Debug, Clone)]
pub struct PushConfig {
    /// Server ping cadence.
    pub ping_interval: Duration,
    /// Close the connection after this long without any client frame.
    pub silence_timeout: Duration,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(1),
            silence_timeout: Duration::from_secs(10),
        }
    }
}

/// Shared state for the push WebSocket handler.
#[derive(Clone)]
pub struct PushState {
    pub hub: Arc<PushHub>,
    pub net_tx: NetTx,
    pub clock: SharedClock,
    pub config: PushConfig,
}

#[derive(Debug, Deserialize)]
struct ConnectParams {
    player_id: PlayerId,
}

/// `/ws?player_id=<id>` upgrade route, ready to merge into the server router.
pub fn push_routes(state: PushState) -> Router {
    Router::new()
        .route("/ws", get(ws_upgrade_handler))
        .with_state(state)
}

async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<PushState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_push_connection(socket, params.player_id, state))
}

async fn handle_push_connection(socket: WebSocket, player_id: PlayerId, state: PushState) {
    let (handle, push_rx) = state.hub.register(player_id);
    let conn_id = handle.conn_id;
    tracing::info!(player_id, conn_id, "push connection opened");
    let _ = state.net_tx.send(NetEvent::Connected { player_id, conn_id });

    let (ws_writer, mut ws_reader) = socket.split();
    let writer_handle = tokio::spawn(run_writer(ws_writer, push_rx, state.config.ping_interval));

    let cause = loop {
        let next = tokio::time::timeout(state.config.silence_timeout, ws_reader.next()).await;
        match next {
            Err(_) => break DisconnectCause::Silent,
            Ok(None) => break DisconnectCause::Closed,
            Ok(Some(Ok(Message::Text(text)))) => match serde_json::from_str::<ClientMessage>(text.as_str()) {
                Ok(ClientMessage::Ping) => {
                    let _ = state.net_tx.send(NetEvent::Ping { player_id });
                    let pong = PushMessage::new(player_id, state.clock.now_millis(), PushEvent::Pong);
                    state.hub.send(player_id, pong);
                }
                Err(e) => {
                    tracing::debug!(player_id, "ignoring malformed client message: {}", e);
                }
            },
            Ok(Some(Ok(Message::Close(_)))) => break DisconnectCause::Closed,
            // Pong and binary frames still prove the client is alive.
            Ok(Some(Ok(_))) => {}
            Ok(Some(Err(e))) => {
                tracing::debug!(player_id, "push connection read error: {}", e);
                break DisconnectCause::Error;
            }
        }
    };

    state.hub.unregister(&handle);
    writer_handle.abort();
    let _ = state.net_tx.send(NetEvent::Disconnected {
        player_id,
        conn_id,
        cause,
    });
    tracing::info!(player_id, conn_id, ?cause, "push connection closed");
}

/// Forward queued push messages as text frames and ping on a fixed cadence.
async fn run_writer(
    mut ws_writer: SplitSink<WebSocket, Message>,
    mut push_rx: PushRx,
    ping_interval: Duration,
) {
    let mut ticker = tokio::time::interval(ping_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            maybe = push_rx.recv() => {
                let Some(msg) = maybe else { break };
                let text = match serde_json::to_string(&msg) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(user_id = msg.user_id, kind = msg.kind(), "push encode failed: {}", e);
                        continue;
                    }
                };
                if ws_writer.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            _ = ticker.tick() => {
                if ws_writer.send(Message::Ping(Default::default())).await.is_err() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_state_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<PushState>();
    }

    #[test]
    fn default_timing_matches_heartbeat_policy() {
        let config = PushConfig::default();
        assert_eq!(config.ping_interval, Duration::from_secs(1));
        assert_eq!(config.silence_timeout, Duration::from_secs(10));
    }
}
