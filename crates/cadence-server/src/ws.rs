//! WebSocket transport adapter.
//!
//! One task per connection. Outbound frames from the broker arrive on a
//! per-socket queue so a slow peer never stalls session handling; inbound
//! text frames go through the codec and into the broker. A periodic
//! liveness probe terminates connections that missed a full cycle.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use cadence_protocol::{codec, ClientMessage, ServerMessage};

use crate::broker::SocketCtx;
use crate::http::AppState;
use crate::metrics::{self, SocketGauge};

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Drive one WebSocket connection until it closes.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let _socket_gauge = SocketGauge::open();

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let mut ctx = SocketCtx::new(tx);

    debug!(connection = %ctx.socket_id, "WebSocket connected");

    let mut heartbeat =
        tokio::time::interval(Duration::from_millis(state.config.heartbeat.interval_ms.max(1)));
    let mut is_alive = true;

    loop {
        tokio::select! {
            biased;

            // Outbound frames queued by the broker.
            Some(frame) = rx.recv() => {
                metrics::frame_sent(frame.len());
                if sink.send(Message::Text(frame)).await.is_err() {
                    break;
                }
            }

            // Liveness probe: a connection that missed a full cycle is dead.
            _ = heartbeat.tick() => {
                if !is_alive {
                    debug!(connection = %ctx.socket_id, "Heartbeat missed, terminating");
                    metrics::heartbeat_drop();
                    break;
                }
                is_alive = false;
                if sink.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }

            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        is_alive = true;
                        let start = Instant::now();
                        metrics::frame_received(text.len());
                        handle_frame(&text, &mut ctx, &state).await;
                        metrics::dispatch_complete(start);
                    }
                    Some(Ok(Message::Ping(data))) => {
                        is_alive = true;
                        if sink.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        is_alive = true;
                    }
                    Some(Ok(Message::Binary(_))) => {
                        // Text-frame protocol only.
                        send(&ctx, &ServerMessage::error("Invalid message format"));
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %ctx.socket_id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %ctx.socket_id, error = %e, "WebSocket error");
                        metrics::socket_error();
                        break;
                    }
                    None => {
                        debug!(connection = %ctx.socket_id, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    state.broker.remove_client(&ctx).await;
    debug!(connection = %ctx.socket_id, "WebSocket disconnected");
}

/// Decode one text frame and dispatch it.
async fn handle_frame(text: &str, ctx: &mut SocketCtx, state: &Arc<AppState>) {
    match codec::decode(text) {
        // Heartbeats never reach session logic.
        Ok(ClientMessage::Ping) => send(ctx, &ServerMessage::Pong),
        Ok(message) => state.broker.handle_message(ctx, message).await,
        Err(e) => {
            metrics::frame_rejected(&e);
            send(ctx, &ServerMessage::error(e.to_string()));
        }
    }
}

/// Queue a message onto this socket's outbound channel.
fn send(ctx: &SocketCtx, message: &ServerMessage) {
    if let Ok(frame) = codec::encode(message) {
        let _ = ctx.sender.send(frame);
    }
}
