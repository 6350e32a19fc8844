// SPDX-FileCopyrightText: © 2025 Airwave Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Per-connection WebSocket loop.
//!
//! Every connection is at once an observer (it receives bus events), a
//! potential producer (binary frames after `startstream`) and a potential
//! listener (relayed binary frames after `joinlistener`).

use axum::extract::ws::{Message as WsMessage, WebSocket};
use opentelemetry::{global, KeyValue};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::sync::OnceLock;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use airwave_api::{
    Event as ApiEvent, EventPayload, Request as ApiRequest, Response as ApiResponse,
    ResponsePayload,
};
use airwave_core::{BusEvent, ConnectionId, Delivery, StreamId};

use crate::state::AppState;
use crate::websocket_handlers::{self, ListenerChange};
use crate::wire;

static ACTIVE_CONNECTIONS: AtomicU64 = AtomicU64::new(0);

/// Serializes and sends a JSON message. `Err(())` means the connection should close.
///
/// The `Sync` bound on `T` is required because the message reference crosses an `.await` point.
async fn send_json_message<T: Serialize + Sync>(
    socket: &mut WebSocket,
    message: &T,
    message_type: &str,
) -> Result<(), ()> {
    match serde_json::to_string(message) {
        Ok(json) => {
            if socket.send(WsMessage::Text(json.into())).await.is_err() {
                warn!("Failed to send WebSocket {}", message_type);
                Err(())
            } else {
                Ok(())
            }
        },
        Err(e) => {
            error!(error = %e, "Failed to serialize {}", message_type);
            Err(())
        },
    }
}

#[derive(Clone)]
struct WebSocketMetrics {
    connections_gauge: opentelemetry::metrics::Gauge<u64>,
    messages_counter: opentelemetry::metrics::Counter<u64>,
    errors_counter: opentelemetry::metrics::Counter<u64>,
}

impl WebSocketMetrics {
    fn shared() -> Self {
        static METRICS: OnceLock<WebSocketMetrics> = OnceLock::new();
        METRICS
            .get_or_init(|| {
                let meter = global::meter("airwave_ws");
                Self {
                    connections_gauge: meter
                        .u64_gauge("websocket.connections.active")
                        .with_description("Number of active WebSocket connections")
                        .build(),
                    messages_counter: meter
                        .u64_counter("websocket.messages")
                        .with_description("Total WebSocket messages")
                        .build(),
                    errors_counter: meter
                        .u64_counter("websocket.errors")
                        .with_description("WebSocket errors")
                        .build(),
                }
            })
            .clone()
    }
}

/// Per-connection bookkeeping owned by the connection loop.
struct Connection {
    id: ConnectionId,
    /// Last stream this connection joined. Its `streamended` arrives through the
    /// delivery queue, ordered after the final chunks, so the bus copy is skipped.
    joined: Option<StreamId>,
    max_message_bytes: usize,
    metrics: WebSocketMetrics,
}

impl Connection {
    fn wants_bus_event(&self, event: &BusEvent) -> bool {
        match event {
            BusEvent::StreamEnded { stream_id, .. } => self.joined.as_ref() != Some(stream_id),
            _ => true,
        }
    }
}

async fn send_greeting(socket: &mut WebSocket, app_state: &AppState, conn: &Connection) -> Result<(), ()> {
    let connected = ApiResponse::response(
        None,
        ResponsePayload::Connected {
            connection_id: conn.id.to_string(),
            message: "Connected to Airwave".to_string(),
        },
    );
    send_json_message(socket, &connected, "greeting").await?;

    let background = wire::background_status(app_state.scheduler.status().await);
    let streams = app_state.relay.active_streams().await.iter().map(wire::stream_info).collect();
    let snapshot = ApiEvent::event(EventPayload::Snapshot { background, streams });
    send_json_message(socket, &snapshot, "snapshot").await
}

/// Handles a text frame. Returns false if the connection should close.
async fn handle_client_message(
    socket: &mut WebSocket,
    text: &str,
    app_state: &AppState,
    conn: &mut Connection,
) -> bool {
    conn.metrics.messages_counter.add(1, &[KeyValue::new("direction", "inbound")]);

    let request: ApiRequest = match serde_json::from_str(text) {
        Ok(req) => req,
        Err(e) => {
            warn!(error = %e, message_len = text.len(), "Failed to parse WebSocket message");
            conn.metrics.errors_counter.add(1, &[KeyValue::new("error_type", "parse_error")]);
            let error_response = ApiResponse::response(
                None,
                ResponsePayload::Error { message: format!("Invalid JSON: {e}") },
            );
            return send_json_message(socket, &error_response, "error response").await.is_ok();
        },
    };

    let correlation_id = request.correlation_id.clone();
    let handled =
        websocket_handlers::handle_request_payload(request.payload, app_state, &conn.id).await;

    match handled.listener_change {
        Some(ListenerChange::Joined(stream_id)) => conn.joined = Some(stream_id),
        Some(ListenerChange::Left) => conn.joined = None,
        None => {},
    }

    conn.metrics.messages_counter.add(1, &[KeyValue::new("direction", "outbound")]);
    let response = ApiResponse::response(correlation_id, handled.response);
    if send_json_message(socket, &response, "response").await.is_err() {
        conn.metrics.errors_counter.add(1, &[KeyValue::new("error_type", "send_error")]);
        return false;
    }
    true
}

fn too_large(conn: &Connection, len: usize) -> bool {
    if len <= conn.max_message_bytes {
        return false;
    }
    warn!(
        connection_id = %conn.id,
        message_len = len,
        max_len = conn.max_message_bytes,
        "Rejected WebSocket message: too large"
    );
    conn.metrics.errors_counter.add(1, &[KeyValue::new("error_type", "message_too_large")]);
    true
}

/// Main WebSocket connection handler.
#[allow(clippy::cognitive_complexity)]
pub async fn handle_websocket(mut socket: WebSocket, app_state: Arc<AppState>) {
    let mut conn = Connection {
        id: ConnectionId::new(),
        joined: None,
        max_message_bytes: app_state.config.server.max_ws_message_bytes,
        metrics: WebSocketMetrics::shared(),
    };
    info!(connection_id = %conn.id, "WebSocket connection established");

    let active = ACTIVE_CONNECTIONS.fetch_add(1, Ordering::Relaxed) + 1;
    conn.metrics.connections_gauge.record(active, &[]);

    // Subscribe before taking the snapshot so no delta falls in between.
    let mut event_rx = app_state.bus.subscribe();
    let mut deliveries = app_state.relay.attach(conn.id.clone()).await;

    if send_greeting(&mut socket, &app_state, &conn).await.is_ok() {
        loop {
            tokio::select! {
                Some(msg) = socket.recv() => {
                    match msg {
                        Ok(WsMessage::Text(text)) => {
                            if too_large(&conn, text.len()) {
                                let error_response = ApiResponse::response(
                                    None,
                                    ResponsePayload::Error {
                                        message: format!(
                                            "WebSocket message too large (max {} bytes)",
                                            conn.max_message_bytes
                                        ),
                                    },
                                );
                                let _ = send_json_message(&mut socket, &error_response, "error response").await;
                                let _ = socket.send(WsMessage::Close(None)).await;
                                break;
                            }
                            if !handle_client_message(&mut socket, text.as_str(), &app_state, &mut conn).await {
                                break;
                            }
                        }
                        Ok(WsMessage::Binary(chunk)) => {
                            if too_large(&conn, chunk.len()) {
                                let _ = socket.send(WsMessage::Close(None)).await;
                                break;
                            }
                            let fanout = app_state.relay.relay_chunk(&conn.id, chunk).await;
                            if fanout.dropped > 0 {
                                debug!(connection_id = %conn.id, dropped = fanout.dropped, "Chunk dropped for slow listeners");
                            }
                        }
                        Ok(WsMessage::Close(_)) => {
                            info!(connection_id = %conn.id, "WebSocket connection closed");
                            break;
                        }
                        Err(e) => {
                            error!(connection_id = %conn.id, error = %e, "WebSocket error");
                            conn.metrics.errors_counter.add(1, &[KeyValue::new("error_type", "connection_error")]);
                            break;
                        }
                        _ => {}
                    }
                },

                Some(delivery) = deliveries.recv() => {
                    let sent = match delivery {
                        Delivery::Audio(chunk) => socket.send(WsMessage::Binary(chunk)).await.map_err(|_| ()),
                        Delivery::StreamEnded { stream_id, title, reason } => {
                            let event = ApiEvent::event(EventPayload::StreamEnded {
                                stream_id: stream_id.to_string(),
                                title,
                                reason,
                            });
                            send_json_message(&mut socket, &event, "stream ended").await
                        }
                    };
                    if sent.is_err() {
                        conn.metrics.errors_counter.add(1, &[KeyValue::new("error_type", "send_error")]);
                        break;
                    }
                },

                event_result = event_rx.recv() => {
                    let event = match event_result {
                        Ok(event) => event,
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(connection_id = %conn.id, skipped, "WebSocket event receiver lagged; dropping events to catch up");
                            conn.metrics.errors_counter.add(1, &[KeyValue::new("error_type", "recv_lagged")]);
                            continue;
                        }
                        Err(RecvError::Closed) => {
                            warn!("Event bus closed; terminating connection");
                            break;
                        }
                    };

                    if !conn.wants_bus_event(&event) {
                        continue;
                    }
                    conn.metrics.messages_counter.add(1, &[KeyValue::new("direction", "outbound")]);
                    let message = ApiEvent::event(wire::event_payload(event));
                    if send_json_message(&mut socket, &message, "event").await.is_err() {
                        conn.metrics.errors_counter.add(1, &[KeyValue::new("error_type", "send_error")]);
                        break;
                    }
                }
                else => break,
            }
        }
    }

    app_state.relay.detach(&conn.id).await;

    let prev = ACTIVE_CONNECTIONS.fetch_sub(1, Ordering::Relaxed);
    conn.metrics.connections_gauge.record(prev.saturating_sub(1), &[]);
    info!(connection_id = %conn.id, "WebSocket connection terminated");
}
