// SPDX-FileCopyrightText: © 2025 Airwave Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! WebSocket API request handlers.
//!
//! One function per request action. Each returns the response payload to send
//! back on the same connection; domain errors become `error` responses.

use airwave_api::{RequestPayload, ResponsePayload};
use airwave_core::relay::REASON_ENDED_BY_PRODUCER;
use airwave_core::{AirwaveError, ConnectionId, StreamId};
use tracing::{debug, warn};

use crate::state::AppState;

/// Outcome of a request that the connection loop needs to know about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerChange {
    Joined(StreamId),
    Left,
}

pub struct HandledRequest {
    pub response: ResponsePayload,
    pub listener_change: Option<ListenerChange>,
}

impl From<ResponsePayload> for HandledRequest {
    fn from(response: ResponsePayload) -> Self {
        Self { response, listener_change: None }
    }
}

fn error_response(err: &AirwaveError) -> ResponsePayload {
    ResponsePayload::Error { message: err.to_string() }
}

pub async fn handle_request_payload(
    payload: RequestPayload,
    app_state: &AppState,
    connection_id: &ConnectionId,
) -> HandledRequest {
    match payload {
        RequestPayload::StartStream { title, streamer_name } => {
            handle_start_stream(title, streamer_name, app_state, connection_id).await.into()
        },
        RequestPayload::EndStream => handle_end_stream(app_state, connection_id).await.into(),
        RequestPayload::JoinListener { stream_id } => {
            handle_join_listener(stream_id, app_state, connection_id).await
        },
        RequestPayload::LeaveListener => handle_leave_listener(app_state, connection_id).await,
        RequestPayload::Ping => ResponsePayload::Pong.into(),
    }
}

async fn handle_start_stream(
    title: Option<String>,
    streamer_name: Option<String>,
    app_state: &AppState,
    connection_id: &ConnectionId,
) -> ResponsePayload {
    match app_state.relay.start_stream(connection_id.clone(), title, streamer_name).await {
        Ok(session) => ResponsePayload::StreamConfirmed {
            stream_id: session.stream_id.to_string(),
            title: session.title,
        },
        Err(e) => {
            warn!(connection_id = %connection_id, error = %e, "Failed to start stream");
            error_response(&e)
        },
    }
}

async fn handle_end_stream(app_state: &AppState, connection_id: &ConnectionId) -> ResponsePayload {
    let Some(stream_id) = app_state.relay.stream_of_producer(connection_id).await else {
        debug!(connection_id = %connection_id, "End requested but connection is not broadcasting");
        return ResponsePayload::StreamEnded { stream_id: None };
    };

    let ended = app_state.relay.end_stream(&stream_id, REASON_ENDED_BY_PRODUCER).await;
    ResponsePayload::StreamEnded { stream_id: ended.then(|| stream_id.to_string()) }
}

async fn handle_join_listener(
    stream_id: Option<String>,
    app_state: &AppState,
    connection_id: &ConnectionId,
) -> HandledRequest {
    let requested = stream_id.filter(|id| !id.is_empty()).map(StreamId::from);
    match app_state.relay.join_listener(connection_id.clone(), requested.as_ref()).await {
        Ok(joined) => HandledRequest {
            listener_change: Some(ListenerChange::Joined(joined.stream_id.clone())),
            response: ResponsePayload::StreamJoined {
                stream_id: joined.stream_id.to_string(),
                title: joined.title,
                streamer_name: joined.streamer_name,
                listener_count: joined.listener_count,
            },
        },
        Err(e) => {
            debug!(connection_id = %connection_id, error = %e, "Join rejected");
            error_response(&e).into()
        },
    }
}

async fn handle_leave_listener(app_state: &AppState, connection_id: &ConnectionId) -> HandledRequest {
    if !app_state.relay.leave_listener(connection_id).await {
        debug!(connection_id = %connection_id, "Leave requested but connection was not listening");
    }
    HandledRequest { response: ResponsePayload::ListenerLeft, listener_change: Some(ListenerChange::Left) }
}
