// SPDX-FileCopyrightText: © 2025 Airwave Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! api: Defines the WebSocket and HTTP API contract for Airwave.
//!
//! The duplex channel carries two kinds of frames:
//! - **Text** frames hold JSON [`Message`] envelopes (requests, responses, events).
//! - **Binary** frames hold opaque audio chunks. From a producer they are the
//!   stream's audio; to a listener they are the relayed audio of the stream it
//!   joined, byte-for-byte.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

pub use airwave_core::{RotationMode, Track};

// --- Message Types ---

/// The type of WebSocket message being sent or received.
///
/// - **Request**: Client sends to server with correlation_id
/// - **Response**: Server replies with matching correlation_id
/// - **Event**: Server broadcasts to observers (no correlation_id)
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Request,
    Response,
    Event,
}

// --- Base Message ---

/// Generic WebSocket message container for requests, responses, and events.
///
/// # Example (Request)
/// ```json
/// {
///   "type": "request",
///   "correlation_id": "abc123",
///   "payload": { "action": "startstream", "title": "Late Show", "streamer_name": "DJ Kat" }
/// }
/// ```
///
/// # Example (Response)
/// ```json
/// {
///   "type": "response",
///   "correlation_id": "abc123",
///   "payload": { "action": "streamconfirmed", "stream_id": "1b4e…", "title": "Late Show" }
/// }
/// ```
///
/// # Example (Event)
/// ```json
/// {
///   "type": "event",
///   "payload": { "event": "listenercount", "stream_id": "1b4e…", "count": 3 }
/// }
/// ```
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Message<T> {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    /// Present in Request and Response messages, absent in Event messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub payload: T,
}

impl<T> Message<T> {
    pub const fn response(correlation_id: Option<String>, payload: T) -> Self {
        Self { message_type: MessageType::Response, correlation_id, payload }
    }

    pub const fn event(payload: T) -> Self {
        Self { message_type: MessageType::Event, correlation_id: None, payload }
    }
}

// --- Client-to-Server Payloads (Requests) ---

/// Client-to-server request payload types.
///
/// # Producing
/// - `StartStream`: Go live; subsequent binary frames are this stream's audio
/// - `EndStream`: End the broadcast this connection is producing
///
/// # Listening
/// - `JoinListener`: Subscribe to a stream (or the first live one)
/// - `LeaveListener`: Drop the current subscription
///
/// # Misc
/// - `Ping`: Liveness probe
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[ts(export)]
#[serde(tag = "action")]
#[serde(rename_all = "lowercase")]
pub enum RequestPayload {
    StartStream {
        /// Defaults to "Untitled Stream"
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        /// Defaults to "Anonymous"
        #[serde(default, skip_serializing_if = "Option::is_none")]
        streamer_name: Option<String>,
    },
    EndStream,
    JoinListener {
        /// Omit to join the first live stream
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stream_id: Option<String>,
    },
    LeaveListener,
    Ping,
}

pub type Request = Message<RequestPayload>;

// --- Server-to-Client Payloads (Responses) ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[ts(export)]
#[serde(tag = "action")]
#[serde(rename_all = "lowercase")]
pub enum ResponsePayload {
    /// Sent once, unsolicited, right after the connection is accepted.
    Connected { connection_id: String, message: String },
    StreamConfirmed { stream_id: String, title: String },
    StreamJoined {
        stream_id: String,
        title: String,
        streamer_name: String,
        listener_count: usize,
    },
    ListenerLeft,
    /// Acknowledges `endstream`. `stream_id` is absent if nothing was live.
    StreamEnded {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stream_id: Option<String>,
    },
    Pong,
    Error { message: String },
}

pub type Response = Message<ResponsePayload>;

// --- Server-to-Client Payloads (Events) ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
#[ts(export)]
#[serde(tag = "event")]
#[serde(rename_all = "lowercase")]
pub enum EventPayload {
    /// Current state, sent on connect. Deltas follow as individual events.
    Snapshot { background: BackgroundStatus, streams: Vec<StreamInfo> },
    StreamStarted { stream_id: String, title: String, streamer_name: String },
    StreamEnded { stream_id: String, title: String, reason: String },
    ListenerCount { stream_id: String, count: usize },
    BackgroundTrackChanged { track: Option<Track> },
    BackgroundStateChanged { is_active: bool },
}

pub type Event = Message<EventPayload>;

// --- HTTP DTOs ---

/// `GET /api/v1/background-stream/status`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
#[ts(export)]
pub struct BackgroundStatus {
    pub current_track: Option<Track>,
    pub is_active: bool,
    pub rotation_mode: RotationMode,
    /// RFC 3339; only set in timed mode
    pub schedule_expiry: Option<String>,
}

/// `POST /api/v1/background-stream/schedule`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
#[ts(export)]
pub struct ScheduleRequest {
    pub track_id: u64,
    /// Any number; clamped into the configured range and rounded to whole
    /// minutes. Missing or zero means the default (30).
    #[serde(default)]
    pub duration_minutes: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[ts(export)]
pub struct ScheduleInfo {
    pub id: u64,
    pub track_id: u64,
    pub duration_minutes: u32,
    pub created_by: String,
    pub created_at: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[ts(export)]
pub struct ScheduleResponse {
    pub schedule: ScheduleInfo,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[ts(export)]
pub struct OkResponse {
    pub ok: bool,
}

/// `POST /api/v1/background-stream/next`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
#[ts(export)]
pub struct SkipResponse {
    pub ok: bool,
    pub track: Track,
}

/// One entry of `GET /api/v1/streams/active`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[ts(export)]
pub struct StreamInfo {
    pub id: String,
    pub title: String,
    pub streamer_name: String,
    pub listener_count: usize,
    pub start_time: String,
    #[ts(type = "number")]
    pub duration_ms: u64,
}

/// `GET /api/v1/streams/stats`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[ts(export)]
pub struct StreamStats {
    pub active_streams: usize,
    pub total_listeners: usize,
    pub connected_clients: usize,
    #[ts(type = "number")]
    pub uptime_secs: u64,
}

/// `GET /health`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[ts(export)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub active_streams: usize,
    pub total_listeners: usize,
    #[ts(type = "number")]
    pub uptime_secs: u64,
}

/// `GET /`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[ts(export)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
    pub status: String,
    pub endpoints: Vec<String>,
}

/// Body of every non-2xx HTTP response.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[ts(export)]
pub struct ErrorBody {
    pub error: String,
}
