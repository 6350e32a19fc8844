// SPDX-FileCopyrightText: © 2025 Airwave Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Broadcast relay: routes control events and audio chunks from a producer to
//! the consumers subscribed to its stream.
//!
//! The registry, the lifecycle tracker and the table of connection sinks live
//! behind a single lock, so a chunk relay and an `end_stream` can never
//! interleave: once a stream is ended no consumer is handed another chunk for it.
//! Nothing in here awaits while holding that lock.

use bytes::Bytes;
use opentelemetry::{global, KeyValue};
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::bus::{BusEvent, EventBus};
use crate::error::{AirwaveError, Result};
use crate::lifecycle::{StreamLifecycle, StreamPhase};
use crate::registry::{BroadcastSession, SessionRegistry};
use crate::sink::{AudioOffer, ClientSink, Delivery, DeliveryReceiver};
use crate::types::{ConnectionId, ListenerCount, StreamId};

pub const DEFAULT_TITLE: &str = "Untitled Stream";
pub const DEFAULT_PRODUCER_NAME: &str = "Anonymous";
pub const REASON_PRODUCER_DISCONNECTED: &str = "producer disconnected";
pub const REASON_ENDED_BY_PRODUCER: &str = "ended by producer";

pub const DEFAULT_MAX_PENDING_CHUNKS: usize = 64;

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Undelivered audio chunks a single consumer may accumulate before new
    /// chunks are dropped for it.
    pub max_pending_chunks: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self { max_pending_chunks: DEFAULT_MAX_PENDING_CHUNKS }
    }
}

/// What a listener learns about the stream it just joined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamJoined {
    pub stream_id: StreamId,
    pub title: String,
    pub streamer_name: String,
    pub listener_count: ListenerCount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    pub active_streams: usize,
    pub total_listeners: usize,
    pub connected_clients: usize,
}

/// Per-call outcome of [`BroadcastRelay::relay_chunk`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkFanout {
    pub delivered: usize,
    pub dropped: usize,
}

#[derive(Default)]
struct RelayState {
    registry: SessionRegistry,
    lifecycle: StreamLifecycle,
    connections: HashMap<ConnectionId, ClientSink>,
}

struct RelayMetrics {
    chunks_counter: opentelemetry::metrics::Counter<u64>,
    bytes_counter: opentelemetry::metrics::Counter<u64>,
    dropped_counter: opentelemetry::metrics::Counter<u64>,
}

impl Default for RelayMetrics {
    fn default() -> Self {
        let meter = global::meter("airwave_relay");
        Self {
            chunks_counter: meter
                .u64_counter("relay.chunks")
                .with_description("Audio chunks received from producers")
                .build(),
            bytes_counter: meter
                .u64_counter("relay.bytes")
                .with_description("Audio bytes delivered to consumers")
                .with_unit("By")
                .build(),
            dropped_counter: meter
                .u64_counter("relay.chunks.dropped")
                .with_description("Audio chunks dropped for consumers that fell behind")
                .build(),
        }
    }
}

pub struct BroadcastRelay {
    state: Mutex<RelayState>,
    bus: EventBus,
    config: RelayConfig,
    metrics: RelayMetrics,
}

impl BroadcastRelay {
    pub fn new(bus: EventBus, config: RelayConfig) -> Self {
        Self { state: Mutex::new(RelayState::default()), bus, config, metrics: RelayMetrics::default() }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Registers a connection and returns the queue its transport task drains.
    pub async fn attach(&self, connection_id: ConnectionId) -> DeliveryReceiver {
        let (sink, rx) = ClientSink::channel(self.config.max_pending_chunks);
        let previous = self.state.lock().await.connections.insert(connection_id.clone(), sink);
        if previous.is_some() {
            tracing::warn!(connection_id = %connection_id, "Connection attached twice; replacing sink");
        }
        rx
    }

    /// Disconnect cleanup. A producing connection ends its stream immediately;
    /// a listening connection leaves its stream.
    pub async fn detach(&self, connection_id: &ConnectionId) {
        let mut state = self.state.lock().await;
        if let Some(stream_id) = state.registry.stream_for_producer(connection_id).cloned() {
            self.end_locked(&mut state, &stream_id, REASON_PRODUCER_DISCONNECTED);
        }
        self.leave_locked(&mut state, connection_id);
        state.connections.remove(connection_id);
        drop(state);
        tracing::debug!(connection_id = %connection_id, "Connection detached from relay");
    }

    /// Starts a new broadcast for `producer_id` under a freshly minted stream id.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyLive` if the connection is already broadcasting.
    pub async fn start_stream(
        &self,
        producer_id: ConnectionId,
        title: Option<String>,
        producer_name: Option<String>,
    ) -> Result<BroadcastSession> {
        let title = non_empty_or(title, DEFAULT_TITLE);
        let producer_name = non_empty_or(producer_name, DEFAULT_PRODUCER_NAME);
        let stream_id = StreamId::new();

        let mut state = self.state.lock().await;
        let session = state.registry.register_producer(
            stream_id.clone(),
            producer_id,
            title,
            producer_name,
        )?;
        if let Err(e) = state.lifecycle.begin(&stream_id) {
            state.registry.unregister_producer(&stream_id);
            return Err(e);
        }

        self.bus.publish(BusEvent::StreamStarted {
            stream_id: stream_id.clone(),
            title: session.title.clone(),
            streamer_name: session.producer_name.clone(),
        });
        drop(state);

        tracing::info!(
            stream_id = %stream_id,
            title = %session.title,
            streamer = %session.producer_name,
            "Stream started"
        );
        Ok(session)
    }

    /// Ends a broadcast. Unknown or already-ended streams are a no-op; returns
    /// true only for the call that actually ended it.
    pub async fn end_stream(&self, stream_id: &StreamId, reason: &str) -> bool {
        let mut state = self.state.lock().await;
        self.end_locked(&mut state, stream_id, reason)
    }

    /// Ends whatever `producer_id` is currently broadcasting, if anything.
    pub async fn end_stream_for_producer(&self, producer_id: &ConnectionId, reason: &str) -> bool {
        let mut state = self.state.lock().await;
        let Some(stream_id) = state.registry.stream_for_producer(producer_id).cloned() else {
            return false;
        };
        self.end_locked(&mut state, &stream_id, reason)
    }

    /// Forwards one chunk from `producer_id` to every consumer subscribed at
    /// this instant. Silently does nothing if the producer is not live or has
    /// no listeners.
    pub async fn relay_chunk(&self, producer_id: &ConnectionId, chunk: Bytes) -> ChunkFanout {
        let state = self.state.lock().await;
        let RelayState { registry, connections, .. } = &*state;

        let Some(session) = registry.stream_for_producer(producer_id).and_then(|id| registry.get(id))
        else {
            return ChunkFanout::default();
        };
        self.metrics.chunks_counter.add(1, &[]);

        let mut fanout = ChunkFanout::default();
        for consumer in session.consumers() {
            let Some(sink) = connections.get(consumer) else {
                continue;
            };
            match sink.offer_audio(chunk.clone()) {
                AudioOffer::Queued => fanout.delivered += 1,
                AudioOffer::DroppedSlow => {
                    fanout.dropped += 1;
                    self.metrics.dropped_counter.add(1, &[KeyValue::new("reason", "slow")]);
                    tracing::debug!(
                        stream_id = %session.stream_id,
                        consumer_id = %consumer,
                        "Consumer fell behind; dropping chunk"
                    );
                },
                AudioOffer::Closed => {
                    fanout.dropped += 1;
                    self.metrics.dropped_counter.add(1, &[KeyValue::new("reason", "closed")]);
                },
            }
        }
        self.metrics.bytes_counter.add((chunk.len() * fanout.delivered) as u64, &[]);
        fanout
    }

    /// Subscribes `consumer_id` to `requested`, or to the first live stream when
    /// no id is given.
    ///
    /// # Errors
    ///
    /// `NotFound` for an explicit id that is not live, `NoActiveStreams` when
    /// nothing is broadcasting.
    pub async fn join_listener(
        &self,
        consumer_id: ConnectionId,
        requested: Option<&StreamId>,
    ) -> Result<StreamJoined> {
        let mut state = self.state.lock().await;
        let stream_id = state.registry.resolve_stream(requested)?;

        if state.registry.subscription_of(&consumer_id).is_some_and(|current| *current != stream_id)
        {
            self.leave_locked(&mut state, &consumer_id);
        }

        let listener_count = state.registry.register_consumer(consumer_id.clone(), &stream_id)?;
        let session = state
            .registry
            .get(&stream_id)
            .ok_or_else(|| AirwaveError::NotFound(format!("Stream {stream_id}")))?;
        let joined = StreamJoined {
            stream_id: stream_id.clone(),
            title: session.title.clone(),
            streamer_name: session.producer_name.clone(),
            listener_count,
        };
        self.bus.publish(BusEvent::ListenerCount { stream_id, count: listener_count });
        drop(state);

        tracing::info!(
            consumer_id = %consumer_id,
            stream_id = %joined.stream_id,
            listeners = listener_count,
            "Listener joined stream"
        );
        Ok(joined)
    }

    /// Drops the consumer's subscription. Returns false if it was not listening.
    pub async fn leave_listener(&self, consumer_id: &ConnectionId) -> bool {
        let mut state = self.state.lock().await;
        self.leave_locked(&mut state, consumer_id)
    }

    pub async fn stream_phase(&self, stream_id: &StreamId) -> StreamPhase {
        self.state.lock().await.lifecycle.phase(stream_id)
    }

    pub async fn stream_of_producer(&self, producer_id: &ConnectionId) -> Option<StreamId> {
        self.state.lock().await.registry.stream_for_producer(producer_id).cloned()
    }

    pub async fn subscription_of(&self, consumer_id: &ConnectionId) -> Option<StreamId> {
        self.state.lock().await.registry.subscription_of(consumer_id).cloned()
    }

    pub async fn active_streams(&self) -> Vec<BroadcastSession> {
        self.state.lock().await.registry.list_active_streams()
    }

    pub async fn stats(&self) -> RelayStats {
        let state = self.state.lock().await;
        RelayStats {
            active_streams: state.registry.stream_count(),
            total_listeners: state.registry.total_listeners(),
            connected_clients: state.connections.len(),
        }
    }

    fn end_locked(&self, state: &mut RelayState, stream_id: &StreamId, reason: &str) -> bool {
        let Some(session) = state.registry.get(stream_id) else {
            return false;
        };
        let title = session.title.clone();

        for consumer in session.consumers() {
            if let Some(sink) = state.connections.get(consumer) {
                sink.notify(Delivery::StreamEnded {
                    stream_id: stream_id.clone(),
                    title: title.clone(),
                    reason: reason.to_string(),
                });
            }
        }

        let removed = state.registry.unregister_producer(stream_id);
        state.lifecycle.end(stream_id);

        self.bus.publish(BusEvent::StreamEnded {
            stream_id: stream_id.clone(),
            title: title.clone(),
            reason: reason.to_string(),
        });

        tracing::info!(
            stream_id = %stream_id,
            title = %title,
            reason,
            listeners = removed.as_ref().map_or(0, BroadcastSession::listener_count),
            "Stream ended"
        );
        true
    }

    fn leave_locked(&self, state: &mut RelayState, consumer_id: &ConnectionId) -> bool {
        let Some((stream_id, count)) = state.registry.unregister_consumer(consumer_id) else {
            return false;
        };
        tracing::info!(consumer_id = %consumer_id, stream_id = %stream_id, listeners = count, "Listener left stream");
        self.bus.publish(BusEvent::ListenerCount { stream_id, count });
        true
    }
}

fn non_empty_or(value: Option<String>, fallback: &str) -> String {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}
