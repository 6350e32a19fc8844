// SPDX-FileCopyrightText: © 2025 Airwave Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! In-memory bookkeeping of live broadcasts and their listeners.
//!
//! The registry is a plain data structure; it performs no I/O and never awaits.
//! The relay owns it behind its own lock, so every mutation here is observed
//! atomically by relay routing decisions.

use indexmap::{IndexMap, IndexSet};
use opentelemetry::global;
use std::collections::HashMap;
use std::time::SystemTime;

use crate::error::{AirwaveError, Result};
use crate::types::{ConnectionId, ListenerCount, StreamId};

/// One live broadcast and the consumers currently subscribed to it.
#[derive(Debug, Clone)]
pub struct BroadcastSession {
    pub stream_id: StreamId,
    /// Connection that produces this stream's audio.
    pub producer_id: ConnectionId,
    pub title: String,
    pub producer_name: String,
    pub started_at: SystemTime,
    consumers: IndexSet<ConnectionId>,
}

impl BroadcastSession {
    pub fn listener_count(&self) -> ListenerCount {
        self.consumers.len()
    }

    pub fn consumers(&self) -> impl Iterator<Item = &ConnectionId> {
        self.consumers.iter()
    }

    pub fn has_consumer(&self, id: &ConnectionId) -> bool {
        self.consumers.contains(id)
    }
}

struct RegistryMetrics {
    streams_active_gauge: opentelemetry::metrics::Gauge<u64>,
    listeners_active_gauge: opentelemetry::metrics::Gauge<u64>,
    streams_started_counter: opentelemetry::metrics::Counter<u64>,
    streams_ended_counter: opentelemetry::metrics::Counter<u64>,
    stream_duration_histogram: opentelemetry::metrics::Histogram<f64>,
}

impl Default for RegistryMetrics {
    fn default() -> Self {
        let meter = global::meter("airwave_registry");
        Self {
            streams_active_gauge: meter
                .u64_gauge("streams.active")
                .with_description("Number of live broadcasts")
                .build(),
            listeners_active_gauge: meter
                .u64_gauge("listeners.active")
                .with_description("Number of subscribed listeners across all broadcasts")
                .build(),
            streams_started_counter: meter
                .u64_counter("streams.started")
                .with_description("Total number of broadcasts started")
                .build(),
            streams_ended_counter: meter
                .u64_counter("streams.ended")
                .with_description("Total number of broadcasts ended")
                .build(),
            stream_duration_histogram: meter
                .f64_histogram("stream.duration")
                .with_description("Broadcast lifetime in seconds")
                .with_unit("s")
                .build(),
        }
    }
}

/// Registry of producer sessions and consumer subscriptions.
#[derive(Default)]
pub struct SessionRegistry {
    /// Live broadcasts in start order; "first available stream" means index 0.
    streams: IndexMap<StreamId, BroadcastSession>,
    subscriptions: HashMap<ConnectionId, StreamId>,
    producers: HashMap<ConnectionId, StreamId>,
    metrics: RegistryMetrics,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new live broadcast.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyLive` if the stream id is already registered or the
    /// producer connection already owns a live broadcast.
    pub fn register_producer(
        &mut self,
        stream_id: StreamId,
        producer_id: ConnectionId,
        title: String,
        producer_name: String,
    ) -> Result<BroadcastSession> {
        if self.streams.contains_key(&stream_id) {
            return Err(AirwaveError::AlreadyLive(stream_id.to_string()));
        }
        if let Some(existing) = self.producers.get(&producer_id) {
            return Err(AirwaveError::AlreadyLive(format!(
                "connection {producer_id} is already broadcasting {existing}"
            )));
        }

        let session = BroadcastSession {
            stream_id: stream_id.clone(),
            producer_id: producer_id.clone(),
            title,
            producer_name,
            started_at: SystemTime::now(),
            consumers: IndexSet::new(),
        };
        self.producers.insert(producer_id, stream_id.clone());
        self.streams.insert(stream_id, session.clone());

        self.metrics.streams_started_counter.add(1, &[]);
        self.record_gauges();
        Ok(session)
    }

    /// Removes a broadcast together with every subscription pointing at it.
    pub fn unregister_producer(&mut self, stream_id: &StreamId) -> Option<BroadcastSession> {
        let session = self.streams.shift_remove(stream_id)?;
        self.producers.remove(&session.producer_id);
        for consumer in &session.consumers {
            self.subscriptions.remove(consumer);
        }

        let duration = SystemTime::now().duration_since(session.started_at).unwrap_or_default();
        self.metrics.streams_ended_counter.add(1, &[]);
        self.metrics.stream_duration_histogram.record(duration.as_secs_f64(), &[]);
        self.record_gauges();
        tracing::debug!(stream_id = %stream_id, "Removed broadcast from registry");
        Some(session)
    }

    /// Subscribes a consumer to a live stream, moving it off any stream it was
    /// previously subscribed to.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the stream is not live.
    pub fn register_consumer(
        &mut self,
        consumer_id: ConnectionId,
        stream_id: &StreamId,
    ) -> Result<ListenerCount> {
        if !self.streams.contains_key(stream_id) {
            return Err(AirwaveError::NotFound(format!("Stream {stream_id}")));
        }
        if self.subscriptions.get(&consumer_id) != Some(stream_id) {
            self.unregister_consumer(&consumer_id);
        }

        let session = self
            .streams
            .get_mut(stream_id)
            .ok_or_else(|| AirwaveError::NotFound(format!("Stream {stream_id}")))?;
        session.consumers.insert(consumer_id.clone());
        let count = session.consumers.len();
        self.subscriptions.insert(consumer_id, stream_id.clone());
        self.record_gauges();
        Ok(count)
    }

    /// Drops a consumer's subscription. Returns the stream it left and that
    /// stream's remaining listener count.
    pub fn unregister_consumer(
        &mut self,
        consumer_id: &ConnectionId,
    ) -> Option<(StreamId, ListenerCount)> {
        let stream_id = self.subscriptions.remove(consumer_id)?;
        let count = self.streams.get_mut(&stream_id).map_or(0, |session| {
            session.consumers.shift_remove(consumer_id);
            session.consumers.len()
        });
        self.record_gauges();
        Some((stream_id, count))
    }

    /// Picks the stream a listener should join: the requested one if it is live,
    /// otherwise the first stream in start order.
    ///
    /// # Errors
    ///
    /// `NotFound` for an explicit id that is not live, `NoActiveStreams` when
    /// nothing is broadcasting.
    pub fn resolve_stream(&self, requested: Option<&StreamId>) -> Result<StreamId> {
        match requested {
            Some(id) if self.streams.contains_key(id) => Ok(id.clone()),
            Some(id) => Err(AirwaveError::NotFound(format!("Stream {id}"))),
            None => {
                self.streams.keys().next().cloned().ok_or(AirwaveError::NoActiveStreams)
            },
        }
    }

    pub fn get(&self, stream_id: &StreamId) -> Option<&BroadcastSession> {
        self.streams.get(stream_id)
    }

    pub fn stream_for_producer(&self, producer_id: &ConnectionId) -> Option<&StreamId> {
        self.producers.get(producer_id)
    }

    pub fn subscription_of(&self, consumer_id: &ConnectionId) -> Option<&StreamId> {
        self.subscriptions.get(consumer_id)
    }

    /// Snapshot of every live broadcast in start order.
    pub fn list_active_streams(&self) -> Vec<BroadcastSession> {
        self.streams.values().cloned().collect()
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    pub fn total_listeners(&self) -> usize {
        self.subscriptions.len()
    }

    fn record_gauges(&self) {
        self.metrics.streams_active_gauge.record(self.streams.len() as u64, &[]);
        self.metrics.listeners_active_gauge.record(self.subscriptions.len() as u64, &[]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn live(registry: &mut SessionRegistry, title: &str) -> StreamId {
        let id = StreamId::new();
        registry
            .register_producer(id.clone(), ConnectionId::new(), title.to_string(), "DJ".to_string())
            .unwrap();
        id
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = SessionRegistry::new();
        let producer = ConnectionId::new();
        let id = StreamId::new();
        registry
            .register_producer(id.clone(), producer.clone(), "A".into(), "DJ".into())
            .unwrap();

        let again = registry.register_producer(id, ConnectionId::new(), "A".into(), "DJ".into());
        assert!(matches!(again, Err(AirwaveError::AlreadyLive(_))));

        let second = registry.register_producer(StreamId::new(), producer, "B".into(), "DJ".into());
        assert!(matches!(second, Err(AirwaveError::AlreadyLive(_))));
        assert_eq!(registry.stream_count(), 1);
    }

    #[test]
    fn consumer_set_tracks_join_and_leave_sequences() {
        let mut registry = SessionRegistry::new();
        let s1 = live(&mut registry, "one");
        let s2 = live(&mut registry, "two");
        let consumers: Vec<ConnectionId> = (0..4).map(|_| ConnectionId::new()).collect();

        // join, join, move, leave, rejoin
        registry.register_consumer(consumers[0].clone(), &s1).unwrap();
        registry.register_consumer(consumers[1].clone(), &s1).unwrap();
        registry.register_consumer(consumers[2].clone(), &s1).unwrap();
        registry.register_consumer(consumers[1].clone(), &s2).unwrap();
        registry.unregister_consumer(&consumers[2]);
        registry.register_consumer(consumers[3].clone(), &s1).unwrap();
        registry.register_consumer(consumers[3].clone(), &s1).unwrap();

        let on_s1: HashSet<_> = registry.get(&s1).unwrap().consumers().cloned().collect();
        let on_s2: HashSet<_> = registry.get(&s2).unwrap().consumers().cloned().collect();
        assert_eq!(on_s1, HashSet::from([consumers[0].clone(), consumers[3].clone()]));
        assert_eq!(on_s2, HashSet::from([consumers[1].clone()]));
        assert_eq!(registry.total_listeners(), 3);
    }

    #[test]
    fn unregistering_a_producer_prunes_its_subscriptions() {
        let mut registry = SessionRegistry::new();
        let s1 = live(&mut registry, "one");
        let listener = ConnectionId::new();
        registry.register_consumer(listener.clone(), &s1).unwrap();

        let removed = registry.unregister_producer(&s1).unwrap();
        assert_eq!(removed.listener_count(), 1);
        assert!(registry.subscription_of(&listener).is_none());
        assert!(registry.unregister_consumer(&listener).is_none());
        assert!(registry.unregister_producer(&s1).is_none());
    }

    #[test]
    fn resolve_falls_back_to_first_stream() {
        let mut registry = SessionRegistry::new();
        assert_eq!(registry.resolve_stream(None), Err(AirwaveError::NoActiveStreams));

        let first = live(&mut registry, "first");
        let second = live(&mut registry, "second");
        assert_eq!(registry.resolve_stream(None).unwrap(), first);
        assert_eq!(registry.resolve_stream(Some(&second)).unwrap(), second);
        assert!(matches!(
            registry.resolve_stream(Some(&StreamId::new())),
            Err(AirwaveError::NotFound(_))
        ));

        registry.unregister_producer(&first);
        assert_eq!(registry.resolve_stream(None).unwrap(), second);
    }

    #[test]
    fn joining_an_unknown_stream_fails() {
        let mut registry = SessionRegistry::new();
        let result = registry.register_consumer(ConnectionId::new(), &StreamId::new());
        assert!(matches!(result, Err(AirwaveError::NotFound(_))));
        assert_eq!(registry.total_listeners(), 0);
    }
}
