// SPDX-FileCopyrightText: © 2025 Airwave Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Event fan-out bus.
//!
//! Every state change that observers care about is published here, whichever
//! component produced it. Delivery is best effort: each observer sees events in
//! publish order, a lagging observer skips ahead, and nothing is replayed across
//! reconnects. Observers take a fresh snapshot when they (re)connect.

use tokio::sync::broadcast;

use crate::catalog::Track;
use crate::types::{ListenerCount, StreamId};

pub const DEFAULT_EVENT_CAPACITY: usize = 128;

#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    StreamStarted { stream_id: StreamId, title: String, streamer_name: String },
    StreamEnded { stream_id: StreamId, title: String, reason: String },
    ListenerCount { stream_id: StreamId, count: ListenerCount },
    BackgroundTrackChanged { track: Option<Track> },
    BackgroundStateChanged { is_active: bool },
}

impl BusEvent {
    /// Short name used in logs.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::StreamStarted { .. } => "stream-started",
            Self::StreamEnded { .. } => "stream-ended",
            Self::ListenerCount { .. } => "listener-count",
            Self::BackgroundTrackChanged { .. } => "background-track-changed",
            Self::BackgroundStateChanged { .. } => "background-state-changed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BusEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to every current observer. Having no observers is normal.
    pub fn publish(&self, event: BusEvent) {
        let name = event.name();
        match self.tx.send(event) {
            Ok(observers) => tracing::trace!(event = name, observers, "Published event"),
            Err(_) => tracing::trace!(event = name, "No observers connected"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.tx.subscribe()
    }

    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn observers_receive_events_in_publish_order() {
        let bus = EventBus::new(16);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.publish(BusEvent::BackgroundStateChanged { is_active: true });
        bus.publish(BusEvent::BackgroundStateChanged { is_active: false });

        for rx in [&mut first, &mut second] {
            assert_eq!(rx.recv().await.unwrap(), BusEvent::BackgroundStateChanged { is_active: true });
            assert_eq!(
                rx.recv().await.unwrap(),
                BusEvent::BackgroundStateChanged { is_active: false }
            );
        }
    }

    #[test]
    fn publishing_without_observers_is_fine() {
        let bus = EventBus::default();
        bus.publish(BusEvent::BackgroundTrackChanged { track: None });
        assert_eq!(bus.observer_count(), 0);
    }

    #[tokio::test]
    async fn late_observers_only_see_new_events() {
        let bus = EventBus::new(4);
        bus.publish(BusEvent::BackgroundStateChanged { is_active: true });
        let mut late = bus.subscribe();
        bus.publish(BusEvent::BackgroundStateChanged { is_active: false });
        assert_eq!(late.recv().await.unwrap(), BusEvent::BackgroundStateChanged { is_active: false });
    }
}
