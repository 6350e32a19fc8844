// SPDX-FileCopyrightText: © 2025 Airwave Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Per-connection delivery queue used by the relay.
//!
//! Control notices and audio chunks share one ordered queue so a listener always
//! receives every chunk it was sent before the `stream-ended` notice that follows
//! them. Audio is bounded separately: once a connection has `max_pending_audio`
//! undelivered chunks, further chunks are dropped for that connection only.
//! Control notices are never dropped.

use bytes::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::types::StreamId;

/// Something the relay delivers to one specific connection.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// An audio chunk, byte-for-byte as the producer sent it.
    Audio(Bytes),
    /// The stream this connection was listening to has ended.
    StreamEnded { stream_id: StreamId, title: String, reason: String },
}

/// Outcome of offering an audio chunk to a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioOffer {
    Queued,
    /// The connection is too far behind; this chunk was dropped for it.
    DroppedSlow,
    /// The connection's receiver is gone.
    Closed,
}

/// Sending half, held by the relay.
#[derive(Debug, Clone)]
pub struct ClientSink {
    tx: mpsc::UnboundedSender<Delivery>,
    pending_audio: Arc<AtomicUsize>,
    max_pending_audio: usize,
}

/// Receiving half, drained by the connection's transport task.
#[derive(Debug)]
pub struct DeliveryReceiver {
    rx: mpsc::UnboundedReceiver<Delivery>,
    pending_audio: Arc<AtomicUsize>,
}

impl ClientSink {
    /// Creates a connected sink/receiver pair. `max_pending_audio` is clamped to at least 1.
    pub fn channel(max_pending_audio: usize) -> (Self, DeliveryReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending_audio = Arc::new(AtomicUsize::new(0));
        (
            Self {
                tx,
                pending_audio: Arc::clone(&pending_audio),
                max_pending_audio: max_pending_audio.max(1),
            },
            DeliveryReceiver { rx, pending_audio },
        )
    }

    pub fn offer_audio(&self, chunk: Bytes) -> AudioOffer {
        if self.pending_audio.load(Ordering::Acquire) >= self.max_pending_audio {
            return AudioOffer::DroppedSlow;
        }
        self.pending_audio.fetch_add(1, Ordering::AcqRel);
        if self.tx.send(Delivery::Audio(chunk)).is_err() {
            self.pending_audio.fetch_sub(1, Ordering::AcqRel);
            return AudioOffer::Closed;
        }
        AudioOffer::Queued
    }

    /// Queues a control notice. Returns false if the receiver is gone.
    pub fn notify(&self, delivery: Delivery) -> bool {
        self.tx.send(delivery).is_ok()
    }

    pub fn pending_audio(&self) -> usize {
        self.pending_audio.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl DeliveryReceiver {
    pub async fn recv(&mut self) -> Option<Delivery> {
        let delivery = self.rx.recv().await?;
        if matches!(delivery, Delivery::Audio(_)) {
            self.pending_audio.fetch_sub(1, Ordering::AcqRel);
        }
        Some(delivery)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn slow_receiver_loses_audio_but_not_notices() {
        let (sink, mut rx) = ClientSink::channel(2);

        assert_eq!(sink.offer_audio(Bytes::from_static(b"a")), AudioOffer::Queued);
        assert_eq!(sink.offer_audio(Bytes::from_static(b"b")), AudioOffer::Queued);
        assert_eq!(sink.offer_audio(Bytes::from_static(b"c")), AudioOffer::DroppedSlow);
        assert!(sink.notify(Delivery::StreamEnded {
            stream_id: StreamId::from("s"),
            title: "t".into(),
            reason: "r".into(),
        }));

        assert_eq!(rx.recv().await, Some(Delivery::Audio(Bytes::from_static(b"a"))));
        assert_eq!(sink.pending_audio(), 1);
        assert_eq!(sink.offer_audio(Bytes::from_static(b"d")), AudioOffer::Queued);

        assert_eq!(rx.recv().await, Some(Delivery::Audio(Bytes::from_static(b"b"))));
        assert!(matches!(rx.recv().await, Some(Delivery::StreamEnded { .. })));
        assert_eq!(rx.recv().await, Some(Delivery::Audio(Bytes::from_static(b"d"))));
    }

    #[tokio::test]
    async fn closed_receiver_is_reported() {
        let (sink, rx) = ClientSink::channel(4);
        drop(rx);
        assert_eq!(sink.offer_audio(Bytes::from_static(b"x")), AudioOffer::Closed);
        assert_eq!(sink.pending_audio(), 0);
        assert!(sink.is_closed());
    }
}
