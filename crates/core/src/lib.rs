// SPDX-FileCopyrightText: © 2025 Airwave Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Airwave Core - live broadcast relay and background channel scheduling.
//!
//! This crate holds the domain logic of Airwave and knows nothing about HTTP or
//! WebSockets:
//!
//! - [`catalog`]: Catalog gateway trait and the in-memory catalog
//! - [`registry`]: Live broadcasts and their listener subscriptions
//! - [`lifecycle`]: `Idle → Live → Ended` tracking per broadcast
//! - [`relay`]: Producer-to-consumer fan-out of control events and audio chunks
//! - [`sink`]: Per-connection ordered delivery queues with bounded audio backlog
//! - [`scheduler`]: Timed/continuous background rotation with self-heal
//! - [`bus`]: Event fan-out to observers
//! - [`error`]: Error types
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use airwave_core::{BroadcastRelay, EventBus, ConnectionId, RelayConfig};
//!
//! let bus = EventBus::default();
//! let relay = BroadcastRelay::new(bus.clone(), RelayConfig::default());
//!
//! let producer = ConnectionId::new();
//! let session = relay.start_stream(producer.clone(), Some("Late Show".into()), None).await?;
//!
//! let listener = ConnectionId::new();
//! let mut deliveries = relay.attach(listener.clone()).await;
//! relay.join_listener(listener, Some(&session.stream_id)).await?;
//! relay.relay_chunk(&producer, bytes::Bytes::from_static(b"...")).await;
//! ```

pub use async_trait::async_trait;

pub mod bus;
pub mod catalog;
pub mod error;
pub mod lifecycle;
pub mod registry;
pub mod relay;
pub mod scheduler;
pub mod sink;
pub mod types;

pub use error::{AirwaveError, Result};

pub use bus::{BusEvent, EventBus};
pub use catalog::{CatalogGateway, MemoryCatalog, ScheduleRecord, Track};
pub use lifecycle::{StreamLifecycle, StreamPhase};
pub use registry::{BroadcastSession, SessionRegistry};
pub use relay::{BroadcastRelay, ChunkFanout, RelayConfig, RelayStats, StreamJoined};
pub use scheduler::{BackgroundScheduler, BackgroundTrackState, RotationMode, SchedulerConfig};
pub use sink::{AudioOffer, ClientSink, Delivery, DeliveryReceiver};
pub use types::{ConnectionId, ListenerCount, StreamId};
