// SPDX-FileCopyrightText: © 2025 Airwave Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Background channel scheduler.
//!
//! Keeps "always something playing" on the background channel by rotating
//! catalog tracks on timers:
//!
//! - **Timed**: an admin scheduled a specific track for N minutes. When that
//!   elapses a random active track is drawn and the scheduler falls through to
//!   Continuous. If the catalog has nothing to offer at that point the channel
//!   stops and the self-heal check picks it up later.
//! - **Continuous**: every `continuous_interval` a random active track other
//!   than the current one is drawn. With a single active track it restarts.
//!
//! All state sits behind one lock together with the pending timer and a
//! generation counter. Every track change cancels the pending timer, arms a new
//! one and bumps the generation. Timer results computed across a catalog await
//! are only applied if their generation is still current.

use opentelemetry::{global, KeyValue};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use ts_rs::TS;

use crate::bus::{BusEvent, EventBus};
use crate::catalog::{CatalogGateway, ScheduleRecord, Track};
use crate::error::{AirwaveError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum RotationMode {
    Timed,
    Continuous,
}

/// Snapshot of the background channel.
#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundTrackState {
    pub current_track: Option<Track>,
    pub is_active: bool,
    pub schedule_expiry: Option<SystemTime>,
    pub rotation_mode: RotationMode,
}

impl Default for BackgroundTrackState {
    fn default() -> Self {
        Self {
            current_track: None,
            is_active: false,
            schedule_expiry: None,
            rotation_mode: RotationMode::Continuous,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub continuous_interval: Duration,
    pub self_heal_interval: Duration,
    pub startup_delay: Duration,
    pub min_duration_minutes: u32,
    pub max_duration_minutes: u32,
    pub default_duration_minutes: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            continuous_interval: Duration::from_secs(5 * 60),
            self_heal_interval: Duration::from_secs(30),
            startup_delay: Duration::from_secs(2),
            min_duration_minutes: 5,
            max_duration_minutes: 1440,
            default_duration_minutes: 30,
        }
    }
}

impl SchedulerConfig {
    /// Out-of-range durations are clamped, never rejected. Fractions round to
    /// the nearest minute; a missing, zero or non-finite value means the default.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn clamp_duration(&self, requested: Option<f64>) -> u32 {
        let (min, max) = if self.min_duration_minutes <= self.max_duration_minutes {
            (self.min_duration_minutes, self.max_duration_minutes)
        } else {
            (self.max_duration_minutes, self.min_duration_minutes)
        };
        let Some(minutes) = requested.filter(|m| m.is_finite() && *m != 0.0) else {
            return self.default_duration_minutes.clamp(min, max);
        };
        // In u32 range after clamping, so the cast is exact.
        minutes.round().clamp(f64::from(min), f64::from(max)) as u32
    }
}

struct SchedulerState {
    background: BackgroundTrackState,
    generation: u64,
    timer: Option<CancellationToken>,
}

impl SchedulerState {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }
}

struct SchedulerMetrics {
    track_changes_counter: opentelemetry::metrics::Counter<u64>,
    heal_counter: opentelemetry::metrics::Counter<u64>,
    catalog_errors_counter: opentelemetry::metrics::Counter<u64>,
}

impl Default for SchedulerMetrics {
    fn default() -> Self {
        let meter = global::meter("airwave_scheduler");
        Self {
            track_changes_counter: meter
                .u64_counter("background.track_changes")
                .with_description("Background channel track changes")
                .build(),
            heal_counter: meter
                .u64_counter("background.heals")
                .with_description("Times the self-heal check restarted the background channel")
                .build(),
            catalog_errors_counter: meter
                .u64_counter("background.catalog_errors")
                .with_description("Catalog failures seen by the background scheduler")
                .build(),
        }
    }
}

struct Shared {
    catalog: Arc<dyn CatalogGateway>,
    bus: EventBus,
    config: SchedulerConfig,
    state: Mutex<SchedulerState>,
    shutdown: CancellationToken,
    metrics: SchedulerMetrics,
}

/// Cheaply cloneable handle to the background scheduler.
#[derive(Clone)]
pub struct BackgroundScheduler {
    shared: Arc<Shared>,
}

impl BackgroundScheduler {
    pub fn new(catalog: Arc<dyn CatalogGateway>, bus: EventBus, config: SchedulerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                catalog,
                bus,
                config,
                state: Mutex::new(SchedulerState {
                    background: BackgroundTrackState::default(),
                    generation: 0,
                    timer: None,
                }),
                shutdown: CancellationToken::new(),
                metrics: SchedulerMetrics::default(),
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    pub async fn status(&self) -> BackgroundTrackState {
        self.shared.state.lock().await.background.clone()
    }

    /// Plays `track_id` for `duration_minutes` (clamped, default 30), then
    /// returns to continuous rotation.
    ///
    /// # Errors
    ///
    /// `NotFound` if the track is missing or inactive, `Upstream` if the catalog fails.
    pub async fn schedule_track(
        &self,
        track_id: u64,
        duration_minutes: Option<f64>,
        created_by: &str,
    ) -> Result<ScheduleRecord> {
        let minutes = self.shared.config.clamp_duration(duration_minutes);
        let track = self
            .shared
            .catalog
            .get_track(track_id)
            .await?
            .filter(|track| track.is_active)
            .ok_or_else(|| AirwaveError::NotFound(format!("Track {track_id}")))?;
        let record = self.shared.catalog.record_schedule(track_id, minutes, created_by).await?;

        let delay = Duration::from_secs(u64::from(minutes) * 60);
        {
            let mut state = self.shared.state.lock().await;
            self.shared.apply_track(&mut state, track.clone(), RotationMode::Timed, delay);
        }
        self.shared.count_play(&track).await;

        tracing::info!(
            track_id,
            title = %track.title,
            duration_minutes = minutes,
            created_by,
            "Background track scheduled"
        );
        Ok(record)
    }

    /// Stops the background channel. The last track stays visible in `status`.
    pub async fn stop(&self) {
        let mut state = self.shared.state.lock().await;
        state.cancel_timer();
        state.generation += 1;
        let was_active = state.background.is_active;
        state.background.is_active = false;
        state.background.schedule_expiry = None;
        self.shared.bus.publish(BusEvent::BackgroundStateChanged { is_active: false });
        drop(state);

        if was_active {
            tracing::info!("Background stream stopped");
        }
    }

    /// Runs the rotation the pending timer would run, right now.
    pub async fn tick(&self) -> Option<Track> {
        let generation = self.shared.state.lock().await.generation;
        Shared::rotate(&self.shared, generation).await
    }

    /// Self-heal check: restarts continuous rotation if the channel is inactive
    /// and the catalog has something to play. Returns true if it did.
    pub async fn heal(&self) -> bool {
        Shared::heal(&self.shared).await
    }

    /// Switches immediately to another random active track in continuous mode.
    ///
    /// # Errors
    ///
    /// `NotFound` if the catalog has no active track, `Upstream` if it fails.
    pub async fn skip(&self) -> Result<Track> {
        let current = self.status().await.current_track.map(|track| track.id);
        let track = self
            .shared
            .pick_track(current)
            .await?
            .ok_or_else(|| AirwaveError::NotFound("Active tracks".to_string()))?;

        {
            let mut state = self.shared.state.lock().await;
            let interval = self.shared.config.continuous_interval;
            self.shared.apply_track(&mut state, track.clone(), RotationMode::Continuous, interval);
        }
        self.shared.count_play(&track).await;
        tracing::info!(track_id = track.id, title = %track.title, "Skipped to next background track");
        Ok(track)
    }

    /// Spawns the self-heal supervisor: one check after the start-up delay, then
    /// one every `self_heal_interval` until [`shutdown`](Self::shutdown).
    pub fn spawn_supervisor(&self) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let token = shared.shutdown.clone();
            tokio::select! {
                () = token.cancelled() => return,
                () = tokio::time::sleep(shared.config.startup_delay) => {},
            }
            Shared::heal(&shared).await;

            let period = shared.config.self_heal_interval.max(Duration::from_millis(100));
            let mut interval =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = interval.tick() => {
                        Shared::heal(&shared).await;
                    },
                }
            }
            tracing::debug!("Background supervisor stopped");
        })
    }

    /// Cancels the supervisor and any pending rotation timer.
    pub async fn shutdown(&self) {
        self.shared.shutdown.cancel();
        self.shared.state.lock().await.cancel_timer();
    }
}

impl Shared {
    /// Installs `track` as current, re-arms the timer and publishes the change.
    /// Must be called with the state lock held.
    fn apply_track(
        self: &Arc<Self>,
        state: &mut SchedulerState,
        track: Track,
        mode: RotationMode,
        delay: Duration,
    ) {
        state.cancel_timer();
        state.generation += 1;

        state.background.current_track = Some(track.clone());
        state.background.is_active = true;
        state.background.rotation_mode = mode;
        state.background.schedule_expiry = match mode {
            RotationMode::Timed => Some(SystemTime::now() + delay),
            RotationMode::Continuous => None,
        };

        state.timer = Some(self.arm_timer(state.generation, delay));

        let mode_label = match mode {
            RotationMode::Timed => "timed",
            RotationMode::Continuous => "continuous",
        };
        self.metrics.track_changes_counter.add(1, &[KeyValue::new("mode", mode_label)]);
        self.bus.publish(BusEvent::BackgroundTrackChanged { track: Some(track) });
        self.bus.publish(BusEvent::BackgroundStateChanged { is_active: true });
    }

    fn arm_timer(self: &Arc<Self>, generation: u64, delay: Duration) -> CancellationToken {
        let token = self.shutdown.child_token();
        let guard = token.clone();
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                () = guard.cancelled() => {},
                () = tokio::time::sleep(delay) => {
                    Self::rotate(&shared, generation).await;
                },
            }
        });
        token
    }

    /// Timer expiry for `generation`. Returns the track that started playing.
    async fn rotate(self: &Arc<Self>, generation: u64) -> Option<Track> {
        let (mode, current) = {
            let state = self.state.lock().await;
            if state.generation != generation || !state.background.is_active {
                return None;
            }
            (
                state.background.rotation_mode,
                state.background.current_track.as_ref().map(|track| track.id),
            )
        };

        let picked = self.pick_track(current).await;

        let mut state = self.state.lock().await;
        if state.generation != generation {
            tracing::debug!(generation, "Discarding stale background rotation");
            return None;
        }

        match picked {
            Ok(Some(track)) => {
                let interval = self.config.continuous_interval;
                self.apply_track(&mut state, track.clone(), RotationMode::Continuous, interval);
                drop(state);
                self.count_play(&track).await;
                tracing::info!(track_id = track.id, title = %track.title, "Background track rotated");
                Some(track)
            },
            outcome => {
                if let Err(e) = outcome {
                    self.metrics.catalog_errors_counter.add(1, &[]);
                    tracing::warn!(error = %e, "Catalog lookup failed during rotation");
                } else {
                    tracing::warn!("No active tracks available for rotation");
                }

                match mode {
                    RotationMode::Timed => {
                        state.cancel_timer();
                        state.generation += 1;
                        state.background.is_active = false;
                        state.background.schedule_expiry = None;
                        self.bus.publish(BusEvent::BackgroundStateChanged { is_active: false });
                        tracing::info!("Scheduled track expired with nothing to follow; stopping");
                    },
                    RotationMode::Continuous => {
                        // keep playing the current track; try again next interval
                        let delay = self.config.continuous_interval;
                        state.cancel_timer();
                        state.generation += 1;
                        state.timer = Some(self.arm_timer(state.generation, delay));
                    },
                }
                None
            },
        }
    }

    async fn heal(self: &Arc<Self>) -> bool {
        let generation = {
            let state = self.state.lock().await;
            if state.background.is_active {
                return false;
            }
            state.generation
        };

        let track = match self.catalog.random_active_track(None).await {
            Ok(Some(track)) => track,
            Ok(None) => {
                tracing::debug!("Self-heal: catalog has no active tracks");
                return false;
            },
            Err(e) => {
                self.metrics.catalog_errors_counter.add(1, &[]);
                tracing::warn!(error = %e, "Self-heal: catalog lookup failed");
                return false;
            },
        };

        {
            let mut state = self.state.lock().await;
            if state.background.is_active || state.generation != generation {
                return false;
            }
            let interval = self.config.continuous_interval;
            self.apply_track(&mut state, track.clone(), RotationMode::Continuous, interval);
        }
        self.metrics.heal_counter.add(1, &[]);
        self.count_play(&track).await;
        tracing::info!(track_id = track.id, title = %track.title, "Self-heal restarted background stream");
        true
    }

    /// A random active track other than `current`; falls back to `current`
    /// itself when it is the only active one.
    async fn pick_track(&self, current: Option<u64>) -> Result<Option<Track>> {
        match self.catalog.random_active_track(current).await? {
            Some(track) => Ok(Some(track)),
            None if current.is_some() => self.catalog.random_active_track(None).await,
            None => Ok(None),
        }
    }

    async fn count_play(&self, track: &Track) {
        if let Err(e) = self.catalog.increment_play_count(track.id).await {
            tracing::warn!(track_id = track.id, error = %e, "Failed to increment play count");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_support::track;
    use crate::catalog::MemoryCatalog;
    use async_trait::async_trait;
    use tokio::sync::broadcast;

    fn scheduler_with(catalog: Arc<MemoryCatalog>) -> (BackgroundScheduler, EventBus) {
        let bus = EventBus::new(64);
        let scheduler = BackgroundScheduler::new(catalog, bus.clone(), SchedulerConfig::default());
        (scheduler, bus)
    }

    async fn next_track_change(rx: &mut broadcast::Receiver<BusEvent>) -> Option<Track> {
        loop {
            match rx.recv().await.unwrap() {
                BusEvent::BackgroundTrackChanged { track } => return track,
                _ => continue,
            }
        }
    }

    #[test]
    fn durations_are_clamped() {
        let config = SchedulerConfig::default();
        assert_eq!(config.clamp_duration(Some(2.0)), 5);
        assert_eq!(config.clamp_duration(Some(5000.0)), 1440);
        assert_eq!(config.clamp_duration(Some(10.0)), 10);
        assert_eq!(config.clamp_duration(None), 30);
    }

    #[test]
    fn negative_huge_and_fractional_durations_are_clamped() {
        let config = SchedulerConfig::default();
        assert_eq!(config.clamp_duration(Some(-3.0)), 5);
        assert_eq!(config.clamp_duration(Some(5_000_000_000.0)), 1440);
        assert_eq!(config.clamp_duration(Some(10.5)), 11);
        assert_eq!(config.clamp_duration(Some(0.0)), 30);
        assert_eq!(config.clamp_duration(Some(f64::NAN)), 30);
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_track_rotates_after_its_duration() {
        let catalog = Arc::new(MemoryCatalog::with_tracks([track(7), track(8)]));
        let (scheduler, bus) = scheduler_with(Arc::clone(&catalog));
        let mut events = bus.subscribe();

        let started = tokio::time::Instant::now();
        let record = scheduler.schedule_track(7, Some(10.0), "admin").await.unwrap();
        assert_eq!(record.track_id, 7);
        assert_eq!(record.duration_minutes, 10);
        assert_eq!(record.created_by, "admin");

        let status = scheduler.status().await;
        assert!(status.is_active);
        assert_eq!(status.rotation_mode, RotationMode::Timed);
        assert_eq!(status.current_track.map(|t| t.id), Some(7));
        assert!(status.schedule_expiry.is_some());
        assert_eq!(next_track_change(&mut events).await.map(|t| t.id), Some(7));

        let rotated = next_track_change(&mut events).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(600));
        assert_eq!(rotated.id, 8);

        let status = scheduler.status().await;
        assert_eq!(status.rotation_mode, RotationMode::Continuous);
        assert!(status.schedule_expiry.is_none());
        assert_eq!(catalog.play_count(7), Some(1));
        assert_eq!(catalog.schedule_history().len(), 1);
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn continuous_mode_never_repeats_with_alternatives() {
        let catalog = Arc::new(MemoryCatalog::with_tracks([track(1), track(2), track(3)]));
        let (scheduler, bus) = scheduler_with(catalog);
        let mut events = bus.subscribe();

        assert!(scheduler.heal().await);
        let mut previous = next_track_change(&mut events).await.unwrap().id;
        for _ in 0..10 {
            let next = next_track_change(&mut events).await.unwrap().id;
            assert_ne!(next, previous);
            previous = next;
        }
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn single_track_restarts_itself() {
        let catalog = Arc::new(MemoryCatalog::with_tracks([track(4)]));
        let (scheduler, bus) = scheduler_with(Arc::clone(&catalog));
        let mut events = bus.subscribe();

        assert!(scheduler.heal().await);
        assert_eq!(next_track_change(&mut events).await.map(|t| t.id), Some(4));
        assert_eq!(next_track_change(&mut events).await.map(|t| t.id), Some(4));
        assert_eq!(catalog.play_count(4), Some(2));
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn heal_activates_inactive_scheduler_only() {
        let catalog = Arc::new(MemoryCatalog::new());
        let (scheduler, bus) = scheduler_with(Arc::clone(&catalog));
        let mut events = bus.subscribe();

        assert!(!scheduler.heal().await);
        assert!(!scheduler.status().await.is_active);

        catalog.upsert_track(track(3));
        assert!(scheduler.heal().await);
        assert_eq!(next_track_change(&mut events).await.map(|t| t.id), Some(3));
        assert!(!scheduler.heal().await);
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn supervisor_heals_after_startup_delay() {
        let catalog = Arc::new(MemoryCatalog::with_tracks([track(1)]));
        let (scheduler, bus) = scheduler_with(catalog);
        let mut events = bus.subscribe();

        let started = tokio::time::Instant::now();
        let supervisor = scheduler.spawn_supervisor();
        assert_eq!(next_track_change(&mut events).await.map(|t| t.id), Some(1));
        assert!(started.elapsed() >= Duration::from_secs(2));

        scheduler.shutdown().await;
        supervisor.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn timed_expiry_with_empty_catalog_stops_then_heals() {
        let catalog = Arc::new(MemoryCatalog::with_tracks([track(7)]));
        let (scheduler, bus) = scheduler_with(Arc::clone(&catalog));
        let mut events = bus.subscribe();

        scheduler.schedule_track(7, Some(5.0), "admin").await.unwrap();
        catalog.set_active(7, false);

        loop {
            if let BusEvent::BackgroundStateChanged { is_active: false } = events.recv().await.unwrap() {
                break;
            }
        }
        let status = scheduler.status().await;
        assert!(!status.is_active);
        assert_eq!(status.current_track.map(|t| t.id), Some(7));

        catalog.set_active(7, true);
        assert!(scheduler.heal().await);
        assert_eq!(scheduler.status().await.rotation_mode, RotationMode::Continuous);
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_rejects_missing_and_inactive_tracks() {
        let catalog = Arc::new(MemoryCatalog::with_tracks([track(1)]));
        catalog.set_active(1, false);
        let (scheduler, _bus) = scheduler_with(Arc::clone(&catalog));

        assert!(matches!(
            scheduler.schedule_track(99, None, "admin").await,
            Err(AirwaveError::NotFound(_))
        ));
        assert!(matches!(
            scheduler.schedule_track(1, None, "admin").await,
            Err(AirwaveError::NotFound(_))
        ));
        assert!(catalog.schedule_history().is_empty());
        assert!(!scheduler.status().await.is_active);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_keeps_current_track_and_cancels_rotation() {
        let catalog = Arc::new(MemoryCatalog::with_tracks([track(1), track(2)]));
        let (scheduler, bus) = scheduler_with(catalog);

        scheduler.schedule_track(1, None, "admin").await.unwrap();
        let mut events = bus.subscribe();
        scheduler.stop().await;
        assert_eq!(events.recv().await.unwrap(), BusEvent::BackgroundStateChanged { is_active: false });

        tokio::time::sleep(Duration::from_secs(3 * 60 * 60)).await;
        assert!(events.try_recv().is_err());
        let status = scheduler.status().await;
        assert!(!status.is_active);
        assert_eq!(status.current_track.map(|t| t.id), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_discards_the_old_timer() {
        let catalog = Arc::new(MemoryCatalog::with_tracks([track(1), track(2)]));
        let (scheduler, _bus) = scheduler_with(catalog);

        scheduler.schedule_track(1, Some(5.0), "admin").await.unwrap();
        tokio::time::sleep(Duration::from_secs(4 * 60)).await;
        scheduler.schedule_track(2, Some(60.0), "admin").await.unwrap();
        tokio::time::sleep(Duration::from_secs(2 * 60)).await;

        let status = scheduler.status().await;
        assert_eq!(status.rotation_mode, RotationMode::Timed);
        assert_eq!(status.current_track.map(|t| t.id), Some(2));
        scheduler.shutdown().await;
    }

    fn pending_timer(scheduler: &BackgroundScheduler) -> Option<CancellationToken> {
        scheduler.shared.state.try_lock().ok().and_then(|state| state.timer.clone())
    }

    #[tokio::test(start_paused = true)]
    async fn manual_tick_on_empty_catalog_cancels_pending_timer() {
        let catalog = Arc::new(MemoryCatalog::with_tracks([track(1)]));
        let (scheduler, _bus) = scheduler_with(Arc::clone(&catalog));

        // Continuous: the current track stays and a fresh timer replaces the old one.
        assert!(scheduler.heal().await);
        let armed = pending_timer(&scheduler).unwrap();
        catalog.set_active(1, false);
        assert!(scheduler.tick().await.is_none());
        assert!(armed.is_cancelled());
        let rearmed = pending_timer(&scheduler).unwrap();
        assert!(!rearmed.is_cancelled());
        assert!(scheduler.status().await.is_active);

        // Timed: the channel stops and no timer is left behind.
        catalog.set_active(1, true);
        scheduler.schedule_track(1, Some(10.0), "admin").await.unwrap();
        let armed = pending_timer(&scheduler).unwrap();
        assert!(rearmed.is_cancelled());
        catalog.set_active(1, false);
        assert!(scheduler.tick().await.is_none());
        assert!(armed.is_cancelled());
        assert!(pending_timer(&scheduler).is_none());
        assert!(!scheduler.status().await.is_active);
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn skip_moves_to_another_track() {
        let catalog = Arc::new(MemoryCatalog::with_tracks([track(1), track(2)]));
        let (scheduler, _bus) = scheduler_with(catalog);

        scheduler.schedule_track(1, None, "admin").await.unwrap();
        let next = scheduler.skip().await.unwrap();
        assert_eq!(next.id, 2);
        assert_eq!(scheduler.status().await.rotation_mode, RotationMode::Continuous);

        let empty = BackgroundScheduler::new(
            Arc::new(MemoryCatalog::new()),
            EventBus::default(),
            SchedulerConfig::default(),
        );
        assert!(matches!(empty.skip().await, Err(AirwaveError::NotFound(_))));
        scheduler.shutdown().await;
    }

    struct BrokenCatalog;

    #[async_trait]
    impl CatalogGateway for BrokenCatalog {
        async fn get_track(&self, _id: u64) -> Result<Option<Track>> {
            Err(AirwaveError::Upstream("connection refused".into()))
        }

        async fn random_active_track(&self, _exclude: Option<u64>) -> Result<Option<Track>> {
            Err(AirwaveError::Upstream("connection refused".into()))
        }

        async fn increment_play_count(&self, _id: u64) -> Result<()> {
            Err(AirwaveError::Upstream("connection refused".into()))
        }

        async fn record_schedule(
            &self,
            _track_id: u64,
            _duration_minutes: u32,
            _created_by: &str,
        ) -> Result<ScheduleRecord> {
            Err(AirwaveError::Upstream("connection refused".into()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn catalog_failures_leave_state_untouched() {
        let scheduler = BackgroundScheduler::new(
            Arc::new(BrokenCatalog),
            EventBus::default(),
            SchedulerConfig::default(),
        );

        assert!(matches!(
            scheduler.schedule_track(1, None, "admin").await,
            Err(AirwaveError::Upstream(_))
        ));
        assert!(!scheduler.heal().await);
        assert!(scheduler.tick().await.is_none());
        assert_eq!(scheduler.status().await, BackgroundTrackState::default());
    }
}
