// SPDX-FileCopyrightText: © 2025 Airwave Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Catalog gateway: the narrow interface the background scheduler uses to reach
//! the track catalog.
//!
//! The persistent storage engine behind the catalog is not part of Airwave.
//! [`MemoryCatalog`] is the in-process implementation the server ships with; it is
//! seeded from configuration and keeps play counts and schedule history in memory.

use async_trait::async_trait;
use indexmap::IndexMap;
use rand::seq::IndexedRandom;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::SystemTime;
use ts_rs::TS;

use crate::error::{AirwaveError, Result};

const fn default_true() -> bool {
    true
}

/// Read-only snapshot of a catalog track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, TS)]
#[ts(export)]
pub struct Track {
    pub id: u64,
    pub title: String,
    pub artist: String,
    pub filename: String,
    #[serde(default)]
    pub duration_seconds: f64,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// Audit record written whenever an administrator schedules a background track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleRecord {
    pub id: u64,
    pub track_id: u64,
    pub duration_minutes: u32,
    pub created_by: String,
    pub created_at: SystemTime,
}

/// Operations the scheduler needs from the catalog.
///
/// Implementations report storage failures as [`AirwaveError::Upstream`].
#[async_trait]
pub trait CatalogGateway: Send + Sync {
    /// Looks a track up by id. Inactive tracks are returned as-is; callers decide
    /// whether an inactive track is usable.
    async fn get_track(&self, id: u64) -> Result<Option<Track>>;

    /// Picks a uniformly random active track, skipping `exclude` when given.
    async fn random_active_track(&self, exclude: Option<u64>) -> Result<Option<Track>>;

    async fn increment_play_count(&self, id: u64) -> Result<()>;

    /// Persists a schedule audit record and returns it with its assigned id.
    async fn record_schedule(
        &self,
        track_id: u64,
        duration_minutes: u32,
        created_by: &str,
    ) -> Result<ScheduleRecord>;
}

#[derive(Debug)]
struct CatalogEntry {
    track: Track,
    play_count: u64,
}

/// In-memory catalog keyed by track id, in insertion order.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    entries: RwLock<IndexMap<u64, CatalogEntry>>,
    schedules: RwLock<Vec<ScheduleRecord>>,
    next_schedule_id: AtomicU64,
}

fn poisoned<T>(_: T) -> AirwaveError {
    AirwaveError::Upstream("catalog lock poisoned".to_string())
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tracks(tracks: impl IntoIterator<Item = Track>) -> Self {
        let catalog = Self::new();
        for track in tracks {
            catalog.upsert_track(track);
        }
        catalog
    }

    /// Inserts a track or replaces the one with the same id, keeping its play count.
    pub fn upsert_track(&self, track: Track) {
        let Ok(mut entries) = self.entries.write() else {
            tracing::error!(track_id = track.id, "Catalog lock poisoned; dropping track update");
            return;
        };
        let play_count = entries.get(&track.id).map_or(0, |e| e.play_count);
        entries.insert(track.id, CatalogEntry { track, play_count });
    }

    /// Flips the `is_active` flag. Returns false if the track does not exist.
    pub fn set_active(&self, id: u64, active: bool) -> bool {
        let Ok(mut entries) = self.entries.write() else {
            return false;
        };
        match entries.get_mut(&id) {
            Some(entry) => {
                entry.track.is_active = active;
                true
            },
            None => false,
        }
    }

    pub fn play_count(&self, id: u64) -> Option<u64> {
        self.entries.read().ok()?.get(&id).map(|e| e.play_count)
    }

    pub fn schedule_history(&self) -> Vec<ScheduleRecord> {
        self.schedules.read().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn active_count(&self) -> usize {
        self.entries
            .read()
            .map(|entries| entries.values().filter(|e| e.track.is_active).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl CatalogGateway for MemoryCatalog {
    async fn get_track(&self, id: u64) -> Result<Option<Track>> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries.get(&id).map(|e| e.track.clone()))
    }

    async fn random_active_track(&self, exclude: Option<u64>) -> Result<Option<Track>> {
        let entries = self.entries.read().map_err(poisoned)?;
        let candidates: Vec<&Track> = entries
            .values()
            .map(|e| &e.track)
            .filter(|t| t.is_active && Some(t.id) != exclude)
            .collect();
        Ok(candidates.choose(&mut rand::rng()).map(|t| (*t).clone()))
    }

    async fn increment_play_count(&self, id: u64) -> Result<()> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        let entry =
            entries.get_mut(&id).ok_or_else(|| AirwaveError::NotFound(format!("Track {id}")))?;
        entry.play_count += 1;
        Ok(())
    }

    async fn record_schedule(
        &self,
        track_id: u64,
        duration_minutes: u32,
        created_by: &str,
    ) -> Result<ScheduleRecord> {
        let record = ScheduleRecord {
            id: self.next_schedule_id.fetch_add(1, Ordering::Relaxed) + 1,
            track_id,
            duration_minutes,
            created_by: created_by.to_string(),
            created_at: SystemTime::now(),
        };
        self.schedules.write().map_err(poisoned)?.push(record.clone());
        Ok(record)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Track;

    pub fn track(id: u64) -> Track {
        Track {
            id,
            title: format!("Track {id}"),
            artist: "Test Artist".to_string(),
            filename: format!("track-{id}.mp3"),
            duration_seconds: 180.0,
            is_active: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::track;
    use super::*;

    #[tokio::test]
    async fn random_track_skips_inactive_and_excluded() {
        let catalog = MemoryCatalog::with_tracks([track(1), track(2), track(3)]);
        catalog.set_active(3, false);

        for _ in 0..50 {
            let picked = catalog.random_active_track(Some(1)).await.unwrap().unwrap();
            assert_eq!(picked.id, 2);
        }
    }

    #[tokio::test]
    async fn random_track_on_empty_catalog_is_none() {
        let catalog = MemoryCatalog::new();
        assert!(catalog.random_active_track(None).await.unwrap().is_none());

        let catalog = MemoryCatalog::with_tracks([track(4)]);
        assert!(catalog.random_active_track(Some(4)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn play_counts_survive_upserts() {
        let catalog = MemoryCatalog::with_tracks([track(1)]);
        catalog.increment_play_count(1).await.unwrap();
        catalog.increment_play_count(1).await.unwrap();
        catalog.upsert_track(Track { title: "Renamed".to_string(), ..track(1) });

        assert_eq!(catalog.play_count(1), Some(2));
        assert!(matches!(
            catalog.increment_play_count(99).await,
            Err(AirwaveError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn schedule_records_get_increasing_ids() {
        let catalog = MemoryCatalog::new();
        let first = catalog.record_schedule(1, 10, "admin").await.unwrap();
        let second = catalog.record_schedule(2, 20, "admin").await.unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(catalog.schedule_history().len(), 2);
    }
}
