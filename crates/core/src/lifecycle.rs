// SPDX-FileCopyrightText: © 2025 Airwave Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Per-broadcast lifecycle tracking.
//!
//! ```text
//!   Idle ──begin──▶ Live ──end──▶ Ended
//! ```
//!
//! `Idle` is implicit: any id never seen before. `Ended` is terminal and the id
//! is retired; a new broadcast always gets a new [`StreamId`]. There is no pause
//! state, a producer disconnecting is handled exactly like an explicit end.
//!
//! Only the most recent retired ids are remembered. Ids are minted as random
//! UUIDs and never reissued, so an evicted id simply reads as `Idle` again.

use indexmap::IndexSet;
use serde::Serialize;
use std::collections::HashSet;

use crate::error::{AirwaveError, Result};
use crate::types::StreamId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamPhase {
    Idle,
    Live,
    Ended,
}

/// Retired ids remembered by default.
pub const DEFAULT_RETIRED_CAPACITY: usize = 1024;

#[derive(Debug)]
pub struct StreamLifecycle {
    live: HashSet<StreamId>,
    /// Oldest first.
    retired: IndexSet<StreamId>,
    retired_capacity: usize,
}

impl Default for StreamLifecycle {
    fn default() -> Self {
        Self::with_retired_capacity(DEFAULT_RETIRED_CAPACITY)
    }
}

impl StreamLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retired_capacity(retired_capacity: usize) -> Self {
        Self {
            live: HashSet::new(),
            retired: IndexSet::new(),
            retired_capacity: retired_capacity.max(1),
        }
    }

    pub fn phase(&self, id: &StreamId) -> StreamPhase {
        if self.live.contains(id) {
            StreamPhase::Live
        } else if self.retired.contains(id) {
            StreamPhase::Ended
        } else {
            StreamPhase::Idle
        }
    }

    /// `Idle → Live`.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyLive` if the stream is live and `AlreadyEnded` if its id
    /// has been retired.
    pub fn begin(&mut self, id: &StreamId) -> Result<()> {
        match self.phase(id) {
            StreamPhase::Idle => {
                self.live.insert(id.clone());
                Ok(())
            },
            StreamPhase::Live => Err(AirwaveError::AlreadyLive(id.to_string())),
            StreamPhase::Ended => Err(AirwaveError::AlreadyEnded(id.to_string())),
        }
    }

    /// `Live → Ended`. Returns true only for the call that performed the
    /// transition; ending an unknown or already-ended stream is a no-op.
    pub fn end(&mut self, id: &StreamId) -> bool {
        if self.live.remove(id) {
            if self.retired.len() >= self.retired_capacity {
                self.retired.shift_remove_index(0);
            }
            self.retired.insert(id.clone());
            true
        } else {
            false
        }
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn retired_count(&self) -> usize {
        self.retired.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_live_ended() {
        let mut lifecycle = StreamLifecycle::new();
        let id = StreamId::new();

        assert_eq!(lifecycle.phase(&id), StreamPhase::Idle);
        lifecycle.begin(&id).unwrap();
        assert_eq!(lifecycle.phase(&id), StreamPhase::Live);
        assert!(lifecycle.end(&id));
        assert_eq!(lifecycle.phase(&id), StreamPhase::Ended);
    }

    #[test]
    fn end_is_idempotent() {
        let mut lifecycle = StreamLifecycle::new();
        let id = StreamId::new();
        lifecycle.begin(&id).unwrap();

        assert!(lifecycle.end(&id));
        assert!(!lifecycle.end(&id));
        assert!(!lifecycle.end(&StreamId::new()));
        assert_eq!(lifecycle.live_count(), 0);
    }

    #[test]
    fn retired_ids_never_come_back() {
        let mut lifecycle = StreamLifecycle::new();
        let id = StreamId::new();
        lifecycle.begin(&id).unwrap();
        assert!(matches!(lifecycle.begin(&id), Err(AirwaveError::AlreadyLive(_))));

        lifecycle.end(&id);
        assert!(matches!(lifecycle.begin(&id), Err(AirwaveError::AlreadyEnded(_))));
        assert_eq!(lifecycle.phase(&id), StreamPhase::Ended);
    }

    #[test]
    fn retired_set_keeps_only_recent_ids() {
        let mut lifecycle = StreamLifecycle::with_retired_capacity(16);
        let first = StreamId::new();
        lifecycle.begin(&first).unwrap();
        lifecycle.end(&first);

        for _ in 0..10_000 {
            let id = StreamId::new();
            lifecycle.begin(&id).unwrap();
            assert!(lifecycle.end(&id));
        }
        let last = StreamId::new();
        lifecycle.begin(&last).unwrap();
        lifecycle.end(&last);

        assert_eq!(lifecycle.retired_count(), 16);
        assert_eq!(lifecycle.phase(&last), StreamPhase::Ended);
        assert!(matches!(lifecycle.begin(&last), Err(AirwaveError::AlreadyEnded(_))));
        assert_eq!(lifecycle.phase(&first), StreamPhase::Idle);
        assert_eq!(lifecycle.live_count(), 0);
    }

    #[test]
    fn default_capacity_bounds_a_long_run() {
        let mut lifecycle = StreamLifecycle::new();
        for _ in 0..(DEFAULT_RETIRED_CAPACITY * 3) {
            let id = StreamId::new();
            lifecycle.begin(&id).unwrap();
            lifecycle.end(&id);
        }
        assert_eq!(lifecycle.retired_count(), DEFAULT_RETIRED_CAPACITY);
    }
}
