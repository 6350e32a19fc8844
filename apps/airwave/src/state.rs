// SPDX-FileCopyrightText: © 2025 Airwave Contributors
//
// SPDX-License-Identifier: MPL-2.0

use std::sync::Arc;
use std::time::Instant;

use airwave_core::{BackgroundScheduler, BroadcastRelay, EventBus, MemoryCatalog};

use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<BroadcastRelay>,
    pub scheduler: BackgroundScheduler,
    pub catalog: Arc<MemoryCatalog>,
    pub bus: EventBus,
    pub config: Arc<Config>,
    pub started_at: Instant,
}

impl AppState {
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
