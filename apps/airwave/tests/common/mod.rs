// SPDX-FileCopyrightText: © 2025 Airwave Contributors
//
// SPDX-License-Identifier: MPL-2.0

#![allow(clippy::unwrap_used, clippy::expect_used, dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use airwave_core::Track;
use airwave_server::{AppState, Config};
use tokio::net::TcpListener;
use tokio::time::{sleep, Duration};

pub const ADMIN_TOKEN: &str = "test-admin-token";

pub fn track(id: u64, title: &str) -> Track {
    Track {
        id,
        title: title.to_string(),
        artist: "Test Artist".to_string(),
        filename: format!("{id}.mp3"),
        duration_seconds: 200.0,
        is_active: true,
    }
}

/// Config with a small catalog, an admin token and the self-heal supervisor off
/// so tests control when the background channel starts.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.admin.token = Some(ADMIN_TOKEN.to_string());
    config.scheduler.enabled = false;
    config.log.file_enable = false;
    config.catalog.tracks = vec![track(7, "Night Drive"), track(8, "Morning Fog"), track(9, "Static")];
    config
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: Arc<AppState>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub fn http(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn ws(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Returns `None` when the sandbox forbids binding sockets.
pub async fn start_test_server(config: Config) -> Option<TestServer> {
    let listener = match TcpListener::bind("127.0.0.1:0").await {
        Ok(listener) => listener,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => return None,
        Err(e) => panic!("Failed to bind test server listener: {e}"),
    };
    let addr = listener.local_addr().unwrap();

    let (app, state) = airwave_server::create_app(config);
    let handle = tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });

    sleep(Duration::from_millis(50)).await;
    Some(TestServer { addr, state, handle })
}
