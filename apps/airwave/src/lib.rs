// SPDX-FileCopyrightText: © 2025 Airwave Contributors
//
// SPDX-License-Identifier: MPL-2.0

pub mod admin;
pub mod cli;
pub mod config;
pub mod logging;
pub mod server;
pub mod state;
pub mod telemetry;
pub mod websocket;
pub mod websocket_handlers;
pub mod wire;

pub use config::Config;
pub use server::create_app;
pub use state::AppState;
