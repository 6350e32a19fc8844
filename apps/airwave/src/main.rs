// SPDX-FileCopyrightText: © 2025 Airwave Contributors
//
// SPDX-License-Identifier: MPL-2.0

use clap::Parser;

mod admin;
mod cli;
mod config;
mod logging;
mod server;
mod state;
mod telemetry;
mod websocket;
mod websocket_handlers;
mod wire;

#[tokio::main]
async fn main() {
    // Install default crypto provider for Rustls (required for HTTPS/TLS support)
    let _ = rustls::crypto::ring::default_provider().install_default();

    let cli = cli::Cli::parse();
    cli::handle_command(&cli, logging::init_logging).await;
}
