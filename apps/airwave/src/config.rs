// SPDX-FileCopyrightText: © 2025 Airwave Contributors
//
// SPDX-License-Identifier: MPL-2.0

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::Level;

use airwave_core::{RelayConfig, SchedulerConfig, Track};

/// Log level for filtering messages.
#[derive(Deserialize, Serialize, Debug, Clone, Default, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

const fn default_true() -> bool {
    true
}

const fn default_max_ws_message_bytes() -> usize {
    // Audio chunks from MediaRecorder are typically a few KiB; leave generous headroom
    1024 * 1024
}

fn default_cors_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost".to_string(),
        "https://localhost".to_string(),
        "http://localhost:*".to_string(),
        "https://localhost:*".to_string(),
        "http://127.0.0.1".to_string(),
        "https://127.0.0.1".to_string(),
        "http://127.0.0.1:*".to_string(),
        "https://127.0.0.1:*".to_string(),
    ]
}

/// CORS configuration for cross-origin requests.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct CorsConfig {
    /// Allowed origins for CORS requests.
    /// Supports wildcards: "http://localhost:*" matches any port on localhost.
    /// Set to `["*"]` to allow all origins (not recommended for production).
    #[serde(default = "default_cors_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self { allowed_origins: default_cors_allowed_origins() }
    }
}

/// OpenTelemetry metrics configuration.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct TelemetryConfig {
    #[serde(default = "default_true")]
    pub enable: bool,
    /// OTLP/HTTP metrics endpoint (e.g., `http://localhost:4318/v1/metrics`).
    /// Without it meters are recorded but never exported.
    pub otlp_endpoint: Option<String>,
    #[serde(default)]
    pub otlp_headers: HashMap<String, String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { enable: true, otlp_endpoint: None, otlp_headers: HashMap::new() }
    }
}

/// Log file format options.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration for console and file output.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct LogConfig {
    #[serde(default)]
    pub console_enable: bool,
    #[serde(default)]
    pub file_enable: bool,
    #[serde(default)]
    pub console_level: LogLevel,
    #[serde(default)]
    pub file_level: LogLevel,
    #[serde(default)]
    pub file_path: String,
    #[serde(default)]
    pub file_format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            console_enable: true,
            file_enable: false,
            console_level: LogLevel::default(),
            file_level: LogLevel::Info,
            file_path: "./airwave.log".to_string(),
            file_format: LogFormat::default(),
        }
    }
}

/// HTTP server configuration including TLS and CORS settings.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct ServerConfig {
    pub address: String,
    pub tls: bool,
    pub cert_path: String,
    pub key_path: String,
    /// Largest WebSocket frame accepted; bigger frames close the connection.
    #[serde(default = "default_max_ws_message_bytes")]
    pub max_ws_message_bytes: usize,
    #[serde(default)]
    pub cors: CorsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:3001".to_string(),
            tls: false,
            cert_path: String::new(),
            key_path: String::new(),
            max_ws_message_bytes: default_max_ws_message_bytes(),
            cors: CorsConfig::default(),
        }
    }
}

/// Shared-secret gate for the background-stream admin routes.
#[derive(Deserialize, Serialize, Debug, Clone, Default, JsonSchema)]
pub struct AdminConfig {
    /// Expected `Authorization: Bearer <token>` value. Admin routes answer 403
    /// while this is unset.
    pub token: Option<String>,
}

const fn default_max_pending_chunks() -> usize {
    airwave_core::relay::DEFAULT_MAX_PENDING_CHUNKS
}

const fn default_event_capacity() -> usize {
    airwave_core::bus::DEFAULT_EVENT_CAPACITY
}

/// Broadcast relay tuning.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct RelaySettings {
    /// Undelivered audio chunks a single listener may fall behind by before
    /// new chunks are dropped for it (default: 64)
    #[serde(default = "default_max_pending_chunks")]
    pub max_pending_chunks: usize,
    /// Per-observer event buffer; observers that lag further skip events (default: 128)
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            max_pending_chunks: default_max_pending_chunks(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl From<&RelaySettings> for RelayConfig {
    fn from(settings: &RelaySettings) -> Self {
        Self { max_pending_chunks: settings.max_pending_chunks }
    }
}

const fn default_continuous_interval_secs() -> u64 {
    5 * 60
}

const fn default_self_heal_interval_secs() -> u64 {
    30
}

const fn default_startup_delay_secs() -> u64 {
    2
}

const fn default_min_duration_minutes() -> u32 {
    5
}

const fn default_max_duration_minutes() -> u32 {
    1440
}

const fn default_duration_minutes() -> u32 {
    30
}

/// Background channel scheduling.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct SchedulerSettings {
    /// Run the self-heal supervisor (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_continuous_interval_secs")]
    pub continuous_interval_secs: u64,
    #[serde(default = "default_self_heal_interval_secs")]
    pub self_heal_interval_secs: u64,
    #[serde(default = "default_startup_delay_secs")]
    pub startup_delay_secs: u64,
    #[serde(default = "default_min_duration_minutes")]
    pub min_duration_minutes: u32,
    #[serde(default = "default_max_duration_minutes")]
    pub max_duration_minutes: u32,
    #[serde(default = "default_duration_minutes")]
    pub default_duration_minutes: u32,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            continuous_interval_secs: default_continuous_interval_secs(),
            self_heal_interval_secs: default_self_heal_interval_secs(),
            startup_delay_secs: default_startup_delay_secs(),
            min_duration_minutes: default_min_duration_minutes(),
            max_duration_minutes: default_max_duration_minutes(),
            default_duration_minutes: default_duration_minutes(),
        }
    }
}

impl From<&SchedulerSettings> for SchedulerConfig {
    fn from(settings: &SchedulerSettings) -> Self {
        Self {
            continuous_interval: Duration::from_secs(settings.continuous_interval_secs.max(1)),
            self_heal_interval: Duration::from_secs(settings.self_heal_interval_secs.max(1)),
            startup_delay: Duration::from_secs(settings.startup_delay_secs),
            min_duration_minutes: settings.min_duration_minutes,
            max_duration_minutes: settings.max_duration_minutes,
            default_duration_minutes: settings.default_duration_minutes,
        }
    }
}

/// Tracks loaded into the in-memory catalog at start-up.
#[derive(Deserialize, Serialize, Debug, Clone, Default, JsonSchema)]
pub struct CatalogConfig {
    #[serde(default)]
    pub tracks: Vec<Track>,
}

/// Root configuration for the Airwave server.
#[derive(Deserialize, Serialize, Default, Debug, Clone, JsonSchema)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub admin: AdminConfig,

    #[serde(default)]
    pub relay: RelaySettings,

    #[serde(default)]
    pub scheduler: SchedulerSettings,

    #[serde(default)]
    pub catalog: CatalogConfig,
}

#[derive(Debug)]
pub struct ConfigLoadResult {
    pub config: Config,
    pub file_missing: Option<String>,
}

/// Loads the application configuration from defaults, a TOML file, and environment variables.
///
/// # Errors
///
/// Returns an error if:
/// - The configuration file exists but contains invalid TOML syntax
/// - Environment variables are set but contain invalid values
pub fn load(config_path: &str) -> Result<ConfigLoadResult, Box<figment::Error>> {
    let mut figment =
        Figment::new().merge(figment::providers::Serialized::defaults(Config::default()));

    let mut file_missing = None;

    if std::path::Path::new(config_path).exists() {
        figment = figment.merge(Toml::file(config_path));
    } else {
        file_missing = Some(config_path.to_string());
    }

    let mut config: Config =
        figment.merge(Env::prefixed("AW_").split("__")).extract().map_err(Box::new)?;

    normalize_admin_token(&mut config.admin);

    Ok(ConfigLoadResult { config, file_missing })
}

/// A blank token is the same as no token.
fn normalize_admin_token(admin: &mut AdminConfig) {
    if admin.token.as_deref().is_some_and(|token| token.trim().is_empty()) {
        admin.token = None;
    }
}

/// Generates the default configuration as a pretty-printed TOML string.
///
/// # Errors
///
/// Returns an error if the default configuration cannot be serialized to TOML.
pub fn generate_default() -> Result<String, toml::ser::Error> {
    let default_config = Config::default();
    toml::to_string_pretty(&default_config)
}
