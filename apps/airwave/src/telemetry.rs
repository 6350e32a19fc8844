// SPDX-FileCopyrightText: © 2025 Airwave Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! OpenTelemetry metrics setup.
//!
//! Airwave's meters (`airwave_registry`, `airwave_relay`, `airwave_scheduler`,
//! `airwave_http`, `airwave_ws`) go through the global meter provider and are
//! no-ops until [`init_metrics`] installs one.

use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::{Protocol, WithExportConfig, WithHttpConfig};
use opentelemetry_sdk::{
    metrics::{PeriodicReader, SdkMeterProvider},
    Resource,
};
use std::collections::HashMap;
use std::time::Duration;

use crate::config::TelemetryConfig;

const EXPORT_INTERVAL: Duration = Duration::from_secs(5);

fn build_otlp_exporter(
    endpoint: &str,
    headers: &HashMap<String, String>,
) -> Result<opentelemetry_otlp::MetricExporter, Box<dyn std::error::Error>> {
    let mut exporter_builder = opentelemetry_otlp::MetricExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpBinary)
        .with_endpoint(endpoint)
        .with_timeout(Duration::from_secs(10));

    if !headers.is_empty() {
        tracing::info!(count = headers.len(), "Adding custom headers to OTLP exporter");
        exporter_builder = exporter_builder.with_headers(headers.clone());
    }

    exporter_builder.build().map_err(|e| {
        tracing::error!(error = %e, "Failed to build OTLP metrics exporter");
        e.into()
    })
}

fn service_resource() -> Resource {
    Resource::builder_empty()
        .with_attributes([
            KeyValue::new("service.name", "airwave"),
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
        ])
        .build()
}

/// Installs the global meter provider, exporting over OTLP/HTTP when an
/// endpoint is configured and collecting locally otherwise.
///
/// # Errors
///
/// Returns an error if the OTLP metrics exporter fails to build.
pub fn init_metrics(
    config: &TelemetryConfig,
) -> Result<SdkMeterProvider, Box<dyn std::error::Error>> {
    let builder = SdkMeterProvider::builder().with_resource(service_resource());

    let provider = match &config.otlp_endpoint {
        Some(endpoint) => {
            let exporter = build_otlp_exporter(endpoint, &config.otlp_headers)?;
            let reader = PeriodicReader::builder(exporter).with_interval(EXPORT_INTERVAL).build();
            tracing::info!(endpoint = %endpoint, "Exporting metrics over OTLP");
            builder.with_reader(reader).build()
        },
        None => {
            tracing::info!("No OTLP endpoint configured, metrics will be collected but not exported");
            builder.build()
        },
    };

    global::set_meter_provider(provider.clone());
    Ok(provider)
}
