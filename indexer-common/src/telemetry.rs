// This file is part of midnight-indexer.
// Copyright (C) 2025 Midnight Foundation
// SPDX-License-Identifier: Apache-2.0
// Licensed under the Apache License, Version 2.0 (the "License");
// You may not use this file except in compliance with the License.
// You may obtain a copy of the License at
// http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use fastrace::collector::Config as CollectorConfig;
use fastrace_opentelemetry::OpenTelemetryReporter;
use logforth::{
    append::{self, FastraceEvent},
    diagnostic::FastraceDiagnostic,
    filter::env_filter::EnvFilterBuilder,
};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use opentelemetry::{InstrumentationScope, KeyValue};
use opentelemetry_otlp::{ExporterBuildError, SpanExporter, WithExportConfig};
use opentelemetry_sdk::Resource;
use serde::Deserialize;
use std::{borrow::Cow, net::IpAddr};
use thiserror::Error;

/// Telemetry configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(rename = "tracing")]
    pub tracing_config: TracingConfig,

    #[serde(rename = "metrics")]
    pub metrics_config: MetricsConfig,
}

/// Tracing configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TracingConfig {
    pub enabled: bool,
    pub service_name: String,
    pub otlp_exporter_endpoint: String,
}

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub address: IpAddr,
    pub port: u16,
}

/// Initialize logging: structured logs to stdout, filtered by `RUST_LOG` (default `info`), with
/// the current trace context attached and log records forwarded as span events.
pub fn init_logging() {
    logforth::starter_log::builder()
        .dispatch(|d| {
            d.filter(EnvFilterBuilder::from_default_env_or("info").build())
                .diagnostic(FastraceDiagnostic::default())
                .append(append::Stdout::default())
        })
        .dispatch(|d| d.append(FastraceEvent::default()))
        .apply();
}

/// Initialize tracing, exporting spans via OTLP/gRPC if enabled.
pub fn init_tracing(config: TracingConfig) -> Result<(), Error> {
    let TracingConfig {
        enabled,
        service_name,
        otlp_exporter_endpoint,
    } = config;

    if enabled {
        let exporter = SpanExporter::builder()
            .with_tonic()
            .with_endpoint(otlp_exporter_endpoint)
            .build()?;
        let resource = Resource::builder()
            .with_attributes([KeyValue::new("service.name", service_name.clone())])
            .build();
        let scope = InstrumentationScope::builder(service_name)
            .with_version(env!("CARGO_PKG_VERSION"))
            .build();

        let reporter = OpenTelemetryReporter::new(exporter, Cow::Owned(resource), scope);
        fastrace::set_reporter(reporter, CollectorConfig::default());
    }

    Ok(())
}

/// Initialize metrics, serving a Prometheus scrape endpoint if enabled.
pub fn init_metrics(config: MetricsConfig) -> Result<(), Error> {
    let MetricsConfig {
        enabled,
        address,
        port,
    } = config;

    if enabled {
        PrometheusBuilder::new()
            .with_http_listener((address, port))
            .install()?;
    }

    Ok(())
}

/// Error possibly returned when initializing telemetry.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot build OTLP span exporter")]
    Tracing(#[from] ExporterBuildError),

    #[error("cannot install Prometheus exporter")]
    Metrics(#[from] BuildError),
}
