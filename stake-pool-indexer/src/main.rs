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

#[tokio::main]
async fn main() {
    use indexer_common::telemetry;
    use log::error;
    use std::panic;

    telemetry::init_logging();
    panic::set_hook(Box::new(|panic| error!(panic:%; "process panicked")));

    if let Err(error) = run().await {
        let backtrace = error.backtrace();
        let error = format!("{error:#}");
        error!(error, backtrace:%; "process exited with ERROR");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    use anyhow::Context;
    use indexer_common::{
        config::ConfigExt,
        infra::{migrations, pool},
        telemetry,
    };
    use log::info;
    use stake_pool_indexer::{
        application,
        config::Config,
        domain::cache::MetricsCache,
        infra::{self, price::HttpPriceFeed, rpc},
    };
    use tokio::signal::unix::{SignalKind, signal};

    let sigterm = signal(SignalKind::terminate()).context("register SIGTERM handler")?;
    let config = Config::load().context("load configuration")?;
    info!(config:?; "starting");
    let Config {
        run_migrations,
        application_config,
        infra_config,
        telemetry_config:
            telemetry::Config {
                tracing_config,
                metrics_config,
            },
    } = config;

    telemetry::init_tracing(tracing_config).context("initialize tracing")?;
    telemetry::init_metrics(metrics_config).context("initialize metrics")?;

    let infra::Config {
        rpc_config,
        storage_config,
        price_config,
    } = infra_config;

    let pool = pool::postgres::PostgresPool::new(storage_config)
        .await
        .context("create DB pool for Postgres")?;
    if run_migrations {
        migrations::postgres::run(&pool)
            .await
            .context("run Postgres migrations")?;
    }
    let storage = infra::storage::Storage::new(pool);

    let chains = rpc::chains(rpc_config).context("create RPC chain clients")?;
    let price_feed = HttpPriceFeed::new(price_config).context("create price feed")?;

    application::run(
        application_config,
        chains,
        storage,
        price_feed,
        MetricsCache::default(),
        sigterm,
    )
    .await
    .context("run stake pool indexer application")
}
