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

mod guard;
mod metrics;
mod network;
mod pool_snapshots;

pub use guard::*;
pub use network::*;
pub use pool_snapshots::*;

use crate::{
    application::metrics::Metrics,
    domain::{
        apy::DEFAULT_SLOTS_PER_EPOCH,
        cache::MetricsCache,
        chain::{Chain, Chains},
        price::PriceFeed,
        retry::RetryPolicy,
        sampler::RollingSlotTime,
        storage::Storage,
    },
};
use anyhow::Context;
use futures::future::try_join_all;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::Deserialize;
use std::{sync::Arc, time::Duration};
use tokio::{
    pin, select,
    signal::unix::Signal,
    task::{self, JoinHandle},
    time::{MissedTickBehavior, interval},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default = "slots_per_epoch_default")]
    pub slots_per_epoch: u64,

    pub pool_snapshots: PeriodicConfig,
    pub network_stats: CachedConfig,
    pub inflation_rate: CachedConfig,
    pub price: CachedConfig,
    pub epoch_estimate: SamplingConfig,
    pub slot_time: SamplingConfig,
    pub network_apy: NetworkApyConfig,

    #[serde(with = "humantime_serde")]
    pub cache_purge_interval: Duration,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PeriodicConfig {
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

/// A periodic task whose result is cached for `ttl`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CachedConfig {
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
}

/// A periodic task taking two epoch info samples `wait` apart.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SamplingConfig {
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    #[serde(with = "humantime_serde")]
    pub ttl: Duration,

    #[serde(with = "humantime_serde")]
    pub wait: Duration,

    pub max_attempts: u32,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct NetworkApyConfig {
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    #[serde(with = "humantime_serde")]
    pub ttl: Duration,

    pub batch_size: usize,
}

/// Run all periodic task families until SIGTERM. Pool snapshots are read from the chain of each
/// pool's network, network-wide metrics from mainnet.
pub async fn run<C>(
    config: Config,
    chains: Chains<C>,
    storage: impl Storage,
    price_feed: impl PriceFeed,
    cache: MetricsCache,
    mut sigterm: Signal,
) -> anyhow::Result<()>
where
    C: Chain,
{
    let Config {
        retry,
        slots_per_epoch,
        pool_snapshots,
        network_stats,
        inflation_rate,
        price,
        epoch_estimate,
        slot_time,
        network_apy,
        cache_purge_interval,
    } = config;

    let cancel = CancellationToken::new();
    let metrics = Metrics::new();
    let rolling_slot_time = Arc::new(Mutex::new(RollingSlotTime::default()));
    let chain = chains.mainnet().clone();

    let pool_snapshots_task = spawn_periodic(
        TaskFamily::PoolSnapshots,
        pool_snapshots.interval,
        cancel.clone(),
        {
            let storage = storage.clone();
            let cache = cache.clone();
            move || {
                let chains = chains.clone();
                let storage = storage.clone();
                let cache = cache.clone();
                let metrics = metrics.clone();
                async move {
                    let epochs_per_year = current_epochs_per_year(&cache, slots_per_epoch);
                    run_pool_snapshot_cycle(&chains, &storage, retry, epochs_per_year, &metrics)
                        .await
                }
            }
        },
    );

    let network_stats_task = spawn_periodic(
        TaskFamily::NetworkStats,
        network_stats.interval,
        cancel.clone(),
        {
            let chain = chain.clone();
            let cache = cache.clone();
            move || {
                let chain = chain.clone();
                let cache = cache.clone();
                async move {
                    run_network_stats_cycle(&chain, &cache, retry, network_stats.ttl).await
                }
            }
        },
    );

    let inflation_rate_task = spawn_periodic(
        TaskFamily::InflationRate,
        inflation_rate.interval,
        cancel.clone(),
        {
            let chain = chain.clone();
            let cache = cache.clone();
            move || {
                let chain = chain.clone();
                let cache = cache.clone();
                async move {
                    run_inflation_rate_cycle(&chain, &cache, retry, inflation_rate.ttl).await
                }
            }
        },
    );

    let price_task = spawn_periodic(TaskFamily::Price, price.interval, cancel.clone(), {
        let cache = cache.clone();
        move || {
            let price_feed = price_feed.clone();
            let cache = cache.clone();
            async move { run_price_cycle(&price_feed, &cache, retry, price.ttl).await }
        }
    });

    let epoch_estimate_task = spawn_periodic(
        TaskFamily::EpochEstimate,
        epoch_estimate.interval,
        cancel.clone(),
        {
            let chain = chain.clone();
            let cache = cache.clone();
            let cancel = cancel.clone();
            move || {
                let chain = chain.clone();
                let cache = cache.clone();
                let cancel = cancel.clone();
                async move {
                    run_epoch_estimate_cycle(
                        &chain,
                        &cache,
                        epoch_estimate.wait,
                        epoch_estimate.max_attempts,
                        epoch_estimate.ttl,
                        &cancel,
                    )
                    .await
                }
            }
        },
    );

    let slot_time_task = spawn_periodic(
        TaskFamily::SlotTime,
        slot_time.interval,
        cancel.clone(),
        {
            let chain = chain.clone();
            let cache = cache.clone();
            let cancel = cancel.clone();
            move || {
                let chain = chain.clone();
                let cache = cache.clone();
                let cancel = cancel.clone();
                let rolling_slot_time = rolling_slot_time.clone();
                async move {
                    run_slot_time_cycle(
                        &chain,
                        &cache,
                        &rolling_slot_time,
                        slot_time.wait,
                        slot_time.max_attempts,
                        slot_time.ttl,
                        &cancel,
                    )
                    .await
                }
            }
        },
    );

    let network_apy_task = spawn_periodic(
        TaskFamily::NetworkApy,
        network_apy.interval,
        cancel.clone(),
        {
            let cache = cache.clone();
            move || {
                let chain = chain.clone();
                let cache = cache.clone();
                async move {
                    run_network_apy_cycle(
                        &chain,
                        &cache,
                        retry,
                        network_apy.batch_size,
                        slots_per_epoch,
                        network_apy.ttl,
                    )
                    .await
                }
            }
        },
    );

    let cache_purge_task = spawn_periodic(
        TaskFamily::CachePurge,
        cache_purge_interval,
        cancel.clone(),
        move || {
            let cache = cache.clone();
            async move { anyhow::Ok(cache.purge_expired()) }
        },
    );

    let tasks = try_join_all([
        pool_snapshots_task,
        network_stats_task,
        inflation_rate_task,
        price_task,
        epoch_estimate_task,
        slot_time_task,
        network_apy_task,
        cache_purge_task,
    ]);
    pin!(tasks);

    select! {
        result = &mut tasks => {
            result.context("periodic task panicked")?;
            return Ok(());
        }

        _ = sigterm.recv() => {
            warn!("SIGTERM received");
        }
    }

    cancel.cancel();
    tasks.await.context("periodic task panicked")?;
    info!("all periodic tasks stopped");

    Ok(())
}

/// Spawn a task triggering a cycle of the given family every `period`, the first one
/// immediately, until cancelled. Each cycle runs in its own task behind the family's
/// [CycleGuard], so a slow cycle makes later triggers no-ops instead of delaying them. Once
/// cancelled, the returned task completes after the cycle in flight, if any.
fn spawn_periodic<F, Fut, T>(
    family: TaskFamily,
    period: Duration,
    cancel: CancellationToken,
    mut cycle: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let guard = CycleGuard::default();
    let cycles = TaskTracker::new();

    task::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            select! {
                _ = cancel.cancelled() => break,

                _ = ticker.tick() => {
                    let guard = guard.clone();
                    let cycle = cycle();

                    cycles.spawn(async move {
                        if let CycleOutcome::Completed(Err(error)) =
                            run_exclusive(&guard, family, cycle).await
                        {
                            metrics::cycle_failed(family);
                            warn!(
                                family:%,
                                error:% = format!("{error:#}");
                                "cycle failed"
                            );
                        }
                    });
                }
            }
        }

        cycles.close();
        if !cycles.is_empty() {
            debug!(family:%; "waiting for cycle in flight");
        }
        cycles.wait().await;
    })
}

fn slots_per_epoch_default() -> u64 {
    DEFAULT_SLOTS_PER_EPOCH
}

#[cfg(test)]
mod tests {
    use crate::application::{TaskFamily, spawn_periodic};
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };
    use tokio::time::sleep;
    use tokio_util::sync::CancellationToken;

    #[tokio::test(start_paused = true)]
    async fn test_spawn_periodic() {
        let cycles = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        let task = spawn_periodic(
            TaskFamily::Price,
            Duration::from_secs(10),
            cancel.clone(),
            {
                let cycles = cycles.clone();
                move || {
                    let cycles = cycles.clone();
                    async move { anyhow::Ok(cycles.fetch_add(1, Ordering::SeqCst)) }
                }
            },
        );

        // Triggers at 0s, 10s and 20s.
        sleep(Duration::from_secs(25)).await;
        assert_eq!(cycles.load(Ordering::SeqCst), 3);

        cancel.cancel();
        task.await.expect("periodic task does not panic");

        sleep(Duration::from_secs(30)).await;
        assert_eq!(cycles.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_periodic_skips_overlapping_cycles() {
        let cycles = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        // Each cycle takes 15s, so the trigger at 10s falls into the first cycle.
        let task = spawn_periodic(
            TaskFamily::PoolSnapshots,
            Duration::from_secs(10),
            cancel.clone(),
            {
                let cycles = cycles.clone();
                move || {
                    let cycles = cycles.clone();
                    async move {
                        cycles.fetch_add(1, Ordering::SeqCst);
                        sleep(Duration::from_secs(15)).await;
                        anyhow::Ok(())
                    }
                }
            },
        );

        // Triggers at 0s and 20s run, the one at 10s is skipped.
        sleep(Duration::from_secs(25)).await;
        assert_eq!(cycles.load(Ordering::SeqCst), 2);

        cancel.cancel();
        task.await.expect("periodic task does not panic");
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_periodic_waits_for_cycle_in_flight() {
        let started = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        let task = spawn_periodic(
            TaskFamily::PoolSnapshots,
            Duration::from_secs(60),
            cancel.clone(),
            {
                let started = started.clone();
                let finished = finished.clone();
                move || {
                    let started = started.clone();
                    let finished = finished.clone();
                    async move {
                        started.fetch_add(1, Ordering::SeqCst);
                        sleep(Duration::from_secs(30)).await;
                        finished.fetch_add(1, Ordering::SeqCst);
                        anyhow::Ok(())
                    }
                }
            },
        );

        sleep(Duration::from_secs(1)).await;
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(finished.load(Ordering::SeqCst), 0);

        cancel.cancel();
        task.await.expect("periodic task does not panic");
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }
}
