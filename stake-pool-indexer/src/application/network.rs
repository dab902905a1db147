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

//! Cycles refreshing the network-wide metrics in the cache.

use crate::domain::{
    NetworkStats, RewardTarget,
    apy::{DEFAULT_SLOT_TIME_MS, InflationRewardSample, epochs_per_year, inflation_reward_apy},
    cache::{MetricKey, MetricValue, MetricsCache},
    chain::Chain,
    price::PriceFeed,
    retry::{RetryPolicy, retry},
    sampler::{NetworkEpochEstimate, RollingSlotTime, calibrate_slot_time, sample_epoch_progress},
};
use anyhow::{Context, anyhow};
use fastrace::trace;
use log::{debug, info};
use parking_lot::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Epochs per year from the cached slot time, falling back to the default slot time.
pub fn current_epochs_per_year(cache: &MetricsCache, slots_per_epoch: u64) -> f64 {
    let slot_time_ms = cache
        .get(MetricKey::SlotTimeMs)
        .ok()
        .and_then(|value| value.as_f64())
        .unwrap_or(DEFAULT_SLOT_TIME_MS);

    epochs_per_year(slots_per_epoch, slot_time_ms)
}

#[trace]
pub async fn run_network_stats_cycle(
    chain: &impl Chain,
    cache: &MetricsCache,
    retry_policy: RetryPolicy,
    ttl: Duration,
) -> anyhow::Result<NetworkStats> {
    let vote_accounts = retry(retry_policy, "get_vote_accounts", move || {
        chain.get_vote_accounts()
    })
    .await
    .context("get vote accounts")?;

    let stats = NetworkStats::from(&vote_accounts);
    cache.set(
        MetricKey::ActiveStake,
        MetricValue::U64(stats.active_stake),
        ttl,
    );
    cache.set(
        MetricKey::ValidatorCount,
        MetricValue::U64(stats.validator_count),
        ttl,
    );
    cache.set(
        MetricKey::DelinquentValidatorCount,
        MetricValue::U64(stats.delinquent_validator_count),
        ttl,
    );
    debug!(
        active_stake = stats.active_stake,
        validator_count = stats.validator_count,
        delinquent_validator_count = stats.delinquent_validator_count;
        "network stats updated"
    );

    Ok(stats)
}

#[trace]
pub async fn run_inflation_rate_cycle(
    chain: &impl Chain,
    cache: &MetricsCache,
    retry_policy: RetryPolicy,
    ttl: Duration,
) -> anyhow::Result<f64> {
    let rate = retry(retry_policy, "get_inflation_rate", move || {
        chain.get_inflation_rate()
    })
    .await
    .context("get inflation rate")?;

    cache.set(MetricKey::InflationRate, MetricValue::F64(rate), ttl);
    debug!(rate; "inflation rate updated");

    Ok(rate)
}

#[trace]
pub async fn run_price_cycle(
    price_feed: &impl PriceFeed,
    cache: &MetricsCache,
    retry_policy: RetryPolicy,
    ttl: Duration,
) -> anyhow::Result<f64> {
    let price = retry(retry_policy, "get_price", move || price_feed.get_price())
        .await
        .context("get price")?;

    cache.set(MetricKey::Price, MetricValue::F64(price), ttl);
    debug!(price; "price updated");

    Ok(price)
}

#[trace]
pub async fn run_epoch_estimate_cycle(
    chain: &impl Chain,
    cache: &MetricsCache,
    wait: Duration,
    max_attempts: u32,
    ttl: Duration,
    cancel: &CancellationToken,
) -> anyhow::Result<NetworkEpochEstimate> {
    let estimate = sample_epoch_progress(chain, wait, max_attempts, cancel)
        .await
        .context("sample epoch progress")?;

    cache.set(
        MetricKey::EpochEstimate,
        MetricValue::EpochEstimate(estimate),
        ttl,
    );
    debug!(
        epoch = estimate.epoch,
        progress_percent = estimate.progress_percent,
        estimated_end:% = estimate.estimated_end;
        "epoch estimate updated"
    );

    Ok(estimate)
}

/// Measure the slot time and cache the rolling average over the recent measurements.
#[trace]
pub async fn run_slot_time_cycle(
    chain: &impl Chain,
    cache: &MetricsCache,
    slot_time: &Mutex<RollingSlotTime>,
    wait: Duration,
    max_attempts: u32,
    ttl: Duration,
    cancel: &CancellationToken,
) -> anyhow::Result<f64> {
    let measurement = calibrate_slot_time(chain, wait, max_attempts, cancel)
        .await
        .context("calibrate slot time")?;

    let slot_time_ms = {
        let mut slot_time = slot_time.lock();
        slot_time.push(measurement);
        slot_time.slot_time_ms()
    };

    cache.set(MetricKey::SlotTimeMs, MetricValue::F64(slot_time_ms), ttl);
    info!(measurement, slot_time_ms; "slot time updated");

    Ok(slot_time_ms)
}

/// Network APY from the inflation rewards of the last completed epoch.
#[trace]
pub async fn run_network_apy_cycle(
    chain: &impl Chain,
    cache: &MetricsCache,
    retry_policy: RetryPolicy,
    batch_size: usize,
    slots_per_epoch: u64,
    ttl: Duration,
) -> anyhow::Result<InflationRewardSample> {
    let epoch_info = retry(retry_policy, "get_epoch_info", move || chain.get_epoch_info())
        .await
        .context("get epoch info")?;
    let epoch = epoch_info
        .epoch
        .checked_sub(1)
        .ok_or_else(|| anyhow!("no completed epoch"))?;

    let sample = inflation_reward_apy(
        chain,
        RewardTarget::Network,
        epoch,
        batch_size,
        retry_policy,
        current_epochs_per_year(cache, slots_per_epoch),
    )
    .await
    .context("sample inflation rewards")?;

    cache.set(MetricKey::NetworkApy, MetricValue::F64(sample.apy), ttl);
    info!(
        epoch,
        accounts = sample.accounts,
        apy = sample.apy;
        "network APY updated"
    );

    Ok(sample)
}
