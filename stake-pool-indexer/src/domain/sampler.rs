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

//! Network timing estimates from two samples of the epoch/slot counters taken some time apart.

use crate::domain::{EpochInfo, chain::Chain};
use chrono::{DateTime, TimeDelta, Utc};
use indexer_common::error::BoxError;
use log::{debug, warn};
use std::{collections::VecDeque, time::Duration};
use thiserror::Error;
use tokio::{
    select,
    time::{Instant, sleep},
};
use tokio_util::sync::CancellationToken;

/// Slot time in milliseconds used until enough measurements exist.
pub const BOOTSTRAP_SLOT_TIME_MS: f64 = 550.0;

/// Number of most recent slot time measurements kept by [RollingSlotTime].
pub const SLOT_TIME_WINDOW: usize = 24;

/// Estimate of the current epoch's progress. Superseded by each new sample, never persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetworkEpochEstimate {
    pub epoch: u64,
    pub slots_in_epoch: u64,
    pub slot_index: u64,
    pub slots_per_second: f64,
    pub estimated_end: DateTime<Utc>,
    pub progress_percent: f64,
}

/// Two epoch infos from the same epoch and the time elapsed between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotSample {
    pub first: EpochInfo,
    pub second: EpochInfo,
    pub elapsed: Duration,
}

impl SlotSample {
    fn slots_advanced(&self) -> Result<u64, SampleError> {
        let slots = self.second.slot_index.saturating_sub(self.first.slot_index);
        if slots == 0 || self.elapsed.is_zero() {
            Err(SampleError::NoSlotProgress)
        } else {
            Ok(slots)
        }
    }
}

/// Take two epoch info samples `wait` apart. A pair spanning an epoch rollover is discarded and
/// re-sampled, up to `max_attempts` pairs in total.
pub async fn sample_pair<C>(
    chain: &C,
    wait: Duration,
    max_attempts: u32,
    cancel: &CancellationToken,
) -> Result<SlotSample, SampleError>
where
    C: Chain,
{
    let max_attempts = max_attempts.max(1);

    for attempt in 1..=max_attempts {
        let first = get_epoch_info(chain).await?;
        let start = Instant::now();

        select! {
            biased;

            _ = cancel.cancelled() => return Err(SampleError::Cancelled),
            _ = sleep(wait) => {}
        }

        let second = get_epoch_info(chain).await?;
        let elapsed = start.elapsed();

        if first.epoch == second.epoch {
            return Ok(SlotSample {
                first,
                second,
                elapsed,
            });
        }

        warn!(
            attempt,
            max_attempts,
            first_epoch = first.epoch,
            second_epoch = second.epoch;
            "epoch rolled over between samples"
        );
    }

    Err(SampleError::EpochRollover(max_attempts))
}

/// Sample the network and estimate the current epoch's progress and end.
pub async fn sample_epoch_progress<C>(
    chain: &C,
    wait: Duration,
    max_attempts: u32,
    cancel: &CancellationToken,
) -> Result<NetworkEpochEstimate, SampleError>
where
    C: Chain,
{
    let sample = sample_pair(chain, wait, max_attempts, cancel).await?;
    estimate(&sample, Utc::now())
}

/// Estimate epoch progress from a sample, relative to `now`, using the latest of the two infos.
pub fn estimate(
    sample: &SlotSample,
    now: DateTime<Utc>,
) -> Result<NetworkEpochEstimate, SampleError> {
    let slots = sample.slots_advanced()?;
    let slots_per_second = slots as f64 / sample.elapsed.as_secs_f64();

    let EpochInfo {
        epoch,
        slot_index,
        slots_in_epoch,
    } = sample.second;

    let remaining_secs = slots_in_epoch.saturating_sub(slot_index) as f64 / slots_per_second;
    let estimated_end = now + TimeDelta::milliseconds((remaining_secs * 1_000.0).round() as i64);
    let progress_percent = if slots_in_epoch == 0 {
        0.0
    } else {
        100.0 * slot_index as f64 / slots_in_epoch as f64
    };

    Ok(NetworkEpochEstimate {
        epoch,
        slots_in_epoch,
        slot_index,
        slots_per_second,
        estimated_end,
        progress_percent,
    })
}

/// Sample the network over a long wait and measure the time per slot in milliseconds.
pub async fn calibrate_slot_time<C>(
    chain: &C,
    wait: Duration,
    max_attempts: u32,
    cancel: &CancellationToken,
) -> Result<f64, SampleError>
where
    C: Chain,
{
    let sample = sample_pair(chain, wait, max_attempts, cancel).await?;
    let slots = sample.slots_advanced()?;
    let slot_time_ms = sample.elapsed.as_secs_f64() * 1_000.0 / slots as f64;
    debug!(slots, slot_time_ms; "calibrated slot time");

    Ok(slot_time_ms)
}

async fn get_epoch_info<C>(chain: &C) -> Result<EpochInfo, SampleError>
where
    C: Chain,
{
    chain
        .get_epoch_info()
        .await
        .map_err(|error| SampleError::Chain(error.into()))
}

/// Rolling average of the most recent slot time measurements. Few measurements are blended with
/// the bootstrap slot time to damp noise.
#[derive(Debug, Clone, Default)]
pub struct RollingSlotTime {
    measurements: VecDeque<f64>,
}

impl RollingSlotTime {
    /// Add a measurement in milliseconds; zero or invalid measurements are ignored.
    pub fn push(&mut self, slot_time_ms: f64) {
        if !slot_time_ms.is_finite() || slot_time_ms <= 0.0 {
            return;
        }

        if self.measurements.len() == SLOT_TIME_WINDOW {
            self.measurements.pop_front();
        }
        self.measurements.push_back(slot_time_ms);
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    pub fn slot_time_ms(&self) -> f64 {
        let n = self.measurements.len();
        let sum = self.measurements.iter().sum::<f64>();

        if n == 0 || sum == 0.0 {
            BOOTSTRAP_SLOT_TIME_MS
        } else if n < 3 {
            (sum + BOOTSTRAP_SLOT_TIME_MS) / (n + 1) as f64
        } else {
            sum / n as f64
        }
    }
}

/// Error possibly returned when sampling the network.
#[derive(Debug, Error)]
pub enum SampleError {
    #[error("epoch rolled over between samples in all {0} attempts")]
    EpochRollover(u32),

    #[error("no slot progress between samples")]
    NoSlotProgress,

    #[error("sampling cancelled")]
    Cancelled,

    #[error("cannot get epoch info")]
    Chain(#[source] BoxError),
}
