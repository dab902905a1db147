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

//! Annualized yield estimation.
//!
//! Two independent methods: the epoch-over-epoch change of a pool's token value, and the
//! inflation rewards paid to a sample of stake accounts.

use crate::domain::{
    InflationReward, PoolSnapshot, PublicKey, RewardTarget,
    chain::Chain,
    decoder::DecodedPool,
    retry::{RetryPolicy, retry},
};
use fastrace::trace;
use indexer_common::error::BoxError;
use log::debug;
use thiserror::Error;

pub const DEFAULT_SLOTS_PER_EPOCH: u64 = 432_000;
pub const DEFAULT_SLOT_TIME_MS: f64 = 550.0;

/// Maximum number of addresses per inflation reward request.
pub const MAX_REWARD_BATCH_SIZE: usize = 500;

const SECONDS_PER_YEAR: f64 = 365.0 * 24.0 * 60.0 * 60.0;

/// Number of epochs per year for the given epoch length and slot time; 0 if undefined.
pub fn epochs_per_year(slots_per_epoch: u64, slot_time_ms: f64) -> f64 {
    let epoch_secs = slots_per_epoch as f64 * slot_time_ms / 1_000.0;
    if epoch_secs.is_finite() && epoch_secs > 0.0 {
        SECONDS_PER_YEAR / epoch_secs
    } else {
        0.0
    }
}

/// The inputs of a pool's token value at some epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenValueSample {
    pub epoch: u64,
    pub total_lamports: u64,
    pub pool_token_supply: u64,
}

impl TokenValueSample {
    fn token_value(&self) -> Option<f64> {
        (self.pool_token_supply != 0)
            .then(|| self.total_lamports as f64 / self.pool_token_supply as f64)
    }
}

impl From<&PoolSnapshot> for TokenValueSample {
    fn from(snapshot: &PoolSnapshot) -> Self {
        Self {
            epoch: snapshot.epoch,
            total_lamports: snapshot.total_lamports,
            pool_token_supply: snapshot.pool_token_supply,
        }
    }
}

impl From<&DecodedPool> for TokenValueSample {
    fn from(pool: &DecodedPool) -> Self {
        Self {
            epoch: pool.epoch,
            total_lamports: pool.total_lamports,
            pool_token_supply: pool.pool_token_supply,
        }
    }
}

/// APY from the change of the token value since a prior sample from a strictly earlier epoch,
/// scaled to one epoch and annualized linearly. 0 without a prior sample, for an empty pool on
/// either side, or if no epochs have elapsed.
pub fn epoch_over_epoch_apy(
    current: TokenValueSample,
    prior: Option<TokenValueSample>,
    epochs_per_year: f64,
) -> f64 {
    let Some(prior) = prior else {
        return 0.0;
    };
    if current.epoch <= prior.epoch {
        return 0.0;
    }
    let (Some(current_value), Some(prior_value)) = (current.token_value(), prior.token_value())
    else {
        return 0.0;
    };
    if prior_value == 0.0 {
        return 0.0;
    }

    let epochs_elapsed = (current.epoch - prior.epoch) as f64;
    let apy = (current_value / prior_value - 1.0) / epochs_elapsed * epochs_per_year;
    if apy.is_finite() { apy } else { 0.0 }
}

/// Result of sampling inflation rewards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InflationRewardSample {
    pub epoch: u64,
    pub accounts: usize,
    pub batches: usize,
    pub total_reward: u128,
    pub total_post_balance: u128,
    pub rate: f64,
    pub apy: f64,
}

/// APY from the inflation rewards paid in `epoch` to all stake accounts of the given target.
/// Stake accounts are enumerated page by page; reward lookups are issued in batches of at most
/// [MAX_REWARD_BATCH_SIZE] addresses. Every page and batch is retried with the given policy.
#[trace]
pub async fn inflation_reward_apy<C>(
    chain: &C,
    target: RewardTarget,
    epoch: u64,
    batch_size: usize,
    retry_policy: RetryPolicy,
    epochs_per_year: f64,
) -> Result<InflationRewardSample, ApyError>
where
    C: Chain,
{
    let batch_size = batch_size.clamp(1, MAX_REWARD_BATCH_SIZE);

    let mut addresses = Vec::new();
    for page in target.stake_account_pages() {
        let page_addresses = retry(retry_policy, "get_stake_accounts", move || {
            chain.get_stake_accounts(page)
        })
        .await
        .map_err(|error| ApyError::StakeAccounts(page.voter_prefix, error.into()))?;
        addresses.extend(page_addresses);
    }

    let mut total_reward = 0u128;
    let mut total_post_balance = 0u128;
    let mut batches = 0;

    for (index, batch) in addresses.chunks(batch_size).enumerate() {
        let rewards = get_inflation_rewards(chain, batch, epoch, retry_policy)
            .await
            .map_err(|error| ApyError::InflationRewards(index, error))?;
        batches += 1;

        for reward in rewards.into_iter().flatten() {
            total_reward += u128::from(reward.amount);
            total_post_balance += u128::from(reward.post_balance);
        }
    }

    let rate = reward_rate(total_reward, total_post_balance);
    let apy = compound_apy(rate, epochs_per_year);
    debug!(
        epoch,
        accounts = addresses.len(),
        batches,
        rate,
        apy;
        "sampled inflation rewards"
    );

    Ok(InflationRewardSample {
        epoch,
        accounts: addresses.len(),
        batches,
        total_reward,
        total_post_balance,
        rate,
        apy,
    })
}

async fn get_inflation_rewards<C>(
    chain: &C,
    addresses: &[PublicKey],
    epoch: u64,
    retry_policy: RetryPolicy,
) -> Result<Vec<Option<InflationReward>>, BoxError>
where
    C: Chain,
{
    retry(retry_policy, "get_inflation_rewards", move || {
        chain.get_inflation_rewards(addresses, epoch)
    })
    .await
    .map_err(Into::into)
}

/// Per-epoch reward rate relative to the balance before the reward; 0 if undefined.
pub fn reward_rate(reward: u128, post_balance: u128) -> f64 {
    if reward == 0 || post_balance <= reward {
        0.0
    } else {
        reward as f64 / (post_balance - reward) as f64
    }
}

/// Compound a per-epoch rate over a year; 0 for a non-positive or undefined result.
pub fn compound_apy(rate: f64, epochs_per_year: f64) -> f64 {
    if rate <= 0.0 || epochs_per_year <= 0.0 {
        return 0.0;
    }

    let apy = (1.0 + rate).powf(epochs_per_year) - 1.0;
    if apy.is_finite() { apy } else { 0.0 }
}

/// Error possibly returned by [inflation_reward_apy].
#[derive(Debug, Error)]
pub enum ApyError {
    #[error("cannot get stake accounts for voter prefix {0:?}")]
    StakeAccounts(Option<u8>, #[source] BoxError),

    #[error("cannot get inflation rewards for batch {0}")]
    InflationRewards(usize, #[source] BoxError),
}
