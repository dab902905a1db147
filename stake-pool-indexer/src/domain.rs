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

pub mod apy;
pub mod cache;
pub mod chain;
pub mod codec;
pub mod decoder;
pub mod price;
pub mod registry;
pub mod retry;
pub mod sampler;
pub mod storage;

mod public_key;

pub use public_key::*;

use chrono::{DateTime, Utc};
use indexer_common::domain::Network;

/// Static identity of a pool, read from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolDescriptor {
    pub id: i64,
    pub name: String,
    pub address: PublicKey,
    pub network: Network,
    /// Protocol variant tag as stored, resolved via [registry::resolve].
    pub variant: String,
    pub active: bool,
}

/// One ingestion result for a pool. Amounts are in lamports.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolSnapshot {
    pub pool_id: i64,
    pub epoch: u64,
    pub total_stake: u64,
    pub pool_token_supply: u64,
    pub total_lamports: u64,
    pub unstake_liquidity: u64,
    pub deposit_fee: f64,
    pub withdrawal_fee: f64,
    pub rewards_fee: f64,
    pub apy: f64,
    pub created_at: DateTime<Utc>,
}

impl PoolSnapshot {
    /// Lamports per pool token; `None` for an empty pool.
    pub fn token_value(&self) -> Option<f64> {
        (self.pool_token_supply != 0)
            .then(|| self.total_lamports as f64 / self.pool_token_supply as f64)
    }
}

/// Stake delegated by a pool to a known validator within one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorStakeRecord {
    pub validator_id: i64,
    pub vote_account: PublicKey,
    pub active_stake: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochInfo {
    pub epoch: u64,
    pub slot_index: u64,
    pub slots_in_epoch: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoteAccounts {
    pub current: Vec<VoteAccount>,
    pub delinquent: Vec<VoteAccount>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteAccount {
    pub vote_pubkey: PublicKey,
    pub node_pubkey: PublicKey,
    pub activated_stake: u64,
    pub commission: u8,
}

/// Network-wide validator participation derived from [VoteAccounts].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkStats {
    pub active_stake: u64,
    pub validator_count: u64,
    pub delinquent_validator_count: u64,
}

impl From<&VoteAccounts> for NetworkStats {
    fn from(vote_accounts: &VoteAccounts) -> Self {
        let stake = |accounts: &[VoteAccount]| {
            accounts
                .iter()
                .map(|account| account.activated_stake)
                .fold(0u64, u64::saturating_add)
        };

        Self {
            active_stake: stake(&vote_accounts.current)
                .saturating_add(stake(&vote_accounts.delinquent)),
            validator_count: vote_accounts.current.len() as u64,
            delinquent_validator_count: vote_accounts.delinquent.len() as u64,
        }
    }
}

/// Reward credited to one stake account for one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InflationReward {
    pub epoch: u64,
    pub effective_slot: u64,
    pub amount: u64,
    pub post_balance: u64,
    pub commission: Option<u8>,
}

/// Whose stake accounts to sample for the inflation-reward APY.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewardTarget {
    /// All delegated stake accounts on the network.
    Network,

    /// Stake accounts delegated to the given vote account.
    Validator(PublicKey),
}

impl RewardTarget {
    /// The pages enumerating the stake accounts of this target. Network-wide enumeration is
    /// partitioned by the first byte of the delegation's vote account, a validator target is a
    /// single page.
    pub fn stake_account_pages(self) -> Vec<StakeAccountPage> {
        match self {
            Self::Network => (0..=u8::MAX)
                .map(|prefix| StakeAccountPage {
                    target: self,
                    voter_prefix: Some(prefix),
                })
                .collect(),

            Self::Validator(_) => vec![StakeAccountPage {
                target: self,
                voter_prefix: None,
            }],
        }
    }
}

/// A subset of the stake accounts of a [RewardTarget]: if set, only those delegated to a vote
/// account starting with `voter_prefix`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StakeAccountPage {
    pub target: RewardTarget,
    pub voter_prefix: Option<u8>,
}
