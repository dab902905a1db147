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

use crate::domain::{EpochInfo, InflationReward, PublicKey, StakeAccountPage, VoteAccounts};
use indexer_common::domain::Network;
use std::error::Error as StdError;
use thiserror::Error;

/// Read access to the chain.
#[trait_variant::make(Send)]
pub trait Chain
where
    Self: Clone + Send + Sync + 'static,
{
    /// Error type for chain access, expected to be transient.
    type Error: StdError + Send + Sync + 'static;

    /// Raw data of the account at the given address; `None` if there is no such account.
    async fn get_account_bytes(&self, address: &PublicKey)
    -> Result<Option<Vec<u8>>, Self::Error>;

    async fn get_epoch_info(&self) -> Result<EpochInfo, Self::Error>;

    /// Current total annual inflation rate as a fraction.
    async fn get_inflation_rate(&self) -> Result<f64, Self::Error>;

    async fn get_vote_accounts(&self) -> Result<VoteAccounts, Self::Error>;

    /// Addresses of the stake accounts in the given page.
    async fn get_stake_accounts(
        &self,
        page: StakeAccountPage,
    ) -> Result<Vec<PublicKey>, Self::Error>;

    /// Inflation rewards for the given stake accounts in the given epoch, in the same order as
    /// the addresses; `None` for accounts without a reward.
    async fn get_inflation_rewards(
        &self,
        addresses: &[PublicKey],
        epoch: u64,
    ) -> Result<Vec<Option<InflationReward>>, Self::Error>;
}

/// One [Chain] client per [Network]. Mainnet is always present, testnet is optional.
#[derive(Debug, Clone)]
pub struct Chains<C> {
    mainnet: C,
    testnet: Option<C>,
}

impl<C> Chains<C>
where
    C: Chain,
{
    pub fn new(mainnet: C, testnet: Option<C>) -> Self {
        Self { mainnet, testnet }
    }

    /// The client used for network-wide metrics.
    pub fn mainnet(&self) -> &C {
        &self.mainnet
    }

    pub fn get(&self, network: Network) -> Result<&C, NetworkNotConfigured> {
        match network {
            Network::Mainnet => Ok(&self.mainnet),
            Network::Testnet => self.testnet.as_ref().ok_or(NetworkNotConfigured(network)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no chain client configured for {0}")]
pub struct NetworkNotConfigured(pub Network);
