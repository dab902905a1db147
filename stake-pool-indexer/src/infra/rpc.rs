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

//! JSON-RPC based [Chain] implementation.

use crate::domain::{
    EpochInfo, InflationReward, PublicKey, RewardTarget, StakeAccountPage, VoteAccount,
    VoteAccounts,
    chain::{Chain, Chains},
};
use base64::{Engine, prelude::BASE64_STANDARD};
use fastrace::trace;
use log::debug;
use reqwest::Client as HttpClient;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use thiserror::Error;

/// Owner of all stake accounts.
const STAKE_PROGRAM: &str = "Stake11111111111111111111111111111111111111";
const STAKE_ACCOUNT_SIZE: u64 = 200;
/// `StakeStateV2::Stake` discriminator, a little-endian u32 at offset 0.
const STAKE_STATE_DELEGATED: [u8; 4] = [2, 0, 0, 0];
/// Offset of the delegation's voter pubkey within a stake account.
const DELEGATION_VOTER_OFFSET: usize = 124;

/// Config for the RPC connections, one endpoint per network; URLs may contain an API key.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(rename = "mainnet")]
    pub mainnet_url: SecretString,

    #[serde(rename = "testnet", default)]
    pub testnet_url: Option<SecretString>,

    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    #[serde(default)]
    pub commitment: Commitment,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    #[default]
    Confirmed,
    Finalized,
}

/// A [Chain] implementation talking JSON-RPC over HTTP.
#[derive(Debug, Clone)]
pub struct RpcChain {
    http: HttpClient,
    url: SecretString,
    commitment: Commitment,
    request_id: Arc<AtomicU64>,
}

/// Create the [RpcChain]s for all networks configured in the given [Config].
pub fn chains(config: Config) -> Result<Chains<RpcChain>, RpcError> {
    let Config {
        mainnet_url,
        testnet_url,
        timeout,
        commitment,
    } = config;

    let mainnet = RpcChain::new(mainnet_url, timeout, commitment)?;
    let testnet = testnet_url
        .map(|url| RpcChain::new(url, timeout, commitment))
        .transpose()?;

    Ok(Chains::new(mainnet, testnet))
}

impl RpcChain {
    pub fn new(
        url: SecretString,
        timeout: Duration,
        commitment: Commitment,
    ) -> Result<Self, RpcError> {
        let http = HttpClient::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(RpcError::Client)?;

        Ok(Self {
            http,
            url,
            commitment,
            request_id: Default::default(),
        })
    }

    async fn call<T>(&self, method: &'static str, params: Value) -> Result<T, RpcError>
    where
        T: DeserializeOwned,
    {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params
        });
        debug!(method, id; "calling RPC method");

        let response = self
            .http
            .post(self.url.expose_secret())
            .json(&request)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|error| RpcError::Http(method, error))?
            .json::<RpcResponse<T>>()
            .await
            .map_err(|error| RpcError::Http(method, error))?;

        response.into_result(method)
    }

    fn config(&self) -> Value {
        json!({ "commitment": self.commitment })
    }
}

impl Chain for RpcChain {
    type Error = RpcError;

    #[trace(properties = { "address": "{address}" })]
    async fn get_account_bytes(
        &self,
        address: &PublicKey,
    ) -> Result<Option<Vec<u8>>, Self::Error> {
        let params = json!([
            address.to_string(),
            { "encoding": "base64", "commitment": self.commitment }
        ]);

        self.call::<WithContext<Option<AccountInfo>>>("getAccountInfo", params)
            .await?
            .value
            .map(AccountInfo::into_bytes)
            .transpose()
    }

    async fn get_epoch_info(&self) -> Result<EpochInfo, Self::Error> {
        self.call::<RpcEpochInfo>("getEpochInfo", json!([self.config()]))
            .await
            .map(Into::into)
    }

    async fn get_inflation_rate(&self) -> Result<f64, Self::Error> {
        self.call::<RpcInflationRate>("getInflationRate", json!([]))
            .await
            .map(|rate| rate.total)
    }

    #[trace]
    async fn get_vote_accounts(&self) -> Result<VoteAccounts, Self::Error> {
        self.call::<RpcVoteAccounts>("getVoteAccounts", json!([self.config()]))
            .await
            .map(Into::into)
    }

    #[trace]
    async fn get_stake_accounts(
        &self,
        page: StakeAccountPage,
    ) -> Result<Vec<PublicKey>, Self::Error> {
        let params = json!([
            STAKE_PROGRAM,
            {
                "commitment": self.commitment,
                "encoding": "base64",
                "dataSlice": { "offset": 0, "length": 0 },
                "filters": stake_account_filters(page)
            }
        ]);

        let accounts = self
            .call::<Vec<ProgramAccount>>("getProgramAccounts", params)
            .await?
            .into_iter()
            .map(|account| account.pubkey)
            .collect::<Vec<_>>();
        debug!(
            reward_target:? = page.target,
            voter_prefix:? = page.voter_prefix,
            accounts = accounts.len();
            "got stake accounts"
        );

        Ok(accounts)
    }

    #[trace(properties = { "epoch": "{epoch}" })]
    async fn get_inflation_rewards(
        &self,
        addresses: &[PublicKey],
        epoch: u64,
    ) -> Result<Vec<Option<InflationReward>>, Self::Error> {
        let addresses_param = addresses
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        let params = json!([
            addresses_param,
            { "epoch": epoch, "commitment": self.commitment }
        ]);

        let rewards = self
            .call::<Vec<Option<RpcInflationReward>>>("getInflationReward", params)
            .await?;
        if rewards.len() != addresses.len() {
            return Err(RpcError::RewardCount {
                expected: addresses.len(),
                actual: rewards.len(),
            });
        }

        Ok(rewards
            .into_iter()
            .map(|reward| reward.map(Into::into))
            .collect())
    }
}

/// Delegated stake accounts, optionally only those delegated to the given vote account and only
/// those whose vote account starts with the page's prefix byte.
fn stake_account_filters(page: StakeAccountPage) -> Value {
    let mut filters = vec![
        json!({ "dataSize": STAKE_ACCOUNT_SIZE }),
        json!({
            "memcmp": {
                "offset": 0,
                "bytes": bs58::encode(STAKE_STATE_DELEGATED).into_string()
            }
        }),
    ];

    if let RewardTarget::Validator(vote_account) = page.target {
        filters.push(json!({
            "memcmp": {
                "offset": DELEGATION_VOTER_OFFSET,
                "bytes": vote_account.to_string()
            }
        }));
    }

    if let Some(prefix) = page.voter_prefix {
        filters.push(json!({
            "memcmp": {
                "offset": DELEGATION_VOTER_OFFSET,
                "bytes": bs58::encode([prefix]).into_string()
            }
        }));
    }

    Value::Array(filters)
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

impl<T> RpcResponse<T> {
    fn into_result(self, method: &'static str) -> Result<T, RpcError> {
        match (self.result, self.error) {
            (_, Some(RpcErrorObject { code, message })) => Err(RpcError::Rpc {
                method,
                code,
                message,
            }),
            (Some(result), None) => Ok(result),
            (None, None) => Err(RpcError::MissingResult(method)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct AccountInfo {
    /// Data and its encoding.
    data: (String, String),
}

impl AccountInfo {
    fn into_bytes(self) -> Result<Vec<u8>, RpcError> {
        let (data, encoding) = self.data;
        if encoding != "base64" {
            return Err(RpcError::Encoding(encoding));
        }

        Ok(BASE64_STANDARD.decode(data)?)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcEpochInfo {
    epoch: u64,
    slot_index: u64,
    slots_in_epoch: u64,
}

impl From<RpcEpochInfo> for EpochInfo {
    fn from(info: RpcEpochInfo) -> Self {
        Self {
            epoch: info.epoch,
            slot_index: info.slot_index,
            slots_in_epoch: info.slots_in_epoch,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RpcInflationRate {
    total: f64,
}

#[derive(Debug, Deserialize)]
struct RpcVoteAccounts {
    current: Vec<RpcVoteAccount>,
    delinquent: Vec<RpcVoteAccount>,
}

impl From<RpcVoteAccounts> for VoteAccounts {
    fn from(accounts: RpcVoteAccounts) -> Self {
        let convert = |accounts: Vec<RpcVoteAccount>| {
            accounts
                .into_iter()
                .map(|account| VoteAccount {
                    vote_pubkey: account.vote_pubkey,
                    node_pubkey: account.node_pubkey,
                    activated_stake: account.activated_stake,
                    commission: account.commission,
                })
                .collect()
        };

        Self {
            current: convert(accounts.current),
            delinquent: convert(accounts.delinquent),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcVoteAccount {
    vote_pubkey: PublicKey,
    node_pubkey: PublicKey,
    activated_stake: u64,
    commission: u8,
}

#[derive(Debug, Deserialize)]
struct ProgramAccount {
    pubkey: PublicKey,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcInflationReward {
    epoch: u64,
    effective_slot: u64,
    amount: u64,
    post_balance: u64,
    commission: Option<u8>,
}

impl From<RpcInflationReward> for InflationReward {
    fn from(reward: RpcInflationReward) -> Self {
        Self {
            epoch: reward.epoch,
            effective_slot: reward.effective_slot,
            amount: reward.amount,
            post_balance: reward.post_balance,
            commission: reward.commission,
        }
    }
}

/// Error possibly returned by [RpcChain].
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("cannot create HTTP client")]
    Client(#[source] reqwest::Error),

    #[error("cannot make RPC call {0}")]
    Http(&'static str, #[source] reqwest::Error),

    #[error("RPC call {method} failed with code {code}: {message}")]
    Rpc {
        method: &'static str,
        code: i64,
        message: String,
    },

    #[error("RPC call {0} returned neither result nor error")]
    MissingResult(&'static str),

    #[error("unsupported account data encoding {0}")]
    Encoding(String),

    #[error("cannot decode base64 account data")]
    Base64(#[from] base64::DecodeError),

    #[error("expected {expected} inflation rewards, got {actual}")]
    RewardCount { expected: usize, actual: usize },
}
