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

use crate::{
    application::metrics::Metrics,
    domain::{
        PoolDescriptor, PoolSnapshot, ValidatorStakeRecord,
        apy::epoch_over_epoch_apy,
        PublicKey,
        chain::{Chain, Chains},
        decoder::ValidatorStake,
        registry,
        retry::{RetryPolicy, retry},
        storage::Storage,
    },
};
use anyhow::{Context, anyhow};
use chrono::Utc;
use fastrace::trace;
use log::{debug, info, warn};
use std::time::Duration;
use tokio::time::Instant;

/// Outcome of one pool snapshot cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub duration: Duration,
}

/// Take a snapshot of every active pool, reading each one from the chain of its network. A
/// failing pool is logged and counted but does not abort the cycle; only failing to list the
/// pools does.
#[trace]
pub async fn run_pool_snapshot_cycle<C>(
    chains: &Chains<C>,
    storage: &impl Storage,
    retry_policy: RetryPolicy,
    epochs_per_year: f64,
    metrics: &Metrics,
) -> anyhow::Result<CycleSummary>
where
    C: Chain,
{
    let start = Instant::now();

    let pools = storage
        .list_active_pools()
        .await
        .context("list active pools")?;

    let mut succeeded = 0;
    let mut failed = 0;

    for pool in &pools {
        let result = match chains.get(pool.network) {
            Ok(chain) => update_pool(chain, storage, pool, retry_policy, epochs_per_year).await,
            Err(error) => Err(error.into()),
        };

        match result {
            Ok(snapshot_id) => {
                succeeded += 1;
                debug!(pool:% = pool.name, snapshot_id; "pool snapshot saved");
            }

            Err(error) => {
                failed += 1;
                warn!(
                    pool:% = pool.name,
                    address:% = pool.address,
                    network:% = pool.network,
                    variant:% = pool.variant,
                    error:% = format!("{error:#}");
                    "cannot update pool"
                );
            }
        }
    }

    let summary = CycleSummary {
        succeeded,
        failed,
        duration: start.elapsed(),
    };
    metrics.record_pool_cycle(&summary);
    info!(
        succeeded,
        failed,
        duration:? = summary.duration;
        "pool snapshot cycle completed"
    );

    Ok(summary)
}

async fn update_pool(
    chain: &impl Chain,
    storage: &impl Storage,
    pool: &PoolDescriptor,
    retry_policy: RetryPolicy,
    epochs_per_year: f64,
) -> anyhow::Result<i64> {
    let variant = registry::resolve(&pool.variant)?;

    let pool_bytes = get_account(chain, &pool.address, retry_policy)
        .await
        .context("get pool account")?;

    let list_address = variant
        .validator_list_address(&pool_bytes)
        .context("decode validator list address")?;
    let list_bytes = get_account(chain, &list_address, retry_policy)
        .await
        .with_context(|| format!("get validator list account {list_address}"))?;

    let decoded = variant
        .decode(&pool_bytes, &list_bytes)
        .context("decode pool")?;

    let prior = prior_snapshot(storage, pool.id, decoded.epoch).await?;
    let apy = epoch_over_epoch_apy(
        (&decoded).into(),
        prior.as_ref().map(Into::into),
        epochs_per_year,
    );

    let records = validator_stake_records(storage, &decoded.validators).await?;

    let snapshot = PoolSnapshot {
        pool_id: pool.id,
        epoch: decoded.epoch,
        total_stake: decoded.total_stake,
        pool_token_supply: decoded.pool_token_supply,
        total_lamports: decoded.total_lamports,
        unstake_liquidity: decoded.unstake_liquidity,
        deposit_fee: decoded.deposit_fee,
        withdrawal_fee: decoded.withdrawal_fee,
        rewards_fee: decoded.rewards_fee,
        apy,
        created_at: Utc::now(),
    };

    storage
        .save_snapshot(&snapshot, &records)
        .await
        .context("save snapshot")
}

/// Account data, retrying transient failures only; a missing account is not retried.
async fn get_account(
    chain: &impl Chain,
    address: &PublicKey,
    retry_policy: RetryPolicy,
) -> anyhow::Result<Vec<u8>> {
    retry(retry_policy, "get_account_bytes", move || {
        chain.get_account_bytes(address)
    })
    .await?
    .ok_or_else(|| anyhow!("account {address} not found"))
}

/// The snapshot to compare against: the latest one if it is from an earlier epoch, otherwise the
/// latest one from any earlier epoch.
async fn prior_snapshot(
    storage: &impl Storage,
    pool_id: i64,
    epoch: u64,
) -> anyhow::Result<Option<PoolSnapshot>> {
    let latest = storage
        .get_latest_snapshot(pool_id)
        .await
        .context("get latest snapshot")?;

    match latest {
        Some(latest) if latest.epoch < epoch => Ok(Some(latest)),
        Some(_) => storage
            .get_latest_snapshot_before(pool_id, epoch)
            .await
            .context("get latest snapshot before epoch"),
        None => Ok(None),
    }
}

/// Stake records for validators in the directory; unknown validators are dropped.
async fn validator_stake_records(
    storage: &impl Storage,
    validators: &[ValidatorStake],
) -> anyhow::Result<Vec<ValidatorStakeRecord>> {
    let mut records = Vec::with_capacity(validators.len());

    for validator in validators {
        let validator_id = storage
            .resolve_validator_id(&validator.vote_account)
            .await
            .context("resolve validator id")?;

        match validator_id {
            Some(validator_id) => records.push(ValidatorStakeRecord {
                validator_id,
                vote_account: validator.vote_account,
                active_stake: validator.active_stake,
            }),

            None => debug!(
                vote_account:% = validator.vote_account;
                "unknown validator, dropping stake record"
            ),
        }
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use crate::{
        application::{metrics::Metrics, pool_snapshots::run_pool_snapshot_cycle},
        domain::{
            PoolDescriptor, PoolSnapshot, PublicKey, ValidatorStakeRecord,
            chain::{Chains, mock::MockChain},
            decoder::{lido, spl},
            retry::RetryPolicy,
            storage::mock::MockStorage,
        },
    };
    use chrono::{TimeDelta, Utc};
    use indexer_common::domain::Network;
    use std::time::Duration;

    const EPOCHS_PER_YEAR: f64 = 182.5;

    fn retry_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            delay: Duration::from_millis(10),
        }
    }

    fn pool(id: i64, variant: &str) -> PoolDescriptor {
        PoolDescriptor {
            id,
            name: format!("pool-{id}"),
            address: PublicKey([id as u8; 32]),
            network: Network::Mainnet,
            variant: variant.to_owned(),
            active: true,
        }
    }

    /// Register an SPL pool whose accounts live in the given chain.
    fn add_spl_pool(
        chain: &MockChain,
        storage: &MockStorage,
        id: i64,
        fixture: &spl::fixtures::Fixture,
    ) {
        let pool = pool(id, "spl");
        chain.set_account(pool.address, fixture.pool_bytes());
        chain.set_account(fixture.validator_list, fixture.list_bytes());
        storage.add_pool(pool);
    }

    fn spl_fixture(
        id: i64,
        epoch: u64,
        total_lamports: u64,
        supply: u64,
    ) -> spl::fixtures::Fixture {
        let mut fixture = spl::fixtures::Fixture::sample(epoch, total_lamports, supply);
        fixture.validator_list = PublicKey([0x80 + id as u8; 32]);
        fixture
    }

    fn snapshot(pool_id: i64, epoch: u64, total_lamports: u64, supply: u64) -> PoolSnapshot {
        PoolSnapshot {
            pool_id,
            epoch,
            total_stake: total_lamports,
            pool_token_supply: supply,
            total_lamports,
            unstake_liquidity: 0,
            deposit_fee: 0.0,
            withdrawal_fee: 0.0,
            rewards_fee: 0.0,
            apy: 0.0,
            created_at: Utc::now() - TimeDelta::days(2),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_pools_are_isolated() {
        let chain = MockChain::default();
        let storage = MockStorage::default();

        for id in 1..=3 {
            add_spl_pool(&chain, &storage, id, &spl_fixture(id, 600, 10_000, 9_000));
        }

        // Truncated pool account.
        let broken = spl_fixture(4, 600, 10_000, 9_000);
        let pool_4 = pool(4, "spl");
        chain.set_account(pool_4.address, broken.pool_bytes()[..100].to_vec());
        storage.add_pool(pool_4);

        // Unsupported variant.
        storage.add_pool(pool(5, "stake-o-matic"));

        // Inactive pools are ignored.
        let mut inactive = pool(6, "spl");
        inactive.active = false;
        storage.add_pool(inactive);

        let summary = run_pool_snapshot_cycle(
            &Chains::new(chain.clone(), None),
            &storage,
            retry_policy(2),
            EPOCHS_PER_YEAR,
            &Metrics::default(),
        )
        .await
        .expect("cycle completes");

        assert_eq!(summary.succeeded, 3);
        assert_eq!(summary.failed, 2);

        for id in 1..=3 {
            let snapshots = storage.snapshots(id);
            assert_eq!(snapshots.len(), 1);

            let (snapshot, _) = &snapshots[0];
            assert_eq!(snapshot.epoch, 600);
            assert_eq!(snapshot.total_stake, 800);
            assert_eq!(snapshot.unstake_liquidity, 9_200);
            assert_eq!(snapshot.apy, 0.0);
        }
        for id in 4..=6 {
            assert!(storage.snapshots(id).is_empty());
        }

        // Only pools with a supported variant are fetched; decode failures are not retried.
        let requests = chain.account_requests();
        assert_eq!(
            requests.iter().filter(|a| **a == PublicKey([4; 32])).count(),
            1
        );
        assert!(!requests.contains(&PublicKey([5; 32])));
        assert!(!requests.contains(&PublicKey([6; 32])));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_save() {
        let chain = MockChain::default();
        let storage = MockStorage::default();

        add_spl_pool(&chain, &storage, 1, &spl_fixture(1, 600, 10_000, 9_000));
        add_spl_pool(&chain, &storage, 2, &spl_fixture(2, 600, 10_000, 9_000));
        storage.fail_saves(2);

        let summary = run_pool_snapshot_cycle(
            &Chains::new(chain.clone(), None),
            &storage,
            retry_policy(1),
            EPOCHS_PER_YEAR,
            &Metrics::default(),
        )
        .await
        .expect("cycle completes");

        assert_eq!((summary.succeeded, summary.failed), (1, 1));
        assert_eq!(storage.snapshots(1).len(), 1);
        assert!(storage.snapshots(2).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_fetch_failure_is_retried() {
        let chain = MockChain::default();
        let storage = MockStorage::default();

        let fixture = spl_fixture(1, 600, 10_000, 9_000);
        add_spl_pool(&chain, &storage, 1, &fixture);
        chain.fail_account(PublicKey([1; 32]), 2);
        chain.fail_account(fixture.validator_list, 1);

        let summary = run_pool_snapshot_cycle(
            &Chains::new(chain.clone(), None),
            &storage,
            retry_policy(3),
            EPOCHS_PER_YEAR,
            &Metrics::default(),
        )
        .await
        .expect("cycle completes");

        assert_eq!((summary.succeeded, summary.failed), (1, 0));
        assert_eq!(chain.account_requests().len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_validators_are_dropped() {
        let chain = MockChain::default();
        let storage = MockStorage::default();

        let fixture = lido::fixtures::Fixture::sample();
        let pool = pool(7, "lido");
        chain.set_account(pool.address, fixture.pool_bytes());
        chain.set_account(fixture.validator_list, fixture.list_bytes());
        storage.add_pool(pool);
        storage.add_validator(PublicKey([9; 32]), 42);

        run_pool_snapshot_cycle(
            &Chains::new(chain.clone(), None),
            &storage,
            retry_policy(1),
            EPOCHS_PER_YEAR,
            &Metrics::default(),
        )
        .await
        .expect("cycle completes");

        let snapshots = storage.snapshots(7);
        assert_eq!(snapshots.len(), 1);

        let (snapshot, records) = &snapshots[0];
        assert_eq!(snapshot.total_stake, 73_000);
        assert_eq!(
            records,
            &vec![ValidatorStakeRecord {
                validator_id: 42,
                vote_account: PublicKey([9; 32]),
                active_stake: 33_000,
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_apy_from_prior_snapshot() {
        let chain = MockChain::default();
        let storage = MockStorage::default();

        add_spl_pool(&chain, &storage, 1, &spl_fixture(1, 612, 9_090, 9_000));
        storage.add_snapshot(snapshot(1, 610, 8_000, 8_000));
        storage.add_snapshot(snapshot(1, 611, 9_000, 9_000));

        run_pool_snapshot_cycle(
            &Chains::new(chain.clone(), None),
            &storage,
            retry_policy(1),
            EPOCHS_PER_YEAR,
            &Metrics::default(),
        )
        .await
        .expect("cycle completes");

        let snapshots = storage.snapshots(1);
        let (snapshot, _) = snapshots.last().expect("snapshot saved");
        assert_eq!(snapshot.epoch, 612);
        let expected = (9_090.0 / 9_000.0 - 1.0) * EPOCHS_PER_YEAR;
        assert!((snapshot.apy - expected).abs() < 1e-9);

        // A second cycle in the same epoch compares against epoch 611, not the new snapshot.
        run_pool_snapshot_cycle(
            &Chains::new(chain.clone(), None),
            &storage,
            retry_policy(1),
            EPOCHS_PER_YEAR,
            &Metrics::default(),
        )
        .await
        .expect("cycle completes");

        let snapshots = storage.snapshots(1);
        assert_eq!(snapshots.len(), 4);
        let (snapshot, _) = snapshots.last().expect("snapshot saved");
        assert!((snapshot.apy - expected).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_account_is_not_retried() {
        let chain = MockChain::default();
        let storage = MockStorage::default();
        storage.add_pool(pool(1, "spl"));

        let summary = run_pool_snapshot_cycle(
            &Chains::new(chain.clone(), None),
            &storage,
            retry_policy(3),
            EPOCHS_PER_YEAR,
            &Metrics::default(),
        )
        .await
        .expect("cycle completes");

        assert_eq!((summary.succeeded, summary.failed), (0, 1));
        assert_eq!(chain.account_requests(), vec![PublicKey([1; 32])]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pools_are_read_from_their_network() {
        let mainnet = MockChain::default();
        let testnet = MockChain::default();
        let storage = MockStorage::default();

        // The mainnet chain has an account at the testnet pool's address too.
        let fixture = spl_fixture(1, 600, 10_000, 9_000);
        for chain in [&mainnet, &testnet] {
            chain.set_account(PublicKey([1; 32]), fixture.pool_bytes());
            chain.set_account(fixture.validator_list, fixture.list_bytes());
        }
        let mut testnet_pool = pool(1, "spl");
        testnet_pool.network = Network::Testnet;
        storage.add_pool(testnet_pool);

        let summary = run_pool_snapshot_cycle(
            &Chains::new(mainnet.clone(), Some(testnet.clone())),
            &storage,
            retry_policy(1),
            EPOCHS_PER_YEAR,
            &Metrics::default(),
        )
        .await
        .expect("cycle completes");

        assert_eq!((summary.succeeded, summary.failed), (1, 0));
        assert!(mainnet.account_requests().is_empty());
        assert_eq!(
            testnet.account_requests(),
            vec![PublicKey([1; 32]), fixture.validator_list]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_without_chain_for_its_network_fails() {
        let chain = MockChain::default();
        let storage = MockStorage::default();

        let fixture = spl_fixture(1, 600, 10_000, 9_000);
        chain.set_account(PublicKey([1; 32]), fixture.pool_bytes());
        chain.set_account(fixture.validator_list, fixture.list_bytes());
        let mut testnet_pool = pool(1, "spl");
        testnet_pool.network = Network::Testnet;
        storage.add_pool(testnet_pool);

        let summary = run_pool_snapshot_cycle(
            &Chains::new(chain.clone(), None),
            &storage,
            retry_policy(1),
            EPOCHS_PER_YEAR,
            &Metrics::default(),
        )
        .await
        .expect("cycle completes");

        assert_eq!((summary.succeeded, summary.failed), (0, 1));
        assert!(chain.account_requests().is_empty());
        assert!(storage.snapshots(1).is_empty());
    }
}
