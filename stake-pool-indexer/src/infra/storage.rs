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

use crate::domain::{self, PoolDescriptor, PoolSnapshot, PublicKey, ValidatorStakeRecord};
use chrono::{DateTime, Utc};
use fastrace::trace;
use futures::TryFutureExt;
use indexer_common::{domain::Network, infra::pool::postgres::PostgresPool};
use indoc::indoc;
use sqlx::QueryBuilder;
use std::{error::Error as StdError, str::FromStr};

type SqlxTransaction = sqlx::Transaction<'static, sqlx::Postgres>;

type SnapshotRow = (i64, i64, i64, i64, i64, i64, f64, f64, f64, f64, DateTime<Utc>);

const SNAPSHOT_COLUMNS: &str = indoc! {"
    SELECT
        pool_id,
        epoch,
        total_stake,
        pool_token_supply,
        total_lamports,
        unstake_liquidity,
        deposit_fee,
        withdrawal_fee,
        rewards_fee,
        apy,
        created_at
    FROM pool_snapshots
"};

/// Postgres based implementation of [domain::storage::Storage].
#[derive(Debug, Clone)]
pub struct Storage {
    pool: PostgresPool,
}

impl Storage {
    pub fn new(pool: PostgresPool) -> Self {
        Self { pool }
    }
}

impl domain::storage::Storage for Storage {
    #[trace]
    async fn list_active_pools(&self) -> Result<Vec<PoolDescriptor>, sqlx::Error> {
        let query = indoc! {"
            SELECT
                id,
                name,
                address,
                network,
                variant,
                active
            FROM pools
            WHERE active
            ORDER BY id
        "};

        sqlx::query_as::<_, (i64, String, String, String, String, bool)>(query)
            .fetch_all(&*self.pool)
            .await?
            .into_iter()
            .map(|(id, name, address, network, variant, active)| {
                Ok(PoolDescriptor {
                    id,
                    name,
                    address: parse_column(&address)?,
                    network: parse_column::<Network>(&network)?,
                    variant,
                    active,
                })
            })
            .collect()
    }

    #[trace(properties = { "pool_id": "{pool_id}" })]
    async fn get_latest_snapshot(&self, pool_id: i64) -> Result<Option<PoolSnapshot>, sqlx::Error> {
        let query = format!(
            "{SNAPSHOT_COLUMNS}{}",
            indoc! {"
                WHERE pool_id = $1
                ORDER BY epoch DESC, created_at DESC
                LIMIT 1
            "}
        );

        let snapshot = sqlx::query_as::<_, SnapshotRow>(&query)
            .bind(pool_id)
            .fetch_optional(&*self.pool)
            .await?
            .map(snapshot_from_row);

        Ok(snapshot)
    }

    #[trace(properties = { "pool_id": "{pool_id}", "epoch": "{epoch}" })]
    async fn get_latest_snapshot_before(
        &self,
        pool_id: i64,
        epoch: u64,
    ) -> Result<Option<PoolSnapshot>, sqlx::Error> {
        let query = format!(
            "{SNAPSHOT_COLUMNS}{}",
            indoc! {"
                WHERE pool_id = $1
                AND epoch < $2
                ORDER BY epoch DESC, created_at DESC
                LIMIT 1
            "}
        );

        let snapshot = sqlx::query_as::<_, SnapshotRow>(&query)
            .bind(pool_id)
            .bind(epoch as i64)
            .fetch_optional(&*self.pool)
            .await?
            .map(snapshot_from_row);

        Ok(snapshot)
    }

    #[trace]
    async fn save_snapshot(
        &self,
        snapshot: &PoolSnapshot,
        records: &[ValidatorStakeRecord],
    ) -> Result<i64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let snapshot_id = save_snapshot(snapshot, &mut tx).await?;
        save_validator_stakes(snapshot_id, records, &mut tx).await?;
        tx.commit().await?;

        Ok(snapshot_id)
    }

    #[trace]
    async fn resolve_validator_id(
        &self,
        vote_account: &PublicKey,
    ) -> Result<Option<i64>, sqlx::Error> {
        let query = indoc! {"
            SELECT id
            FROM validators
            WHERE vote_account = $1
        "};

        sqlx::query_as::<_, (i64,)>(query)
            .bind(vote_account.to_string())
            .fetch_optional(&*self.pool)
            .map_ok(|id| id.map(|(id,)| id))
            .await
    }
}

async fn save_snapshot(
    snapshot: &PoolSnapshot,
    tx: &mut SqlxTransaction,
) -> Result<i64, sqlx::Error> {
    let query = indoc! {"
        INSERT INTO pool_snapshots (
            pool_id,
            epoch,
            total_stake,
            pool_token_supply,
            total_lamports,
            unstake_liquidity,
            deposit_fee,
            withdrawal_fee,
            rewards_fee,
            apy,
            created_at
        )
    "};

    QueryBuilder::new(query)
        .push_values([snapshot], |mut q, snapshot| {
            let PoolSnapshot {
                pool_id,
                epoch,
                total_stake,
                pool_token_supply,
                total_lamports,
                unstake_liquidity,
                deposit_fee,
                withdrawal_fee,
                rewards_fee,
                apy,
                created_at,
            } = snapshot;

            q.push_bind(*pool_id)
                .push_bind(*epoch as i64)
                .push_bind(*total_stake as i64)
                .push_bind(*pool_token_supply as i64)
                .push_bind(*total_lamports as i64)
                .push_bind(*unstake_liquidity as i64)
                .push_bind(*deposit_fee)
                .push_bind(*withdrawal_fee)
                .push_bind(*rewards_fee)
                .push_bind(*apy)
                .push_bind(*created_at);
        })
        .push(" RETURNING id")
        .build_query_as::<(i64,)>()
        .fetch_one(&mut **tx)
        .map_ok(|(id,)| id)
        .await
}

async fn save_validator_stakes(
    snapshot_id: i64,
    records: &[ValidatorStakeRecord],
    tx: &mut SqlxTransaction,
) -> Result<(), sqlx::Error> {
    if records.is_empty() {
        return Ok(());
    }

    let query = indoc! {"
        INSERT INTO validator_stakes (
            snapshot_id,
            validator_id,
            active_stake
        )
    "};

    QueryBuilder::new(query)
        .push_values(records.iter(), |mut q, record| {
            q.push_bind(snapshot_id)
                .push_bind(record.validator_id)
                .push_bind(record.active_stake as i64);
        })
        .build()
        .execute(&mut **tx)
        .await?;

    Ok(())
}

fn snapshot_from_row(row: SnapshotRow) -> PoolSnapshot {
    let (
        pool_id,
        epoch,
        total_stake,
        pool_token_supply,
        total_lamports,
        unstake_liquidity,
        deposit_fee,
        withdrawal_fee,
        rewards_fee,
        apy,
        created_at,
    ) = row;

    PoolSnapshot {
        pool_id,
        epoch: epoch as u64,
        total_stake: total_stake as u64,
        pool_token_supply: pool_token_supply as u64,
        total_lamports: total_lamports as u64,
        unstake_liquidity: unstake_liquidity as u64,
        deposit_fee,
        withdrawal_fee,
        rewards_fee,
        apy,
        created_at,
    }
}

fn parse_column<T>(value: &str) -> Result<T, sqlx::Error>
where
    T: FromStr,
    T::Err: StdError + Send + Sync + 'static,
{
    value
        .parse::<T>()
        .map_err(|error| sqlx::Error::Decode(Box::new(error)))
}

#[cfg(test)]
mod tests {
    use crate::{
        domain::{
            PoolSnapshot, PublicKey, ValidatorStakeRecord, storage::Storage as StorageTrait,
        },
        infra::storage::Storage,
    };
    use anyhow::Context;
    use chrono::{TimeDelta, Utc};
    use indexer_common::{
        domain::Network,
        infra::{
            migrations,
            pool::{self, postgres::PostgresPool},
        },
    };
    use sqlx::postgres::PgSslMode;
    use std::{error::Error as StdError, time::Duration};
    use testcontainers::{ImageExt, runners::AsyncRunner};
    use testcontainers_modules::postgres::Postgres;

    fn snapshot(pool_id: i64, epoch: u64, apy: f64, age_secs: i64) -> PoolSnapshot {
        PoolSnapshot {
            pool_id,
            epoch,
            total_stake: 800,
            pool_token_supply: 9_000,
            total_lamports: 10_000,
            unstake_liquidity: 9_200,
            deposit_fee: 0.001,
            withdrawal_fee: 0.003,
            rewards_fee: 0.05,
            apy,
            created_at: Utc::now() - TimeDelta::seconds(age_secs),
        }
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_storage() -> Result<(), Box<dyn StdError>> {
        let postgres_container = Postgres::default()
            .with_db_name("indexer")
            .with_user("indexer")
            .with_password(env!("APP__INFRA__STORAGE__PASSWORD"))
            .with_tag("17.1-alpine")
            .start()
            .await
            .context("start Postgres container")?;
        let postgres_port = postgres_container
            .get_host_port_ipv4(5432)
            .await
            .context("get Postgres port")?;

        let config = pool::postgres::Config {
            host: "localhost".to_string(),
            port: postgres_port,
            dbname: "indexer".to_string(),
            user: "indexer".to_string(),
            password: env!("APP__INFRA__STORAGE__PASSWORD").into(),
            sslmode: PgSslMode::Prefer,
            max_connections: 10,
            idle_timeout: Duration::from_secs(60),
            max_lifetime: Duration::from_secs(5 * 60),
        };
        let pool = PostgresPool::new(config).await?;
        migrations::postgres::run(&pool).await?;

        let pool_address = PublicKey([1; 32]);
        let vote_account = PublicKey([2; 32]);
        sqlx::query(
            "INSERT INTO pools (name, address, network, variant, active)
             VALUES ('jito', $1, 'mainnet', 'spl', TRUE), ('old', $2, 'mainnet', 'spl', FALSE)",
        )
        .bind(pool_address.to_string())
        .bind(PublicKey([3; 32]).to_string())
        .execute(&*pool)
        .await?;
        sqlx::query("INSERT INTO validators (vote_account, name) VALUES ($1, 'validator')")
            .bind(vote_account.to_string())
            .execute(&*pool)
            .await?;

        let storage = Storage::new(pool);

        let pools = storage.list_active_pools().await?;
        assert_eq!(pools.len(), 1);
        let pool = &pools[0];
        assert_eq!(pool.name, "jito");
        assert_eq!(pool.address, pool_address);
        assert_eq!(pool.network, Network::Mainnet);

        let validator_id = storage.resolve_validator_id(&vote_account).await?;
        assert!(validator_id.is_some());
        assert_eq!(
            storage.resolve_validator_id(&PublicKey([4; 32])).await?,
            None
        );

        assert_eq!(storage.get_latest_snapshot(pool.id).await?, None);

        let record = ValidatorStakeRecord {
            validator_id: validator_id.context("validator is known")?,
            vote_account,
            active_stake: 500,
        };
        storage
            .save_snapshot(&snapshot(pool.id, 600, 0.0, 120), &[record.clone()])
            .await?;
        storage
            .save_snapshot(&snapshot(pool.id, 601, 0.07, 60), &[record.clone()])
            .await?;
        storage
            .save_snapshot(&snapshot(pool.id, 601, 0.08, 0), &[record])
            .await?;

        let latest = storage
            .get_latest_snapshot(pool.id)
            .await?
            .context("latest snapshot")?;
        assert_eq!((latest.epoch, latest.apy), (601, 0.08));

        let before = storage
            .get_latest_snapshot_before(pool.id, 601)
            .await?
            .context("snapshot before 601")?;
        assert_eq!(before.epoch, 600);
        assert_eq!(storage.get_latest_snapshot_before(pool.id, 600).await?, None);

        // Unknown validator ids violate the foreign key and nothing is persisted.
        let unknown = ValidatorStakeRecord {
            validator_id: 999,
            vote_account: PublicKey([4; 32]),
            active_stake: 1,
        };
        let result = storage
            .save_snapshot(&snapshot(pool.id, 602, 0.0, 0), &[unknown])
            .await;
        assert!(result.is_err());
        let latest = storage
            .get_latest_snapshot(pool.id)
            .await?
            .context("latest snapshot")?;
        assert_eq!(latest.epoch, 601);

        Ok(())
    }
}
