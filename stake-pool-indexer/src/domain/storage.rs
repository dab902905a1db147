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

use crate::domain::{PoolDescriptor, PoolSnapshot, PublicKey, ValidatorStakeRecord};

/// Storage abstraction.
#[trait_variant::make(Send)]
pub trait Storage
where
    Self: Clone + Send + Sync + 'static,
{
    async fn list_active_pools(&self) -> Result<Vec<PoolDescriptor>, sqlx::Error>;

    /// The most recent snapshot of the given pool, if any.
    async fn get_latest_snapshot(&self, pool_id: i64) -> Result<Option<PoolSnapshot>, sqlx::Error>;

    /// The most recent snapshot of the given pool from an epoch strictly before the given one.
    async fn get_latest_snapshot_before(
        &self,
        pool_id: i64,
        epoch: u64,
    ) -> Result<Option<PoolSnapshot>, sqlx::Error>;

    /// Atomically save a snapshot together with its validator stake records, returning the id
    /// of the new snapshot.
    async fn save_snapshot(
        &self,
        snapshot: &PoolSnapshot,
        records: &[ValidatorStakeRecord],
    ) -> Result<i64, sqlx::Error>;

    /// Id of the validator with the given vote account in the validator directory, if known.
    async fn resolve_validator_id(&self, vote_account: &PublicKey)
    -> Result<Option<i64>, sqlx::Error>;
}
