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

use crate::domain::sampler::NetworkEpochEstimate;
use dashmap::DashMap;
use derive_more::Display;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::time::Instant;

/// Keys of the network-wide metrics held in the [MetricsCache].
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKey {
    ActiveStake,
    ValidatorCount,
    DelinquentValidatorCount,
    NetworkApy,
    InflationRate,
    Price,
    EpochEstimate,
    SlotTimeMs,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    U64(u64),
    F64(f64),
    EpochEstimate(NetworkEpochEstimate),
}

impl MetricValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::U64(value) => Some(*value as f64),
            Self::F64(value) => Some(*value),
            Self::EpochEstimate(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    value: MetricValue,
    expires_at: Instant,
}

/// Process-wide metrics with per-entry expiry. Cheap to clone; clones share the entries.
#[derive(Debug, Clone, Default)]
pub struct MetricsCache {
    entries: Arc<DashMap<MetricKey, Entry>>,
}

impl MetricsCache {
    pub fn set(&self, key: MetricKey, value: MetricValue, ttl: Duration) {
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.entries.insert(key, entry);
    }

    /// The value for the given key, unless unset or expired.
    pub fn get(&self, key: MetricKey) -> Result<MetricValue, KeyNotFound> {
        let now = Instant::now();
        let entry = self.entries.get(&key).map(|entry| *entry);

        match entry {
            Some(Entry { value, expires_at }) if now < expires_at => Ok(value),

            Some(_) => {
                self.entries.remove_if(&key, |_, entry| entry.expires_at <= now);
                Err(KeyNotFound(key))
            }

            None => Err(KeyNotFound(key)),
        }
    }

    pub fn remove(&self, key: MetricKey) -> Option<MetricValue> {
        self.entries.remove(&key).map(|(_, entry)| entry.value)
    }

    /// Drop all expired entries, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("metric {0} not found")]
pub struct KeyNotFound(pub MetricKey);

#[cfg(test)]
mod tests {
    use crate::domain::cache::{KeyNotFound, MetricKey, MetricValue, MetricsCache};
    use std::time::Duration;
    use tokio::time::advance;

    #[tokio::test(start_paused = true)]
    async fn test_expiry() {
        let cache = MetricsCache::default();
        assert_eq!(
            cache.get(MetricKey::Price),
            Err(KeyNotFound(MetricKey::Price))
        );

        cache.set(
            MetricKey::Price,
            MetricValue::F64(150.5),
            Duration::from_secs(60),
        );
        cache.set(
            MetricKey::ValidatorCount,
            MetricValue::U64(0),
            Duration::from_secs(600),
        );
        assert_eq!(cache.get(MetricKey::Price), Ok(MetricValue::F64(150.5)));

        advance(Duration::from_secs(59)).await;
        assert_eq!(cache.get(MetricKey::Price), Ok(MetricValue::F64(150.5)));

        advance(Duration::from_secs(1)).await;
        assert_eq!(
            cache.get(MetricKey::Price),
            Err(KeyNotFound(MetricKey::Price))
        );

        // A zero value is a value, not a miss.
        assert_eq!(
            cache.get(MetricKey::ValidatorCount),
            Ok(MetricValue::U64(0))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_and_remove() {
        let cache = MetricsCache::default();
        let shared = cache.clone();

        cache.set(
            MetricKey::InflationRate,
            MetricValue::F64(0.045),
            Duration::from_secs(10),
        );
        cache.set(
            MetricKey::ActiveStake,
            MetricValue::U64(1),
            Duration::from_secs(100),
        );
        cache.set(
            MetricKey::NetworkApy,
            MetricValue::F64(0.07),
            Duration::from_secs(100),
        );

        advance(Duration::from_secs(10)).await;
        assert_eq!(shared.purge_expired(), 1);
        assert_eq!(
            shared.get(MetricKey::InflationRate),
            Err(KeyNotFound(MetricKey::InflationRate))
        );

        assert_eq!(cache.remove(MetricKey::ActiveStake), Some(MetricValue::U64(1)));
        assert_eq!(
            shared.get(MetricKey::ActiveStake),
            Err(KeyNotFound(MetricKey::ActiveStake))
        );
        assert_eq!(shared.get(MetricKey::NetworkApy), Ok(MetricValue::F64(0.07)));
    }
}
