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

use crate::application::{guard::TaskFamily, pool_snapshots::CycleSummary};
use metrics::{Counter, Gauge, Histogram, counter, gauge, histogram};

/// Metrics for pool snapshot cycles.
#[derive(Debug, Clone)]
pub struct Metrics {
    pools_updated: Counter,
    pools_failed: Counter,
    cycle_duration: Histogram,
    last_cycle_failed: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            pools_updated: counter!("stake_pool_indexer_pool_updates", "result" => "succeeded"),
            pools_failed: counter!("stake_pool_indexer_pool_updates", "result" => "failed"),
            cycle_duration: histogram!("stake_pool_indexer_pool_cycle_duration_seconds"),
            last_cycle_failed: gauge!("stake_pool_indexer_pool_cycle_failed_pools"),
        }
    }

    pub fn record_pool_cycle(&self, summary: &CycleSummary) {
        self.pools_updated.increment(summary.succeeded as u64);
        self.pools_failed.increment(summary.failed as u64);
        self.cycle_duration.record(summary.duration.as_secs_f64());
        self.last_cycle_failed.set(summary.failed as f64);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

pub fn cycle_skipped(family: TaskFamily) {
    counter!("stake_pool_indexer_cycles_skipped", "family" => family.to_string()).increment(1);
}

pub fn cycle_failed(family: TaskFamily) {
    counter!("stake_pool_indexer_cycles_failed", "family" => family.to_string()).increment(1);
}
