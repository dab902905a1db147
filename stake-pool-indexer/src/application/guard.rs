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

use crate::application::metrics;
use derive_more::Display;
use log::debug;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// The independent periodic task families.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskFamily {
    #[display("pool_snapshots")]
    PoolSnapshots,

    #[display("network_stats")]
    NetworkStats,

    #[display("inflation_rate")]
    InflationRate,

    #[display("price")]
    Price,

    #[display("epoch_estimate")]
    EpochEstimate,

    #[display("slot_time")]
    SlotTime,

    #[display("network_apy")]
    NetworkApy,

    #[display("cache_purge")]
    CachePurge,
}

/// Mutual exclusion for the cycles of one task family. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CycleGuard(Arc<AtomicBool>);

impl CycleGuard {
    /// Acquire the guard unless a cycle is already running.
    pub fn try_acquire(&self) -> Option<CyclePermit> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CyclePermit(self.0.clone()))
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Releases its [CycleGuard] when dropped, also if the cycle panics or is aborted.
#[derive(Debug)]
pub struct CyclePermit(Arc<AtomicBool>);

impl Drop for CyclePermit {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome<T> {
    Completed(T),

    /// Another cycle of the same family was in flight.
    Skipped,
}

/// Run the given cycle unless one of the same family is running; never queues.
pub async fn run_exclusive<F, T>(guard: &CycleGuard, family: TaskFamily, cycle: F) -> CycleOutcome<T>
where
    F: Future<Output = T>,
{
    let Some(_permit) = guard.try_acquire() else {
        debug!(family:%; "cycle already running, skipping");
        metrics::cycle_skipped(family);
        return CycleOutcome::Skipped;
    };

    CycleOutcome::Completed(cycle.await)
}
