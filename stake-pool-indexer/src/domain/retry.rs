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

use indexer_common::error::StdErrorExt;
use log::warn;
use serde::Deserialize;
use std::{error::Error as StdError, time::Duration};
use tokio::time::sleep;

/// Bounded retry with a fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RetryPolicy {
    pub attempts: u32,

    #[serde(with = "humantime_serde")]
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

/// Execute `op` up to `policy.attempts` times (at least once), sleeping `policy.delay` between
/// attempts, and return the first success or the last error. Only wrap operations whose failures
/// are expected to be transient.
pub async fn retry<T, E, F, Fut>(policy: RetryPolicy, operation: &str, mut op: F) -> Result<T, E>
where
    E: StdError,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),

            Err(error) if attempt >= attempts => return Err(error),

            Err(error) => {
                warn!(
                    operation,
                    attempt,
                    attempts,
                    error = error.as_chain();
                    "operation failed, retrying"
                );
                attempt += 1;
                sleep(policy.delay).await;
            }
        }
    }
}
