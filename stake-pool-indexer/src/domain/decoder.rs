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

pub mod legacy_spl;
pub mod lido;
pub mod marinade;
pub mod spl;

use crate::domain::{
    PublicKey,
    codec::{DecodeError, Reader},
};

/// Protocol-neutral result of decoding a pool's state and validator list accounts.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPool {
    /// Epoch of the last on-chain update of the pool.
    pub epoch: u64,
    pub total_stake: u64,
    pub pool_token_supply: u64,
    pub total_lamports: u64,
    pub unstake_liquidity: u64,
    pub deposit_fee: f64,
    pub withdrawal_fee: f64,
    pub rewards_fee: f64,
    pub validators: Vec<ValidatorStake>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatorStake {
    pub vote_account: PublicKey,
    pub active_stake: u64,
}

/// A fee as a fraction in [0, 1]; a zero denominator yields 0.
pub fn fee_fraction(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        (numerator as f64 / denominator as f64).clamp(0.0, 1.0)
    }
}

pub fn basis_points(value: u32) -> f64 {
    fee_fraction(value.into(), 10_000)
}

/// Read an SPL-style `{denominator, numerator}` fee as a fraction.
fn read_fee(reader: &mut Reader, field: &'static str) -> Result<f64, DecodeError> {
    let denominator = reader.read_u64(field)?;
    let numerator = reader.read_u64(field)?;
    Ok(fee_fraction(numerator, denominator))
}

/// Drop unused list slots, marked by the default vote key.
fn active_validators(validators: Vec<ValidatorStake>) -> Vec<ValidatorStake> {
    validators
        .into_iter()
        .filter(|validator| !validator.vote_account.is_default())
        .collect()
}

fn expect_u8(reader: &mut Reader, field: &'static str, expected: u8) -> Result<(), DecodeError> {
    match reader.read_u8(field)? {
        value if value == expected => Ok(()),
        value => Err(DecodeError::unexpected(field, value)),
    }
}
