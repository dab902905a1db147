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

//! Early SPL stake-pool layout, as still used by forks deployed before the v1 upgrade.
//!
//! There is no deposit fee and no transient stake: the pool carries a management fee and a
//! withdrawal fee, and validator entries are `{status, vote, stake, last_update_epoch}`.

use crate::domain::{
    PublicKey,
    codec::{DecodeError, Reader},
    decoder::{DecodedPool, ValidatorStake, active_validators, expect_u8, read_fee},
};

const ACCOUNT_TYPE_STAKE_POOL: u8 = 1;
const ACCOUNT_TYPE_VALIDATOR_LIST: u8 = 2;
const VALIDATOR_ENTRY_SIZE: usize = 49;

struct StakePool {
    validator_list: PublicKey,
    total_lamports: u64,
    pool_token_supply: u64,
    last_update_epoch: u64,
    fee: f64,
    withdrawal_fee: f64,
}

pub fn validator_list_address(pool: &[u8]) -> Result<PublicKey, DecodeError> {
    read_stake_pool(pool).map(|stake_pool| stake_pool.validator_list)
}

pub fn decode(pool: &[u8], validator_list: &[u8]) -> Result<DecodedPool, DecodeError> {
    let StakePool {
        validator_list: _,
        total_lamports,
        pool_token_supply,
        last_update_epoch,
        fee,
        withdrawal_fee,
    } = read_stake_pool(pool)?;

    let mut reader = Reader::new(validator_list);
    expect_u8(&mut reader, "validator_list.account_type", ACCOUNT_TYPE_VALIDATOR_LIST)?;
    reader.read_u32("validator_list.max_validators")?;
    let validators = reader.read_vec("validator_list.validators", VALIDATOR_ENTRY_SIZE, |r| {
        r.read_u8("status")?;
        let vote_account = r.read_public_key("vote_account")?;
        let active_stake = r.read_u64("stake_lamports")?;
        r.read_u64("last_update_epoch")?;
        Ok(ValidatorStake {
            vote_account,
            active_stake,
        })
    })?;
    let validators = active_validators(validators);

    let total_stake = validators
        .iter()
        .map(|validator| validator.active_stake)
        .fold(0u64, u64::saturating_add);

    Ok(DecodedPool {
        epoch: last_update_epoch,
        total_stake,
        pool_token_supply,
        total_lamports,
        unstake_liquidity: total_lamports.saturating_sub(total_stake),
        deposit_fee: 0.0,
        withdrawal_fee,
        rewards_fee: fee,
        validators,
    })
}

fn read_stake_pool(bytes: &[u8]) -> Result<StakePool, DecodeError> {
    let mut reader = Reader::new(bytes);
    let r = &mut reader;

    expect_u8(r, "account_type", ACCOUNT_TYPE_STAKE_POOL)?;
    r.skip("manager", 32)?;
    r.skip("staker", 32)?;
    r.skip("deposit_authority", 32)?;
    r.read_u8("withdraw_bump_seed")?;
    let validator_list = r.read_public_key("validator_list")?;
    r.skip("reserve_stake", 32)?;
    r.skip("pool_mint", 32)?;
    r.skip("manager_fee_account", 32)?;
    r.skip("token_program_id", 32)?;
    let total_lamports = r.read_u64("total_stake_lamports")?;
    let pool_token_supply = r.read_u64("pool_token_supply")?;
    let last_update_epoch = r.read_u64("last_update_epoch")?;
    let fee = read_fee(r, "fee")?;
    let withdrawal_fee = read_fee(r, "withdrawal_fee")?;

    Ok(StakePool {
        validator_list,
        total_lamports,
        pool_token_supply,
        last_update_epoch,
        fee,
        withdrawal_fee,
    })
}
