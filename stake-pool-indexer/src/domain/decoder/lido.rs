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

//! Lido for Solana (Solido) program, v2 account layout.
//!
//! Fees are weights of a reward distribution rather than fractions: the rewards fee is the share
//! of treasury and developer weights in the total. Solido charges no deposit or withdrawal fee.

use crate::domain::{
    PublicKey,
    codec::{DecodeError, Reader},
    decoder::{DecodedPool, ValidatorStake, active_validators, expect_u8, fee_fraction},
};

const ACCOUNT_TYPE_LIDO: u8 = 1;
const ACCOUNT_TYPE_VALIDATOR: u8 = 2;
const LIDO_VERSION: u8 = 2;
const METRICS_SIZE: usize = 184;
const CRITERIA_SIZE: usize = 17;
const VALIDATOR_SIZE: usize = 89;

struct Lido {
    computed_in_epoch: u64,
    st_sol_supply: u64,
    sol_balance: u64,
    treasury_fee: u32,
    developer_fee: u32,
    st_sol_appreciation: u32,
    validator_list: PublicKey,
}

pub fn validator_list_address(pool: &[u8]) -> Result<PublicKey, DecodeError> {
    read_lido(pool).map(|lido| lido.validator_list)
}

pub fn decode(pool: &[u8], validator_list: &[u8]) -> Result<DecodedPool, DecodeError> {
    let Lido {
        computed_in_epoch,
        st_sol_supply,
        sol_balance,
        treasury_fee,
        developer_fee,
        st_sol_appreciation,
        validator_list: _,
    } = read_lido(pool)?;

    let mut reader = Reader::new(validator_list);
    expect_u8(&mut reader, "validator_list.account_type", ACCOUNT_TYPE_VALIDATOR)?;
    expect_u8(&mut reader, "validator_list.lido_version", LIDO_VERSION)?;
    reader.read_u32("validator_list.max_entries")?;
    let validators = reader.read_vec("validator_list.validators", VALIDATOR_SIZE, |r| {
        let vote_account = r.read_public_key("vote_account_address")?;
        r.skip("stake_seeds", 16)?;
        r.skip("unstake_seeds", 16)?;
        let stake_accounts_balance = r.read_u64("stake_accounts_balance")?;
        r.read_u64("unstake_accounts_balance")?;
        r.read_u64("effective_stake_balance")?;
        r.read_bool("active")?;
        Ok(ValidatorStake {
            vote_account,
            active_stake: stake_accounts_balance,
        })
    })?;
    let validators = active_validators(validators);

    let total_stake = validators
        .iter()
        .map(|validator| validator.active_stake)
        .fold(0u64, u64::saturating_add);

    let fee_weight = u64::from(treasury_fee) + u64::from(developer_fee);
    let rewards_fee = fee_fraction(fee_weight, fee_weight + u64::from(st_sol_appreciation));

    Ok(DecodedPool {
        epoch: computed_in_epoch,
        total_stake,
        pool_token_supply: st_sol_supply,
        total_lamports: sol_balance,
        unstake_liquidity: sol_balance.saturating_sub(total_stake),
        deposit_fee: 0.0,
        withdrawal_fee: 0.0,
        rewards_fee,
        validators,
    })
}

fn read_lido(bytes: &[u8]) -> Result<Lido, DecodeError> {
    let mut reader = Reader::new(bytes);
    let r = &mut reader;

    expect_u8(r, "account_type", ACCOUNT_TYPE_LIDO)?;
    expect_u8(r, "lido_version", LIDO_VERSION)?;
    r.skip("manager", 32)?;
    r.skip("st_sol_mint", 32)?;
    let computed_in_epoch = r.read_u64("exchange_rate.computed_in_epoch")?;
    let st_sol_supply = r.read_u64("exchange_rate.st_sol_supply")?;
    let sol_balance = r.read_u64("exchange_rate.sol_balance")?;
    r.read_u8("sol_reserve_account_bump_seed")?;
    r.read_u8("stake_authority_bump_seed")?;
    r.read_u8("mint_authority_bump_seed")?;
    let treasury_fee = r.read_u32("reward_distribution.treasury_fee")?;
    let developer_fee = r.read_u32("reward_distribution.developer_fee")?;
    let st_sol_appreciation = r.read_u32("reward_distribution.st_sol_appreciation")?;
    r.skip("fee_recipients", 32 * 2)?;
    r.skip("metrics", METRICS_SIZE)?;
    r.skip("criteria", CRITERIA_SIZE)?;
    let validator_list = r.read_public_key("validator_list")?;
    r.skip("maintainer_list", 32)?;

    Ok(Lido {
        computed_in_epoch,
        st_sol_supply,
        sol_balance,
        treasury_fee,
        developer_fee,
        st_sol_appreciation,
        validator_list,
    })
}
