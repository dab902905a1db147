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

//! SPL stake-pool program, v1 account layout.
//!
//! Fees are `{denominator, numerator}` pairs. `FutureEpoch` fee updates and optional authorities
//! are presence-prefixed. The validator list starts with a header (account type and maximum
//! number of validators) followed by a count-prefixed array of `ValidatorStakeInfo` entries.

use crate::domain::{
    PublicKey,
    codec::{DecodeError, Reader},
    decoder::{DecodedPool, ValidatorStake, active_validators, expect_u8, read_fee},
};

const ACCOUNT_TYPE_STAKE_POOL: u8 = 1;
const ACCOUNT_TYPE_VALIDATOR_LIST: u8 = 2;
const VALIDATOR_STAKE_INFO_SIZE: usize = 73;

struct StakePool {
    validator_list: PublicKey,
    total_lamports: u64,
    pool_token_supply: u64,
    last_update_epoch: u64,
    epoch_fee: f64,
    sol_deposit_fee: f64,
    sol_withdrawal_fee: f64,
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
        epoch_fee,
        sol_deposit_fee,
        sol_withdrawal_fee,
    } = read_stake_pool(pool)?;

    let mut reader = Reader::new(validator_list);
    expect_u8(&mut reader, "validator_list.account_type", ACCOUNT_TYPE_VALIDATOR_LIST)?;
    reader.read_u32("validator_list.max_validators")?;
    let validators = reader.read_vec(
        "validator_list.validators",
        VALIDATOR_STAKE_INFO_SIZE,
        read_validator_stake_info,
    )?;
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
        deposit_fee: sol_deposit_fee,
        withdrawal_fee: sol_withdrawal_fee,
        rewards_fee: epoch_fee,
        validators,
    })
}

fn read_stake_pool(bytes: &[u8]) -> Result<StakePool, DecodeError> {
    let mut reader = Reader::new(bytes);
    let r = &mut reader;

    expect_u8(r, "account_type", ACCOUNT_TYPE_STAKE_POOL)?;
    r.skip("manager", 32)?;
    r.skip("staker", 32)?;
    r.skip("stake_deposit_authority", 32)?;
    r.read_u8("stake_withdraw_bump_seed")?;
    let validator_list = r.read_public_key("validator_list")?;
    r.skip("reserve_stake", 32)?;
    r.skip("pool_mint", 32)?;
    r.skip("manager_fee_account", 32)?;
    r.skip("token_program_id", 32)?;
    let total_lamports = r.read_u64("total_lamports")?;
    let pool_token_supply = r.read_u64("pool_token_supply")?;
    let last_update_epoch = r.read_u64("last_update_epoch")?;
    r.skip("lockup", 8 + 8 + 32)?;
    let epoch_fee = read_fee(r, "epoch_fee")?;
    r.read_option("next_epoch_fee", |r| read_fee(r, "next_epoch_fee"))?;
    r.read_option("preferred_deposit_validator", |r| {
        r.read_public_key("preferred_deposit_validator")
    })?;
    r.read_option("preferred_withdraw_validator", |r| {
        r.read_public_key("preferred_withdraw_validator")
    })?;
    read_fee(r, "stake_deposit_fee")?;
    read_fee(r, "stake_withdrawal_fee")?;
    r.read_option("next_stake_withdrawal_fee", |r| {
        read_fee(r, "next_stake_withdrawal_fee")
    })?;
    r.read_u8("stake_referral_fee")?;
    r.read_option("sol_deposit_authority", |r| {
        r.read_public_key("sol_deposit_authority")
    })?;
    let sol_deposit_fee = read_fee(r, "sol_deposit_fee")?;
    r.read_u8("sol_referral_fee")?;
    r.read_option("sol_withdraw_authority", |r| {
        r.read_public_key("sol_withdraw_authority")
    })?;
    let sol_withdrawal_fee = read_fee(r, "sol_withdrawal_fee")?;
    r.read_option("next_sol_withdrawal_fee", |r| {
        read_fee(r, "next_sol_withdrawal_fee")
    })?;
    r.read_u64("last_epoch_pool_token_supply")?;
    r.read_u64("last_epoch_total_lamports")?;

    Ok(StakePool {
        validator_list,
        total_lamports,
        pool_token_supply,
        last_update_epoch,
        epoch_fee,
        sol_deposit_fee,
        sol_withdrawal_fee,
    })
}

fn read_validator_stake_info(reader: &mut Reader) -> Result<ValidatorStake, DecodeError> {
    let active_stake_lamports = reader.read_u64("active_stake_lamports")?;
    let transient_stake_lamports = reader.read_u64("transient_stake_lamports")?;
    reader.read_u64("last_update_epoch")?;
    reader.read_u64("transient_seed_suffix")?;
    reader.read_u32("unused")?;
    reader.read_u32("validator_seed_suffix")?;
    reader.read_u8("status")?;
    let vote_account = reader.read_public_key("vote_account_address")?;

    Ok(ValidatorStake {
        vote_account,
        active_stake: active_stake_lamports.saturating_add(transient_stake_lamports),
    })
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::domain::{PublicKey, codec::Writer};

    /// `(numerator, denominator)`.
    pub type Fee = (u64, u64);

    #[derive(Debug, Clone)]
    pub struct Validator {
        pub vote_account: PublicKey,
        pub active: u64,
        pub transient: u64,
    }

    #[derive(Debug, Clone)]
    pub struct Fixture {
        pub validator_list: PublicKey,
        pub total_lamports: u64,
        pub pool_token_supply: u64,
        pub last_update_epoch: u64,
        pub epoch_fee: Fee,
        pub next_epoch_fee: Option<Fee>,
        pub sol_deposit_authority: Option<PublicKey>,
        pub sol_deposit_fee: Fee,
        pub sol_withdrawal_fee: Fee,
        pub max_validators: u32,
        pub validators: Vec<Validator>,
    }

    impl Fixture {
        pub fn sample(epoch: u64, total_lamports: u64, pool_token_supply: u64) -> Self {
            Self {
                validator_list: PublicKey([0xaa; 32]),
                total_lamports,
                pool_token_supply,
                last_update_epoch: epoch,
                epoch_fee: (5, 100),
                next_epoch_fee: Some((4, 100)),
                sol_deposit_authority: None,
                sol_deposit_fee: (1, 1_000),
                sol_withdrawal_fee: (3, 1_000),
                max_validators: 4,
                validators: vec![
                    Validator {
                        vote_account: PublicKey([1; 32]),
                        active: 400,
                        transient: 100,
                    },
                    Validator {
                        vote_account: PublicKey::DEFAULT,
                        active: 0,
                        transient: 0,
                    },
                    Validator {
                        vote_account: PublicKey([2; 32]),
                        active: 300,
                        transient: 0,
                    },
                ],
            }
        }

        pub fn pool_bytes(&self) -> Vec<u8> {
            let fee = |w: &mut Writer, (numerator, denominator): Fee| {
                w.u64(denominator).u64(numerator);
            };

            let mut w = Writer::default();
            w.u8(1).zeros(32 * 3).u8(255).public_key(&self.validator_list);
            w.zeros(32 * 4);
            w.u64(self.total_lamports)
                .u64(self.pool_token_supply)
                .u64(self.last_update_epoch);
            w.i64(0).u64(0).zeros(32);
            fee(&mut w, self.epoch_fee);
            w.option(self.next_epoch_fee, fee);
            w.option(None::<PublicKey>, |w, key| {
                w.public_key(&key);
            });
            w.option(Some(PublicKey([7; 32])), |w, key| {
                w.public_key(&key);
            });
            fee(&mut w, (0, 0));
            fee(&mut w, (1, 100));
            w.option(None, fee);
            w.u8(0);
            w.option(self.sol_deposit_authority, |w, key| {
                w.public_key(&key);
            });
            fee(&mut w, self.sol_deposit_fee);
            w.u8(0);
            w.option(None::<PublicKey>, |w, key| {
                w.public_key(&key);
            });
            fee(&mut w, self.sol_withdrawal_fee);
            w.option(Some((2, 1_000)), fee);
            w.u64(self.pool_token_supply).u64(self.total_lamports);
            // Trailing account padding.
            w.zeros(64);
            w.into_bytes()
        }

        pub fn list_bytes(&self) -> Vec<u8> {
            let mut w = Writer::default();
            w.u8(2)
                .u32(self.max_validators)
                .u32(self.validators.len() as u32);
            for validator in &self.validators {
                w.u64(validator.active)
                    .u64(validator.transient)
                    .u64(self.last_update_epoch)
                    .u64(0)
                    .u32(0)
                    .u32(0)
                    .u8(0)
                    .public_key(&validator.vote_account);
            }
            w.into_bytes()
        }
    }
}
