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

//! Marinade liquid staking program.
//!
//! The `State` account is an Anchor account with an 8-byte discriminator. Fees are basis points.
//! The validator list is a separate account: an 8-byte discriminator followed by a flat array of
//! records whose count and size are stored in the state's list descriptor.

use crate::domain::{
    PublicKey,
    codec::{DecodeError, Reader},
    decoder::{DecodedPool, ValidatorStake, active_validators, basis_points},
};

const STATE_DISCRIMINATOR: [u8; 8] = [216, 146, 107, 94, 104, 75, 182, 177];
const VALIDATOR_LIST_DISCRIMINATOR: [u8; 8] = *b"validatr";
const VALIDATOR_RECORD_SIZE: u32 = 53;

struct List {
    account: PublicKey,
    item_size: u32,
    count: u32,
}

struct State {
    validator_list: List,
    reward_fee: u32,
    delayed_unstake_cooling_down: u64,
    last_stake_delta_epoch: u64,
    total_active_balance: u64,
    lp_min_fee: u32,
    available_reserve_balance: u64,
    msol_supply: u64,
    circulating_ticket_balance: u64,
    emergency_cooling_down: u64,
}

pub fn validator_list_address(pool: &[u8]) -> Result<PublicKey, DecodeError> {
    read_state(pool).map(|state| state.validator_list.account)
}

pub fn decode(pool: &[u8], validator_list: &[u8]) -> Result<DecodedPool, DecodeError> {
    let State {
        validator_list: List {
            account: _,
            item_size,
            count,
        },
        reward_fee,
        delayed_unstake_cooling_down,
        last_stake_delta_epoch,
        total_active_balance,
        lp_min_fee,
        available_reserve_balance,
        msol_supply,
        circulating_ticket_balance,
        emergency_cooling_down,
    } = read_state(pool)?;

    if item_size < VALIDATOR_RECORD_SIZE {
        return Err(DecodeError::unexpected(
            "validator_system.validator_list.item_size",
            item_size,
        ));
    }

    let mut reader = Reader::new(validator_list);
    if reader.read_array::<8>("validator_list.discriminator")? != VALIDATOR_LIST_DISCRIMINATOR {
        return Err(DecodeError::unexpected(
            "validator_list.discriminator",
            "not a validator list",
        ));
    }
    let validators = reader.read_items(
        "validator_list.validators",
        count as usize,
        item_size as usize,
        |r| {
            let vote_account = r.read_public_key("validator_account")?;
            let active_stake = r.read_u64("active_balance")?;
            r.read_u32("score")?;
            r.read_u64("last_stake_delta_epoch")?;
            r.read_u8("duplication_flag_bump_seed")?;
            Ok(ValidatorStake {
                vote_account,
                active_stake,
            })
        },
    )?;

    let total_lamports = total_active_balance
        .saturating_add(delayed_unstake_cooling_down)
        .saturating_add(emergency_cooling_down)
        .saturating_add(available_reserve_balance)
        .saturating_sub(circulating_ticket_balance);

    Ok(DecodedPool {
        epoch: last_stake_delta_epoch,
        total_stake: total_active_balance,
        pool_token_supply: msol_supply,
        total_lamports,
        unstake_liquidity: available_reserve_balance,
        deposit_fee: 0.0,
        withdrawal_fee: basis_points(lp_min_fee),
        rewards_fee: basis_points(reward_fee),
        validators: active_validators(validators),
    })
}

fn read_state(bytes: &[u8]) -> Result<State, DecodeError> {
    let mut reader = Reader::new(bytes);
    let r = &mut reader;

    if r.read_array::<8>("discriminator")? != STATE_DISCRIMINATOR {
        return Err(DecodeError::unexpected("discriminator", "not a state account"));
    }
    r.skip("msol_mint", 32)?;
    r.skip("admin_authority", 32)?;
    r.skip("operational_sol_account", 32)?;
    r.skip("treasury_msol_account", 32)?;
    r.read_u8("reserve_bump_seed")?;
    r.read_u8("msol_mint_authority_bump_seed")?;
    r.read_u64("rent_exempt_for_token_acc")?;
    let reward_fee = r.read_u32("reward_fee")?;

    read_list(r, "stake_system.stake_list")?;
    let delayed_unstake_cooling_down = r.read_u64("stake_system.delayed_unstake_cooling_down")?;
    r.read_u8("stake_system.stake_deposit_bump_seed")?;
    r.read_u8("stake_system.stake_withdraw_bump_seed")?;
    r.read_u64("stake_system.slots_for_stake_delta")?;
    let last_stake_delta_epoch = r.read_u64("stake_system.last_stake_delta_epoch")?;
    r.read_u64("stake_system.min_stake")?;
    r.read_u32("stake_system.extra_stake_delta_runs")?;

    let validator_list = read_list(r, "validator_system.validator_list")?;
    r.skip("validator_system.manager_authority", 32)?;
    r.read_u32("validator_system.total_validator_score")?;
    let total_active_balance = r.read_u64("validator_system.total_active_balance")?;
    r.read_u8("validator_system.auto_add_validator_enabled")?;

    r.skip("liq_pool.lp_mint", 32)?;
    r.read_u8("liq_pool.lp_mint_authority_bump_seed")?;
    r.read_u8("liq_pool.sol_leg_bump_seed")?;
    r.read_u8("liq_pool.msol_leg_authority_bump_seed")?;
    r.skip("liq_pool.msol_leg", 32)?;
    r.read_u64("liq_pool.lp_liquidity_target")?;
    r.read_u32("liq_pool.lp_max_fee")?;
    let lp_min_fee = r.read_u32("liq_pool.lp_min_fee")?;
    r.read_u32("liq_pool.treasury_cut")?;
    r.read_u64("liq_pool.lp_supply")?;
    r.read_u64("liq_pool.lent_from_sol_leg")?;
    r.read_u64("liq_pool.liquidity_sol_cap")?;

    let available_reserve_balance = r.read_u64("available_reserve_balance")?;
    let msol_supply = r.read_u64("msol_supply")?;
    r.read_u64("msol_price")?;
    r.read_u64("circulating_ticket_count")?;
    let circulating_ticket_balance = r.read_u64("circulating_ticket_balance")?;
    r.read_u64("lent_from_reserve")?;
    r.read_u64("min_deposit")?;
    r.read_u64("min_withdraw")?;
    r.read_u64("staking_sol_cap")?;
    let emergency_cooling_down = r.read_u64("emergency_cooling_down")?;

    Ok(State {
        validator_list,
        reward_fee,
        delayed_unstake_cooling_down,
        last_stake_delta_epoch,
        total_active_balance,
        lp_min_fee,
        available_reserve_balance,
        msol_supply,
        circulating_ticket_balance,
        emergency_cooling_down,
    })
}

fn read_list(reader: &mut Reader, field: &'static str) -> Result<List, DecodeError> {
    let account = reader.read_public_key(field)?;
    let item_size = reader.read_u32(field)?;
    let count = reader.read_u32(field)?;
    reader.skip(field, 32 + 4)?;

    Ok(List {
        account,
        item_size,
        count,
    })
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::domain::{
        PublicKey,
        codec::Writer,
        decoder::marinade::{STATE_DISCRIMINATOR, VALIDATOR_LIST_DISCRIMINATOR},
    };

    #[derive(Debug, Clone)]
    pub struct Fixture {
        pub validator_list: PublicKey,
        pub item_size: u32,
        pub reward_fee_bps: u32,
        pub lp_min_fee_bps: u32,
        pub delayed_unstake_cooling_down: u64,
        pub last_stake_delta_epoch: u64,
        pub total_active_balance: u64,
        pub available_reserve_balance: u64,
        pub msol_supply: u64,
        pub circulating_ticket_balance: u64,
        pub emergency_cooling_down: u64,
        pub validators: Vec<(PublicKey, u64)>,
    }

    impl Fixture {
        pub fn sample() -> Self {
            Self {
                validator_list: PublicKey([0xcc; 32]),
                item_size: 61,
                reward_fee_bps: 600,
                lp_min_fee_bps: 30,
                delayed_unstake_cooling_down: 1_000,
                last_stake_delta_epoch: 640,
                total_active_balance: 90_000,
                available_reserve_balance: 5_000,
                msol_supply: 80_000,
                circulating_ticket_balance: 2_000,
                emergency_cooling_down: 500,
                validators: vec![
                    (PublicKey([5; 32]), 60_000),
                    (PublicKey::DEFAULT, 0),
                    (PublicKey([6; 32]), 30_000),
                ],
            }
        }

        pub fn pool_bytes(&self) -> Vec<u8> {
            let list = |w: &mut Writer, account: &PublicKey, item_size: u32, count: u32| {
                w.public_key(account)
                    .u32(item_size)
                    .u32(count)
                    .zeros(32)
                    .u32(0);
            };

            let mut w = Writer::default();
            w.bytes(&STATE_DISCRIMINATOR).zeros(32 * 4).u8(0).u8(0).u64(2_039_280);
            w.u32(self.reward_fee_bps);

            list(&mut w, &PublicKey([0xdd; 32]), 56, 0);
            w.u64(self.delayed_unstake_cooling_down)
                .u8(0)
                .u8(0)
                .u64(18_000)
                .u64(self.last_stake_delta_epoch)
                .u64(1_000_000_000)
                .u32(0);

            list(
                &mut w,
                &self.validator_list,
                self.item_size,
                self.validators.len() as u32,
            );
            w.zeros(32)
                .u32(1_000)
                .u64(self.total_active_balance)
                .u8(0);

            w.zeros(32).u8(0).u8(0).u8(0).zeros(32);
            w.u64(10_000)
                .u32(300)
                .u32(self.lp_min_fee_bps)
                .u32(2_500)
                .u64(0)
                .u64(0)
                .u64(u64::MAX);

            w.u64(self.available_reserve_balance)
                .u64(self.msol_supply)
                .u64(0x1_0000_0000)
                .u64(3)
                .u64(self.circulating_ticket_balance)
                .u64(0)
                .u64(1)
                .u64(1)
                .u64(u64::MAX)
                .u64(self.emergency_cooling_down);
            w.zeros(128);
            w.into_bytes()
        }

        pub fn list_bytes(&self) -> Vec<u8> {
            let mut w = Writer::default();
            w.bytes(&VALIDATOR_LIST_DISCRIMINATOR);
            for (vote_account, active_balance) in &self.validators {
                let start = w.len();
                w.public_key(vote_account)
                    .u64(*active_balance)
                    .u32(100)
                    .u64(self.last_stake_delta_epoch)
                    .u8(255);
                let padding = self.item_size as usize - (w.len() - start);
                w.zeros(padding);
            }
            w.into_bytes()
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::{
        PublicKey,
        codec::DecodeError,
        decoder::{
            ValidatorStake,
            marinade::{decode, fixtures::Fixture, validator_list_address},
        },
    };
    use assert_matches::assert_matches;

    #[test]
    fn test_decode() {
        let fixture = Fixture::sample();

        assert_eq!(
            validator_list_address(&fixture.pool_bytes()),
            Ok(PublicKey([0xcc; 32]))
        );

        let pool = decode(&fixture.pool_bytes(), &fixture.list_bytes()).expect("pool decodes");
        assert_eq!(pool.epoch, 640);
        assert_eq!(pool.total_stake, 90_000);
        assert_eq!(pool.pool_token_supply, 80_000);
        assert_eq!(pool.total_lamports, 90_000 + 1_000 + 500 + 5_000 - 2_000);
        assert_eq!(pool.unstake_liquidity, 5_000);
        assert_eq!(pool.rewards_fee, 0.06);
        assert_eq!(pool.withdrawal_fee, 0.003);
        assert_eq!(pool.deposit_fee, 0.0);
        assert_eq!(
            pool.validators,
            vec![
                ValidatorStake {
                    vote_account: PublicKey([5; 32]),
                    active_stake: 60_000,
                },
                ValidatorStake {
                    vote_account: PublicKey([6; 32]),
                    active_stake: 30_000,
                },
            ]
        );
    }

    #[test]
    fn test_decode_stable() {
        let fixture = Fixture::sample();
        let pool = decode(&fixture.pool_bytes(), &fixture.list_bytes()).expect("pool decodes");

        // Re-encode the decoded validators, which no longer contain the empty slots.
        let mut reencoded = fixture.clone();
        reencoded.validators = pool
            .validators
            .iter()
            .map(|validator| (validator.vote_account, validator.active_stake))
            .collect();
        assert!(reencoded.validators.len() < fixture.validators.len());

        let again =
            decode(&reencoded.pool_bytes(), &reencoded.list_bytes()).expect("pool decodes");
        assert_eq!(pool, again);
    }

    #[test]
    fn test_decode_exact_item_size() {
        let mut fixture = Fixture::sample();
        fixture.item_size = 53;

        let pool = decode(&fixture.pool_bytes(), &fixture.list_bytes()).expect("pool decodes");
        assert_eq!(pool.validators.len(), 2);
    }

    #[test]
    fn test_decode_invalid() {
        let fixture = Fixture::sample();

        let mut pool = fixture.pool_bytes();
        pool[0] = 0;
        assert_matches!(
            decode(&pool, &fixture.list_bytes()),
            Err(DecodeError::UnexpectedValue {
                field: "discriminator",
                ..
            })
        );

        let mut list = fixture.list_bytes();
        list[0] = b'x';
        assert_matches!(
            decode(&fixture.pool_bytes(), &list),
            Err(DecodeError::UnexpectedValue {
                field: "validator_list.discriminator",
                ..
            })
        );

        let list = fixture.list_bytes();
        assert_matches!(
            decode(&fixture.pool_bytes(), &list[..list.len() - 10]),
            Err(DecodeError::TruncatedData {
                field: "validator_list.validators",
                ..
            })
        );

        let mut fixture = Fixture::sample();
        fixture.item_size = 40;
        assert_matches!(
            decode(&fixture.pool_bytes(), &[]),
            Err(DecodeError::UnexpectedValue {
                field: "validator_system.validator_list.item_size",
                ..
            })
        );
    }
}
