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

use crate::domain::{
    PublicKey,
    codec::DecodeError,
    decoder::{self, DecodedPool},
};
use derive_more::Display;
use std::str::FromStr;
use thiserror::Error;

/// The stake-pool programs whose account layouts can be decoded.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolVariant {
    #[display("spl")]
    Spl,

    #[display("legacy-spl")]
    LegacySpl,

    #[display("marinade")]
    Marinade,

    #[display("lido")]
    Lido,
}

impl ProtocolVariant {
    pub const ALL: [Self; 4] = [Self::Spl, Self::LegacySpl, Self::Marinade, Self::Lido];

    /// Address of the account holding the pool's validator list, read from the pool account.
    pub fn validator_list_address(&self, pool: &[u8]) -> Result<PublicKey, DecodeError> {
        match self {
            Self::Spl => decoder::spl::validator_list_address(pool),
            Self::LegacySpl => decoder::legacy_spl::validator_list_address(pool),
            Self::Marinade => decoder::marinade::validator_list_address(pool),
            Self::Lido => decoder::lido::validator_list_address(pool),
        }
    }

    pub fn decode(&self, pool: &[u8], validator_list: &[u8]) -> Result<DecodedPool, DecodeError> {
        match self {
            Self::Spl => decoder::spl::decode(pool, validator_list),
            Self::LegacySpl => decoder::legacy_spl::decode(pool, validator_list),
            Self::Marinade => decoder::marinade::decode(pool, validator_list),
            Self::Lido => decoder::lido::decode(pool, validator_list),
        }
    }
}

impl FromStr for ProtocolVariant {
    type Err = PoolNotSupported;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "spl" => Ok(Self::Spl),
            "legacy-spl" | "legacy_spl" | "socean" => Ok(Self::LegacySpl),
            "marinade" => Ok(Self::Marinade),
            "lido" | "solido" => Ok(Self::Lido),
            _ => Err(PoolNotSupported(s.to_owned())),
        }
    }
}

/// Resolve a pool's declared variant name.
pub fn resolve(name: &str) -> Result<ProtocolVariant, PoolNotSupported> {
    name.parse()
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("pool variant {0:?} is not supported")]
pub struct PoolNotSupported(pub String);
