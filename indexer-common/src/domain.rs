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

use derive_more::Display;
use serde::Deserialize;
use std::str::FromStr;
use thiserror::Error;

/// The network a pool lives on.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum Network {
    #[display("mainnet")]
    Mainnet,

    #[display("testnet")]
    Testnet,
}

impl FromStr for Network {
    type Err = InvalidNetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" | "mainnet-beta" => Ok(Self::Mainnet),
            "testnet" => Ok(Self::Testnet),
            _ => Err(InvalidNetworkError(s.to_owned())),
        }
    }
}

impl TryFrom<String> for Network {
    type Error = InvalidNetworkError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

#[derive(Debug, Error)]
#[error("invalid network {0}")]
pub struct InvalidNetworkError(pub String);
