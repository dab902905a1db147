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

use serde::Deserialize;
use std::{
    fmt::{self, Debug, Display, Formatter},
    str::FromStr,
};
use thiserror::Error;

/// A 32-byte account address, displayed as base58.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Deserialize)]
#[serde(try_from = "String")]
pub struct PublicKey(pub [u8; 32]);

impl PublicKey {
    /// The all-zero key, marking unused slots in fixed-capacity account lists.
    pub const DEFAULT: Self = Self([0; 32]);

    pub fn is_default(&self) -> bool {
        *self == Self::DEFAULT
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Display for PublicKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", bs58::encode(self.0).into_string())
    }
}

impl Debug for PublicKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({self})")
    }
}

impl FromStr for PublicKey {
    type Err = InvalidPublicKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|error| InvalidPublicKeyError::Base58(s.to_owned(), error))?;
        let bytes = <[u8; 32]>::try_from(bytes.as_slice())
            .map_err(|_| InvalidPublicKeyError::Length(s.to_owned(), bytes.len()))?;
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for PublicKey {
    type Error = InvalidPublicKeyError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<[u8; 32]> for PublicKey {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

#[derive(Debug, Error)]
pub enum InvalidPublicKeyError {
    #[error("public key {0} is not valid base58")]
    Base58(String, #[source] bs58::decode::Error),

    #[error("public key {0} has {1} bytes, expected 32")]
    Length(String, usize),
}

#[cfg(test)]
mod tests {
    use crate::domain::PublicKey;
    use assert_matches::assert_matches;

    #[test]
    fn test_display_from_str() {
        let key = "Stake11111111111111111111111111111111111111"
            .parse::<PublicKey>()
            .expect("stake program id is valid");
        assert_eq!(key.to_string(), "Stake11111111111111111111111111111111111111");
        assert!(!key.is_default());

        let default = "11111111111111111111111111111111"
            .parse::<PublicKey>()
            .expect("system program id is valid");
        assert!(default.is_default());
    }

    #[test]
    fn test_from_str_invalid() {
        assert_matches!(
            "0OIl".parse::<PublicKey>(),
            Err(super::InvalidPublicKeyError::Base58(..))
        );
        assert_matches!(
            "2g".parse::<PublicKey>(),
            Err(super::InvalidPublicKeyError::Length(_, 1))
        );
    }
}
