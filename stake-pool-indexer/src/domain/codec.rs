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

//! Cursor-based decoding of little-endian, Borsh-style account layouts.
//!
//! Optional fields are a one-byte presence flag followed by the payload only when present.
//! Variable-length arrays are a `u32` element count followed by fixed-size elements.

use crate::domain::PublicKey;
use thiserror::Error;

/// Reads primitives from a byte slice, advancing a cursor by the exact width consumed. Every read
/// names the field it decodes so that errors point at the failing field.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.position
    }

    pub fn read_slice(&mut self, field: &'static str, len: usize) -> Result<&'a [u8], DecodeError> {
        if len > self.remaining() {
            return Err(self.truncated(field, len));
        }

        let slice = &self.bytes[self.position..self.position + len];
        self.position += len;
        Ok(slice)
    }

    pub fn skip(&mut self, field: &'static str, len: usize) -> Result<(), DecodeError> {
        self.read_slice(field, len).map(|_| ())
    }

    pub fn read_array<const N: usize>(
        &mut self,
        field: &'static str,
    ) -> Result<[u8; N], DecodeError> {
        let mut array = [0; N];
        array.copy_from_slice(self.read_slice(field, N)?);
        Ok(array)
    }

    pub fn read_u8(&mut self, field: &'static str) -> Result<u8, DecodeError> {
        self.read_array::<1>(field).map(|[byte]| byte)
    }

    pub fn read_u16(&mut self, field: &'static str) -> Result<u16, DecodeError> {
        self.read_array(field).map(u16::from_le_bytes)
    }

    pub fn read_u32(&mut self, field: &'static str) -> Result<u32, DecodeError> {
        self.read_array(field).map(u32::from_le_bytes)
    }

    pub fn read_u64(&mut self, field: &'static str) -> Result<u64, DecodeError> {
        self.read_array(field).map(u64::from_le_bytes)
    }

    pub fn read_i64(&mut self, field: &'static str) -> Result<i64, DecodeError> {
        self.read_array(field).map(i64::from_le_bytes)
    }

    /// Strict bool: only 0 and 1 are valid.
    pub fn read_bool(&mut self, field: &'static str) -> Result<bool, DecodeError> {
        match self.read_u8(field)? {
            0 => Ok(false),
            1 => Ok(true),
            value => Err(DecodeError::unexpected(field, value)),
        }
    }

    pub fn read_public_key(&mut self, field: &'static str) -> Result<PublicKey, DecodeError> {
        self.read_array(field).map(PublicKey)
    }

    /// Read a presence flag and, if nonzero, the payload decoded by `read`. An absent value
    /// consumes only the flag.
    pub fn read_option<T>(
        &mut self,
        field: &'static str,
        read: impl FnOnce(&mut Self) -> Result<T, DecodeError>,
    ) -> Result<Option<T>, DecodeError> {
        match self.read_u8(field)? {
            0 => Ok(None),
            _ => read(self).map(Some),
        }
    }

    /// Read a `u32` count followed by that many `element_size`-byte elements.
    pub fn read_vec<T>(
        &mut self,
        field: &'static str,
        element_size: usize,
        read: impl FnMut(&mut Self) -> Result<T, DecodeError>,
    ) -> Result<Vec<T>, DecodeError> {
        let count = self.read_u32(field)? as usize;
        self.read_items(field, count, element_size, read)
    }

    /// Read `count` elements of exactly `element_size` bytes each. The total size is checked
    /// against the remaining bytes before anything is decoded or allocated. Each element is
    /// decoded from a reader bounded to that element; unread trailing bytes of an element are
    /// skipped.
    pub fn read_items<T>(
        &mut self,
        field: &'static str,
        count: usize,
        element_size: usize,
        mut read: impl FnMut(&mut Self) -> Result<T, DecodeError>,
    ) -> Result<Vec<T>, DecodeError> {
        let total = count
            .checked_mul(element_size)
            .ok_or_else(|| self.truncated(field, usize::MAX))?;
        if total > self.remaining() {
            return Err(self.truncated(field, total));
        }

        let bytes: &'a [u8] = self.bytes;
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            let end = self.position + element_size;
            let mut element = Reader {
                bytes: &bytes[..end],
                position: self.position,
            };
            items.push(read(&mut element)?);
            self.position = end;
        }

        Ok(items)
    }

    fn truncated(&self, field: &'static str, needed: usize) -> DecodeError {
        DecodeError::TruncatedData {
            field,
            offset: self.position,
            needed,
            remaining: self.remaining(),
        }
    }
}

/// Error possibly returned when decoding account bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error(
        "truncated data reading {field} at offset {offset}: \
         needed {needed} bytes, {remaining} remaining"
    )]
    TruncatedData {
        field: &'static str,
        offset: usize,
        needed: usize,
        remaining: usize,
    },

    #[error("unexpected value {value} for {field}")]
    UnexpectedValue { field: &'static str, value: String },
}

impl DecodeError {
    pub fn unexpected(field: &'static str, value: impl ToString) -> Self {
        Self::UnexpectedValue {
            field,
            value: value.to_string(),
        }
    }

    /// The name of the field that failed to decode.
    pub fn field(&self) -> &'static str {
        match self {
            Self::TruncatedData { field, .. } => field,
            Self::UnexpectedValue { field, .. } => field,
        }
    }
}

/// Encodes the same layout as [Reader], for building account fixtures in tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct Writer {
    bytes: Vec<u8>,
}

#[cfg(test)]
impl Writer {
    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.bytes.push(value);
        self
    }

    pub fn u16(&mut self, value: u16) -> &mut Self {
        self.bytes(&value.to_le_bytes())
    }

    pub fn u32(&mut self, value: u32) -> &mut Self {
        self.bytes(&value.to_le_bytes())
    }

    pub fn u64(&mut self, value: u64) -> &mut Self {
        self.bytes(&value.to_le_bytes())
    }

    pub fn i64(&mut self, value: i64) -> &mut Self {
        self.bytes(&value.to_le_bytes())
    }

    pub fn bool(&mut self, value: bool) -> &mut Self {
        self.u8(value as u8)
    }

    pub fn public_key(&mut self, value: &PublicKey) -> &mut Self {
        self.bytes(value.as_bytes())
    }

    pub fn zeros(&mut self, len: usize) -> &mut Self {
        self.bytes.resize(self.bytes.len() + len, 0);
        self
    }

    pub fn bytes(&mut self, value: &[u8]) -> &mut Self {
        self.bytes.extend_from_slice(value);
        self
    }

    pub fn option<T>(&mut self, value: Option<T>, write: impl FnOnce(&mut Self, T)) -> &mut Self {
        match value {
            Some(value) => {
                self.u8(1);
                write(self, value);
            }
            None => {
                self.u8(0);
            }
        }
        self
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}
