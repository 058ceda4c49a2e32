// This file is part of kvlite.
// Copyright (C) 2026 KVLite Contributors
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

//! Deterministic 64-bit identity for a `(partition, key)` pair.
//!
//! `hash = (xxhash32(partition) << 32) | xxhash32(key)`, computed over the
//! UTF-16LE code units of each string so the identity matches across
//! processes and platforms regardless of the host's native string encoding.

use crate::error::CacheError;
use std::hash::Hasher as _;
use twox_hash::XxHash32;

const SEED: u32 = 0;

/// Hash a single string's UTF-16LE code units with xxHash32.
fn xxhash32_utf16le(s: &str) -> u32 {
    let mut hasher = XxHash32::with_seed(SEED);
    // Feed code units one at a time, little-endian, rather than collecting
    // into a `Vec<u8>` first: the byte sequence fed to the hasher is
    // identical either way, but this avoids the allocation.
    for unit in s.encode_utf16() {
        hasher.write(&unit.to_le_bytes());
    }
    hasher.finish() as u32
}

/// Hash just the partition, with the low 32 bits zeroed.
///
/// Used for partition-scoped predicates where the backend prefers an
/// integer range/prefix lookup over a string comparison.
pub fn partition_hash(partition: &str) -> Result<i64, CacheError> {
    if partition.is_empty() {
        return Err(CacheError::InvalidArgument(
            "partition must not be empty".into(),
        ));
    }
    let upper = xxhash32_utf16le(partition) as u64;
    Ok(((upper << 32) as i64) & (0xFFFF_FFFF_0000_0000u64 as i64))
}

/// Compute the 64-bit entry identity for `(partition, key)`.
///
/// Fails with [`CacheError::InvalidArgument`] if either string is empty,
/// per the specification's "null/empty key or partition" rule (this crate
/// has no meaningful notion of "null" string, so empty stands in for it).
pub fn entry_hash(partition: &str, key: &str) -> Result<i64, CacheError> {
    if partition.is_empty() {
        return Err(CacheError::InvalidArgument(
            "partition must not be empty".into(),
        ));
    }
    if key.is_empty() {
        return Err(CacheError::InvalidArgument("key must not be empty".into()));
    }
    let upper = xxhash32_utf16le(partition) as u64;
    let lower = xxhash32_utf16le(key) as u64;
    Ok(((upper << 32) | lower) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_across_calls() {
        let h1 = entry_hash("partition", "key").unwrap();
        let h2 = entry_hash("partition", "key").unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn distinguishes_partition_and_key() {
        let h1 = entry_hash("p1", "k").unwrap();
        let h2 = entry_hash("p2", "k").unwrap();
        let h3 = entry_hash("p1", "k2").unwrap();
        assert_ne!(h1, h2);
        assert_ne!(h1, h3);
    }

    #[test]
    fn partition_hash_matches_upper_bits_of_entry_hash() {
        let ph = partition_hash("partition").unwrap();
        let eh = entry_hash("partition", "key").unwrap();
        assert_eq!(ph, eh & (0xFFFF_FFFF_0000_0000u64 as i64));
        assert_eq!(ph & 0xFFFF_FFFF, 0);
    }

    #[test]
    fn empty_partition_or_key_is_invalid_argument() {
        assert!(matches!(
            entry_hash("", "key"),
            Err(CacheError::InvalidArgument(_))
        ));
        assert!(matches!(
            entry_hash("partition", ""),
            Err(CacheError::InvalidArgument(_))
        ));
    }
}
