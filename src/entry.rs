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

//! The `CacheEntry` data model (§3 of the specification).

use crate::error::CacheError;

/// The number of parent-key slots a single entry carries (the SQLite
/// driver's limit; see `max_parent_key_count_per_item` on
/// [`crate::config::CacheSettings`]).
pub const MAX_PARENT_KEYS: usize = 5;

/// Up to [`MAX_PARENT_KEYS`] same-partition parent keys for an entry.
///
/// Deleting any of these parent entries transitively deletes the child
/// (§4.6 parent-key cascade).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParentKeys(Vec<String>);

impl ParentKeys {
    /// An entry with no parents.
    pub fn none() -> Self {
        Self(Vec::new())
    }

    /// Build a parent-key list, failing with [`CacheError::TooManyParents`]
    /// if more than `max` keys are supplied, or
    /// [`CacheError::InvalidArgument`] if any key is empty.
    pub fn new(keys: Vec<String>, max: usize) -> Result<Self, CacheError> {
        if keys.len() > max {
            return Err(CacheError::TooManyParents {
                supplied: keys.len(),
                max,
            });
        }
        if keys.iter().any(|k| k.is_empty()) {
            return Err(CacheError::InvalidArgument(
                "parent key must not be empty".into(),
            ));
        }
        Ok(Self(keys))
    }

    /// The parent keys, in slot order.
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Number of parent keys present.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if there are no parent keys.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A single logical cache record, as stored in `kvl_cache_entries`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// 64-bit identity, a pure function of `(partition, key)`.
    pub hash: i64,
    /// The partition this entry belongs to.
    pub partition: String,
    /// The key within `partition`.
    pub key: String,
    /// Seconds since the Unix epoch at which this entry becomes invisible.
    pub utc_expiry: i64,
    /// 0 for a timed (absolute) entry; > 0 for a sliding entry, in which
    /// case it is the number of seconds an observing read extends
    /// `utc_expiry` by.
    pub interval: i64,
    /// The codec-produced bytes (possibly gzip-compressed).
    pub value: Vec<u8>,
    /// Whether `value` is gzip-compressed.
    pub compressed: bool,
    /// Seconds since the Unix epoch at which this entry was created (or
    /// last upserted).
    pub utc_creation: i64,
    /// Same-partition parent keys whose removal cascades to this entry.
    pub parent_keys: ParentKeys,
}

impl CacheEntry {
    /// True iff `now <= utc_expiry`, i.e. this entry is still observable
    /// (§3 invariant 5).
    pub fn is_observable(&self, now: i64) -> bool {
        now <= self.utc_expiry
    }
}

/// Whether a counting/clearing operation should consider entry expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryMode {
    /// Count or delete every matching row, expired or not.
    IgnoreExpiry,
    /// Count or delete only rows that are currently observable
    /// (`Count`) or currently expired (`Clear`) -- see the operation's own
    /// documentation for which direction applies.
    ConsiderExpiry,
}
