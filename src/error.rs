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

//! The error taxonomy described in the storage engine's error handling
//! design: a kind per failure mode, not a single opaque error string.

use thiserror::Error;

/// Errors produced by the storage engine.
///
/// `Transient` and `SchemaError` are not user mistakes: `Transient` is
/// recorded in [`crate::cache::Cache::last_error`] and swallowed into a safe
/// default by the facade, while `SchemaError` is fatal to the operation that
/// triggered it. Every other variant is surfaced directly to the caller.
#[derive(Debug, Error, Clone)]
pub enum CacheError {
    /// A null/empty key or partition, an invalid cache name, or a negative
    /// lifetime was supplied.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The codec could not serialize the supplied value.
    #[error("value is not serializable: {0}")]
    NotSerializable(String),

    /// The codec could not deserialize a stored blob back into the
    /// requested type.
    #[error("deserialization failed: {0}")]
    DeserializationFailed(String),

    /// More parent keys were supplied than the driver supports.
    #[error("too many parent keys: {supplied} supplied, driver allows at most {max}")]
    TooManyParents {
        /// Number of parent keys the caller supplied.
        supplied: usize,
        /// The driver's capability limit.
        max: usize,
    },

    /// A referenced parent key does not exist in the same partition.
    #[error("parent key {parent_key:?} does not exist in partition {partition:?}")]
    ParentMissing {
        /// The partition the child (and its parent) were written to.
        partition: String,
        /// The missing parent key.
        parent_key: String,
    },

    /// The operation is not supported by the configured driver (e.g. `Peek`
    /// on a driver that advertises `can_peek = false`).
    #[error("operation not supported by this driver: {0}")]
    NotSupported(String),

    /// A transient database fault (busy, locked, timed out). Read
    /// operations convert this into a miss; write operations convert it
    /// into a silently-dropped write, after logging.
    #[error("transient database error: {0}")]
    Transient(String),

    /// The on-disk schema is missing or does not match what this engine
    /// expects.
    #[error("schema error: {0}")]
    SchemaError(String),

    /// The cache has been disposed and can no longer be used.
    #[error("cache has been disposed")]
    Disposed,
}

impl CacheError {
    /// True for the error kinds the facade swallows into a safe default
    /// rather than surfacing to the caller (see §7 of the specification).
    pub fn is_transient(&self) -> bool {
        matches!(self, CacheError::Transient(_))
    }
}

/// Carries a would-be [`CacheError::ParentMissing`] through a
/// `rusqlite::Result` so `store.rs`'s parent-existence check, which runs
/// inside a closure bounded to `rusqlite::Result`, can still produce a
/// precise error once `driver::classify_sqlite_error` unwraps it.
#[derive(Debug)]
pub(crate) struct ParentMissingSignal {
    pub partition: String,
    pub parent_key: String,
}

impl std::fmt::Display for ParentMissingSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "parent key {:?} does not exist in partition {:?}",
            self.parent_key, self.partition
        )
    }
}

impl std::error::Error for ParentMissingSignal {}

/// `Some(value)` on a hit, `None` on a miss or swallowed transient fault.
///
/// Unlike [`Result`], a `CacheResult` never represents a surfaced error: by
/// the time a read reaches the facade boundary, every non-fatal failure has
/// already been funneled into `None` plus a recorded [`CacheError`].
pub type CacheResult<T> = Option<T>;
