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

//! The connection-factory abstraction (§4.3, §6 "Driver surface"): opening
//! and configuring connections, ensuring the schema exists, and exposing a
//! `vacuum` hook, all behind a trait so [`crate::store::EntryStore`] is
//! generic over the concrete database.

#[cfg(feature = "sqlite")]
pub mod sqlite;

use crate::error::CacheError;
use rusqlite::Transaction;

/// Capabilities and connection management for a concrete database driver.
///
/// Mirrors the composition-over-inheritance design note: rather than an
/// abstract cache / DB cache / concrete driver inheritance chain,
/// [`crate::store::EntryStore`] is generic over any `Driver` implementation.
pub trait Driver: std::fmt::Debug + Send + Sync {
    /// The (possibly redacted) connection string this driver was opened
    /// with.
    fn connection_string(&self) -> &str;

    /// Whether this driver supports [`crate::store::EntryStore::peek`] and
    /// [`crate::store::EntryStore::peek_items`]. Per §4.4/§7,
    /// [`crate::driver::sqlite::SqliteDriver::memory`] advertises `false`;
    /// [`crate::driver::sqlite::SqliteDriver::file`] advertises `true`.
    fn can_peek(&self) -> bool;

    /// Run `f` inside a single transaction against a pooled connection,
    /// committing on success.
    ///
    /// This is the one chokepoint all entry-store operations go through,
    /// matching `SqlDB::with_tx` in the teacher this crate is grounded on:
    /// every statement in a single logical operation shares one
    /// transaction, so partial rows are never observable.
    fn with_tx<F, R>(&self, f: F) -> Result<R, CacheError>
    where
        F: FnOnce(&Transaction) -> rusqlite::Result<R>;

    /// Create the cache-entries table and its indexes if they don't already
    /// exist, and verify the existing schema has the expected columns.
    fn ensure_schema(&self) -> Result<(), CacheError>;

    /// Run `VACUUM` against the underlying database.
    fn vacuum(&self) -> Result<(), CacheError>;
}

/// Translate a `rusqlite::Error` into a [`CacheError`], distinguishing
/// transient faults (busy/locked) from terminal ones.
pub(crate) fn classify_sqlite_error(err: rusqlite::Error) -> CacheError {
    use crate::error::ParentMissingSignal;
    use rusqlite::ffi::ErrorCode;
    use rusqlite::Error::{SqliteFailure, ToSqlConversionFailure};

    match &err {
        ToSqlConversionFailure(boxed) => {
            if let Some(signal) = boxed.downcast_ref::<ParentMissingSignal>() {
                return CacheError::ParentMissing {
                    partition: signal.partition.clone(),
                    parent_key: signal.parent_key.clone(),
                };
            }
            CacheError::SchemaError(err.to_string())
        }
        SqliteFailure(e, _)
            if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
        {
            CacheError::Transient(err.to_string())
        }
        SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
            // A foreign-key violation that store.rs's own pre-validation
            // (which raises a `ParentMissingSignal` instead) didn't catch --
            // e.g. a parent deleted concurrently between that check and
            // this statement's execution.
            CacheError::ParentMissing {
                partition: String::new(),
                parent_key: String::new(),
            }
        }
        _ => CacheError::SchemaError(err.to_string()),
    }
}
