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

//! A [`Driver`] backed by SQLite, via `rusqlite` and a pooled
//! `r2d2_sqlite::SqliteConnectionManager`.
//!
//! Two constructors are exposed: [`SqliteDriver::file`] for the default
//! persistent driver (WAL journaling, a real path on disk) and
//! [`SqliteDriver::memory`] for the volatile, in-process variant (a single
//! keep-alive connection to a `:memory:` database -- dropping the driver
//! destroys every entry).
//!
//! We reach for the bare `rusqlite` crate rather than a full ORM for the
//! same reason the storage engine this crate is modeled on does: our SQL
//! surface is five hand-written statements per operation, nothing an ORM
//! would meaningfully simplify.

use super::{classify_sqlite_error, Driver};
use crate::config::CacheSettings;
use crate::error::CacheError;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{config::DbConfig::SQLITE_DBCONFIG_ENABLE_FKEY, Connection, Transaction};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// A [`Driver`] implementation backed by SQLite.
#[derive(Debug)]
pub struct SqliteDriver {
    pool: Pool<SqliteConnectionManager>,
    connection_string: String,
    table_name: String,
    can_peek: bool,
}

impl SqliteDriver {
    /// Open (creating if necessary) a persistent, file-backed database.
    ///
    /// The parent directory is created if it doesn't exist; the file
    /// itself is created by SQLite on first connection. Journal mode is
    /// WAL, which is faster for both concurrent and non-concurrent
    /// workloads than the SQLite default.
    pub fn file<P: AsRef<Path>>(path: P, settings: &CacheSettings) -> Result<Self, CacheError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| CacheError::SchemaError(format!("creating {parent:?}: {e}")))?;
            }
        }
        let connection_string = path.to_string_lossy().into_owned();
        let cm = SqliteConnectionManager::file(path);
        Self::new(cm, connection_string, settings, "WAL", None, true)
    }

    /// Open a volatile, in-process database.
    ///
    /// Backed by a single pooled connection (`max_size(1)`) to a
    /// `:memory:` database: rusqlite/r2d2 hand out a fresh, independent
    /// `:memory:` database per physical connection, so capping the pool at
    /// one connection is what makes this a single shared, "keep-alive"
    /// database rather than a different empty database per borrow. Dropping
    /// the returned driver drops that connection, and with it every entry.
    ///
    /// Advertises `can_peek() == false`, matching §4.4/§7's documented
    /// `NotSupported` error for `Peek`/`PeekItems` against the in-memory
    /// driver.
    pub fn memory(settings: &CacheSettings) -> Result<Self, CacheError> {
        let cm = SqliteConnectionManager::memory();
        Self::new(cm, ":memory:".to_string(), settings, "MEMORY", Some(1), false)
    }

    fn new(
        cm: SqliteConnectionManager,
        connection_string: String,
        settings: &CacheSettings,
        default_journal_mode: &str,
        max_pool_size: Option<u32>,
        can_peek: bool,
    ) -> Result<Self, CacheError> {
        let journal_mode =
            std::env::var("KVLITE_SQL_JOURNAL_MODE").unwrap_or_else(|_| default_journal_mode.to_string());
        let synchronous: u32 = std::env::var("KVLITE_SQL_SYNCHRONOUS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let busy_timeout_ms: u64 = std::env::var("KVLITE_SQL_BUSY_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10_000);

        let init = move |conn: &mut Connection| {
            assert!(
                conn.set_db_config(SQLITE_DBCONFIG_ENABLE_FKEY, true)?,
                "foreign keys are not supported by this sqlite build"
            );
            conn.pragma_update(None, "synchronous", synchronous)?;
            conn.pragma_update(None, "journal_mode", journal_mode.clone())?;
            conn.busy_timeout(Duration::from_millis(busy_timeout_ms))
        };
        let mut builder = Pool::builder();
        if let Some(max_size) = max_pool_size {
            builder = builder.max_size(max_size);
        }
        let pool = builder
            .build(cm.with_init(init))
            .map_err(|e| CacheError::SchemaError(format!("opening connection pool: {e}")))?;

        let driver = SqliteDriver {
            pool,
            connection_string,
            table_name: settings.qualified_table_name(),
            can_peek,
        };
        driver.ensure_schema()?;
        Ok(driver)
    }

    fn with_read_tx<F, R>(&self, f: F) -> Result<R, CacheError>
    where
        F: FnOnce(&Transaction) -> rusqlite::Result<R>,
    {
        self.with_tx_behavior(rusqlite::TransactionBehavior::Deferred, f)
    }

    fn with_write_tx<F, R>(&self, f: F) -> Result<R, CacheError>
    where
        F: FnOnce(&Transaction) -> rusqlite::Result<R>,
    {
        self.with_tx_behavior(rusqlite::TransactionBehavior::Immediate, f)
    }

    fn with_tx_behavior<F, R>(
        &self,
        behavior: rusqlite::TransactionBehavior,
        f: F,
    ) -> Result<R, CacheError>
    where
        F: FnOnce(&Transaction) -> rusqlite::Result<R>,
    {
        let span = tracing::debug_span!(
            "kvlite_sqlite_tx",
            table = %self.table_name,
            behavior = ?behavior,
        );
        let _guard = span.enter();

        let mut conn = self.pool.get().map_err(|e| {
            tracing::warn!(error = %e, "failed to acquire pooled sqlite connection");
            CacheError::Transient(e.to_string())
        })?;
        let tx = conn
            .transaction_with_behavior(behavior)
            .map_err(classify_sqlite_error)?;
        let result = f(&tx).map_err(|e| {
            tracing::warn!(error = %e, "sqlite operation failed");
            classify_sqlite_error(e)
        })?;
        tx.commit().map_err(classify_sqlite_error)?;
        Ok(result)
    }

    /// Columns expected in the cache-entries table, for schema verification.
    fn expected_columns(&self) -> Vec<&'static str> {
        let mut cols = vec![
            "hash",
            "partition",
            "key",
            "utc_expiry",
            "interval",
            "value",
            "compressed",
            "utc_creation",
        ];
        for i in 0..crate::entry::MAX_PARENT_KEYS {
            cols.push(match i {
                0 => "parent_key_0",
                1 => "parent_key_1",
                2 => "parent_key_2",
                3 => "parent_key_3",
                _ => "parent_key_4",
            });
            cols.push(match i {
                0 => "parent_hash_0",
                1 => "parent_hash_1",
                2 => "parent_hash_2",
                3 => "parent_hash_3",
                _ => "parent_hash_4",
            });
        }
        cols
    }
}

impl Driver for SqliteDriver {
    fn connection_string(&self) -> &str {
        &self.connection_string
    }

    fn can_peek(&self) -> bool {
        self.can_peek
    }

    fn with_tx<F, R>(&self, f: F) -> Result<R, CacheError>
    where
        F: FnOnce(&Transaction) -> rusqlite::Result<R>,
    {
        // Callers that only read should prefer `with_read_tx` directly
        // (non-exclusive); this trait method is used by `store.rs` call
        // sites that mix both, so default to a write transaction, which is
        // always safe, only slower for pure reads.
        self.with_write_tx(f)
    }

    fn ensure_schema(&self) -> Result<(), CacheError> {
        let table = self.table_name.clone();
        self.with_write_tx(move |tx| {
            let mut parent_cols = String::new();
            for i in 0..crate::entry::MAX_PARENT_KEYS {
                parent_cols.push_str(&format!(
                    ", parent_key_{i} TEXT, parent_hash_{i} INTEGER \
                     REFERENCES {table}(hash) ON DELETE CASCADE"
                ));
            }
            let sql = format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    hash INTEGER NOT NULL PRIMARY KEY,
                    partition TEXT NOT NULL,
                    key TEXT NOT NULL,
                    utc_expiry INTEGER NOT NULL,
                    interval INTEGER NOT NULL,
                    value BLOB NOT NULL,
                    compressed INTEGER NOT NULL,
                    utc_creation INTEGER NOT NULL
                    {parent_cols}
                 )"
            );
            tx.execute(&sql, ())?;
            tx.execute(
                &format!(
                    "CREATE INDEX IF NOT EXISTS ix_{table}_expiry_partition \
                     ON {table} (utc_expiry, partition)"
                ),
                (),
            )?;
            for i in 0..crate::entry::MAX_PARENT_KEYS {
                tx.execute(
                    &format!(
                        "CREATE INDEX IF NOT EXISTS ix_{table}_parent_hash_{i} \
                         ON {table} (parent_hash_{i})"
                    ),
                    (),
                )?;
            }
            Ok(())
        })?;

        // Verify the (possibly pre-existing) schema has the columns we
        // expect before we trust it with reads/writes.
        let actual: Vec<String> = self.with_read_tx(move |tx| {
            let mut stmt = tx.prepare(&format!("PRAGMA table_info({table})"))?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
            rows.collect()
        })?;
        let expected = self.expected_columns();
        for col in &expected {
            if !actual.iter().any(|c| c == col) {
                return Err(CacheError::SchemaError(format!(
                    "table {} is missing expected column {col}",
                    self.table_name
                )));
            }
        }
        Ok(())
    }

    fn vacuum(&self) -> Result<(), CacheError> {
        let conn = self.pool.get().map_err(|e| CacheError::Transient(e.to_string()))?;
        conn.execute_batch("VACUUM").map_err(classify_sqlite_error)
    }
}
