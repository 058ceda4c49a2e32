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

//! The transactional entry-store CRUD surface (§4.4): upsert, contains,
//! count, the touching `get`/batch `get_items`, `peek`/`peek_items`, remove,
//! clear, size-in-bytes and direct expiry updates.
//!
//! `EntryStore<D>` is generic over [`Driver`] rather than sitting atop an
//! abstract-cache / DB-cache / concrete-driver inheritance chain -- the
//! composition-over-inheritance design note in the module doc for
//! `crate::driver`.

use crate::driver::Driver;
use crate::entry::{CacheEntry, ExpiryMode, ParentKeys, MAX_PARENT_KEYS};
use crate::error::CacheError;
use crate::expiry;
use crate::hash::entry_hash;
use rusqlite::{OptionalExtension, Row, ToSql, Transaction};

/// A fully-resolved write: the primitive fields an [`EntryStore::upsert`]
/// call persists, after the facade has already run the codec and the expiry
/// engine.
#[derive(Debug, Clone)]
pub struct NewEntry<'a> {
    /// Partition the entry is written to.
    pub partition: &'a str,
    /// Key within `partition`.
    pub key: &'a str,
    /// Codec output to store.
    pub value: Vec<u8>,
    /// Whether `value` is gzip-compressed.
    pub compressed: bool,
    /// Absolute expiry to persist.
    pub utc_expiry: i64,
    /// 0 for timed, >0 for sliding/static.
    pub interval: i64,
    /// Current time, used as `utc_creation`.
    pub now: i64,
    /// Same-partition parent keys this entry depends on.
    pub parent_keys: &'a ParentKeys,
}

/// Transactional CRUD over the cache-entries table, generic over the
/// concrete [`Driver`] backing it.
#[derive(Debug)]
pub struct EntryStore<D: Driver> {
    driver: D,
    table: String,
}

impl<D: Driver> EntryStore<D> {
    /// Wrap `driver`, addressing the table named `table` (already
    /// schema-qualified if applicable; see
    /// [`crate::config::CacheSettings::qualified_table_name`]).
    pub fn new(driver: D, table: impl Into<String>) -> Self {
        Self {
            driver,
            table: table.into(),
        }
    }

    /// The underlying driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Insert or fully replace the row for `(entry.partition, entry.key)`.
    ///
    /// Uses SQLite's native `INSERT ... ON CONFLICT DO UPDATE` rather than
    /// the two-phase insert-then-update the specification sketches: both
    /// describe the same atomic "insert-or-replace" contract, and the
    /// single-statement form is what a driver actually reaching for
    /// `rusqlite` would write (see DESIGN.md for the parent-validation
    /// timing this implies).
    pub fn upsert(&self, entry: NewEntry<'_>) -> Result<i64, CacheError> {
        if entry.parent_keys.len() > MAX_PARENT_KEYS {
            return Err(CacheError::TooManyParents {
                supplied: entry.parent_keys.len(),
                max: MAX_PARENT_KEYS,
            });
        }
        let hash = entry_hash(entry.partition, entry.key)?;
        let mut parent_keys = [None, None, None, None, None];
        let mut parent_hashes = [None, None, None, None, None];
        for (i, parent_key) in entry.parent_keys.as_slice().iter().enumerate() {
            let parent_hash = entry_hash(entry.partition, parent_key)?;
            parent_keys[i] = Some(parent_key.clone());
            parent_hashes[i] = Some(parent_hash);
        }

        let table = self.table.clone();
        let partition = entry.partition.to_string();
        self.driver.with_tx(move |tx| {
            for (slot, maybe_hash) in parent_hashes.iter().enumerate() {
                let Some(parent_hash) = maybe_hash else {
                    continue;
                };
                let exists: Option<i64> = tx
                    .query_row(
                        &format!("SELECT 1 FROM {table} WHERE hash = ?1 AND partition = ?2"),
                        (parent_hash, &partition),
                        |row| row.get(0),
                    )
                    .optional()?;
                if exists.is_none() {
                    return Err(rusqlite::Error::ToSqlConversionFailure(Box::new(
                        crate::error::ParentMissingSignal {
                            partition: partition.clone(),
                            parent_key: parent_keys[slot]
                                .clone()
                                .unwrap_or_else(|| "<unknown>".to_string()),
                        },
                    )));
                }
            }

            let sql = format!(
                "INSERT INTO {table} (
                    hash, partition, key, utc_expiry, interval, value, compressed, utc_creation,
                    parent_key_0, parent_hash_0, parent_key_1, parent_hash_1,
                    parent_key_2, parent_hash_2, parent_key_3, parent_hash_3,
                    parent_key_4, parent_hash_4
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
                 ON CONFLICT(hash) DO UPDATE SET
                    utc_expiry = excluded.utc_expiry,
                    interval = excluded.interval,
                    value = excluded.value,
                    compressed = excluded.compressed,
                    utc_creation = excluded.utc_creation,
                    parent_key_0 = excluded.parent_key_0, parent_hash_0 = excluded.parent_hash_0,
                    parent_key_1 = excluded.parent_key_1, parent_hash_1 = excluded.parent_hash_1,
                    parent_key_2 = excluded.parent_key_2, parent_hash_2 = excluded.parent_hash_2,
                    parent_key_3 = excluded.parent_key_3, parent_hash_3 = excluded.parent_hash_3,
                    parent_key_4 = excluded.parent_key_4, parent_hash_4 = excluded.parent_hash_4"
            );
            tx.execute(
                &sql,
                rusqlite::params![
                    hash,
                    entry.partition,
                    entry.key,
                    entry.utc_expiry,
                    entry.interval,
                    entry.value,
                    entry.compressed,
                    entry.now,
                    parent_keys[0],
                    parent_hashes[0],
                    parent_keys[1],
                    parent_hashes[1],
                    parent_keys[2],
                    parent_hashes[2],
                    parent_keys[3],
                    parent_hashes[3],
                    parent_keys[4],
                    parent_hashes[4],
                ],
            )?;
            Ok(())
        })?;
        Ok(hash)
    }

    /// The parent keys stored on the row for `(partition, key)`, ignoring
    /// expiry -- used only to measure parent-key tree depth (§4.7), which is
    /// a structural property of the cascade graph rather than a
    /// user-observable read.
    fn parent_keys_of(&self, partition: &str, key: &str) -> Result<Option<Vec<String>>, CacheError> {
        let hash = entry_hash(partition, key)?;
        let table = self.table.clone();
        self.driver.with_tx(move |tx| {
            Ok(select_by_hash(tx, &table, hash)?.map(|e| e.parent_keys.as_slice().to_vec()))
        })
    }

    /// The depth of the parent-key tree that would result from writing an
    /// entry in `partition` with `parent_keys`: 0 if there are none, else 1
    /// plus the deepest chain of "parent of a parent" already on record.
    ///
    /// Stops early and returns `max_depth + 1` as soon as the bound is
    /// exceeded, so this never walks further than necessary on a
    /// pathologically deep (or cyclic, though §4.6 forbids creating one)
    /// chain.
    pub fn parent_tree_depth(
        &self,
        partition: &str,
        parent_keys: &ParentKeys,
        max_depth: usize,
    ) -> Result<usize, CacheError> {
        if parent_keys.is_empty() {
            return Ok(0);
        }
        let mut frontier: Vec<String> = parent_keys.as_slice().to_vec();
        let mut depth = 1;
        loop {
            if depth > max_depth {
                return Ok(depth);
            }
            let mut next = Vec::new();
            for key in &frontier {
                if let Some(grandparents) = self.parent_keys_of(partition, key)? {
                    next.extend(grandparents);
                }
            }
            if next.is_empty() {
                return Ok(depth);
            }
            depth += 1;
            frontier = next;
        }
    }

    /// True iff a row exists for `(partition, key)` and is currently
    /// observable. Never touches expiry.
    pub fn contains(&self, partition: &str, key: &str, now: i64) -> Result<bool, CacheError> {
        let hash = entry_hash(partition, key)?;
        let table = self.table.clone();
        self.driver.with_tx(move |tx| {
            let expiry: Option<i64> = tx
                .query_row(
                    &format!("SELECT utc_expiry FROM {table} WHERE hash = ?1"),
                    [hash],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(expiry.is_some_and(|e| now <= e))
        })
    }

    /// Count rows, optionally scoped to `partition`, honoring `mode`.
    pub fn count(
        &self,
        partition: Option<&str>,
        mode: ExpiryMode,
        now: i64,
    ) -> Result<u64, CacheError> {
        let table = self.table.clone();
        let partition = partition.map(str::to_string);
        self.driver.with_tx(move |tx| {
            let (clause, mut args) = where_clause(partition.as_deref(), mode, now);
            let sql = format!("SELECT COUNT(*) FROM {table} {clause}");
            let count: i64 = tx.query_row(&sql, rusqlite::params_from_iter(args.drain(..)), |row| {
                row.get(0)
            })?;
            Ok(count as u64)
        })
    }

    /// The touching read: select the row, returning `None` if absent or
    /// expired; if the row is sliding and observable, extend `utc_expiry`
    /// in the same transaction before returning the (pre-extension) value.
    pub fn get(&self, partition: &str, key: &str, now: i64) -> Result<Option<CacheEntry>, CacheError> {
        let hash = entry_hash(partition, key)?;
        let table = self.table.clone();
        self.driver.with_tx(move |tx| {
            let Some(mut entry) = select_by_hash(tx, &table, hash)? else {
                return Ok(None);
            };
            if !entry.is_observable(now) {
                return Ok(None);
            }
            if let Some(new_expiry) = expiry::touch(now, entry.interval, entry.utc_expiry) {
                tx.execute(
                    &format!("UPDATE {table} SET utc_expiry = ?1 WHERE hash = ?2"),
                    (new_expiry, hash),
                )?;
                entry.utc_expiry = new_expiry;
            }
            Ok(Some(entry))
        })
    }

    /// Select the row without ever extending its expiry. Fails with
    /// [`CacheError::NotSupported`] if the driver advertises
    /// `can_peek() == false`.
    pub fn peek(&self, partition: &str, key: &str, now: i64) -> Result<Option<CacheEntry>, CacheError> {
        if !self.driver.can_peek() {
            return Err(CacheError::NotSupported("peek".into()));
        }
        let hash = entry_hash(partition, key)?;
        let table = self.table.clone();
        self.driver.with_tx(move |tx| {
            let Some(entry) = select_by_hash(tx, &table, hash)? else {
                return Ok(None);
            };
            Ok(entry.is_observable(now).then_some(entry))
        })
    }

    /// Batch variant of [`EntryStore::get`]: touches every observable
    /// sliding row in a single transaction.
    pub fn get_items(&self, partition: Option<&str>, now: i64) -> Result<Vec<CacheEntry>, CacheError> {
        let table = self.table.clone();
        let partition = partition.map(str::to_string);
        self.driver.with_tx(move |tx| {
            let rows = select_all(tx, &table, partition.as_deref())?;
            let mut out = Vec::with_capacity(rows.len());
            for mut entry in rows {
                if !entry.is_observable(now) {
                    continue;
                }
                if let Some(new_expiry) = expiry::touch(now, entry.interval, entry.utc_expiry) {
                    tx.execute(
                        &format!("UPDATE {table} SET utc_expiry = ?1 WHERE hash = ?2"),
                        (new_expiry, entry.hash),
                    )?;
                    entry.utc_expiry = new_expiry;
                }
                out.push(entry);
            }
            Ok(out)
        })
    }

    /// Batch variant of [`EntryStore::peek`].
    pub fn peek_items(&self, partition: Option<&str>, now: i64) -> Result<Vec<CacheEntry>, CacheError> {
        if !self.driver.can_peek() {
            return Err(CacheError::NotSupported("peek_items".into()));
        }
        let table = self.table.clone();
        let partition = partition.map(str::to_string);
        self.driver.with_tx(move |tx| {
            let rows = select_all(tx, &table, partition.as_deref())?;
            Ok(rows.into_iter().filter(|e| e.is_observable(now)).collect())
        })
    }

    /// Delete the row for `(partition, key)`, cascading to dependents via
    /// the parent-hash foreign keys. Returns whether a row was deleted.
    pub fn remove(&self, partition: &str, key: &str) -> Result<bool, CacheError> {
        let hash = entry_hash(partition, key)?;
        let table = self.table.clone();
        self.driver.with_tx(move |tx| {
            let changed = tx.execute(&format!("DELETE FROM {table} WHERE hash = ?1"), [hash])?;
            Ok(changed > 0)
        })
    }

    /// Delete all rows (optionally scoped to `partition`) matched by
    /// `mode`, returning the number removed.
    ///
    /// `mode = IgnoreExpiry` deletes every matched row; `mode =
    /// ConsiderExpiry` deletes only rows that are currently expired.
    pub fn clear(&self, partition: Option<&str>, mode: ExpiryMode, now: i64) -> Result<u64, CacheError> {
        let table = self.table.clone();
        let partition = partition.map(str::to_string);
        self.driver.with_tx(move |tx| {
            let (clause, mut args) = delete_where_clause(partition.as_deref(), mode, now);
            let sql = format!("DELETE FROM {table} {clause}");
            let changed = tx.execute(&sql, rusqlite::params_from_iter(args.drain(..)))?;
            Ok(changed as u64)
        })
    }

    /// `SUM(LENGTH(value))` across the table, or `partition` if given.
    pub fn size_in_bytes(&self, partition: Option<&str>) -> Result<u64, CacheError> {
        let table = self.table.clone();
        let partition = partition.map(str::to_string);
        self.driver.with_tx(move |tx| {
            let sql = match &partition {
                Some(_) => format!("SELECT COALESCE(SUM(LENGTH(value)), 0) FROM {table} WHERE partition = ?1"),
                None => format!("SELECT COALESCE(SUM(LENGTH(value)), 0) FROM {table}"),
            };
            let total: i64 = match &partition {
                Some(p) => tx.query_row(&sql, [p], |row| row.get(0))?,
                None => tx.query_row(&sql, [], |row| row.get(0))?,
            };
            Ok(total as u64)
        })
    }

    /// Directly set `utc_expiry` for the row identified by `hash`, used by
    /// the refresh engine to implement touch without re-fetching the row.
    pub fn update_expiry(&self, hash: i64, new_expiry: i64) -> Result<(), CacheError> {
        let table = self.table.clone();
        self.driver.with_tx(move |tx| {
            tx.execute(
                &format!("UPDATE {table} SET utc_expiry = ?1 WHERE hash = ?2"),
                (new_expiry, hash),
            )?;
            Ok(())
        })
    }
}

fn where_clause(
    partition: Option<&str>,
    mode: ExpiryMode,
    now: i64,
) -> (String, Vec<SqlArg>) {
    let mut clauses = Vec::new();
    let mut args = Vec::new();
    if let Some(p) = partition {
        clauses.push(format!("partition = ?{}", args.len() + 1));
        args.push(SqlArg::Text(p.to_string()));
    }
    if matches!(mode, ExpiryMode::ConsiderExpiry) {
        clauses.push(format!("utc_expiry >= ?{}", args.len() + 1));
        args.push(SqlArg::Int(now));
    }
    if clauses.is_empty() {
        (String::new(), args)
    } else {
        (format!("WHERE {}", clauses.join(" AND ")), args)
    }
}

fn delete_where_clause(
    partition: Option<&str>,
    mode: ExpiryMode,
    now: i64,
) -> (String, Vec<SqlArg>) {
    let mut clauses = Vec::new();
    let mut args = Vec::new();
    if let Some(p) = partition {
        clauses.push(format!("partition = ?{}", args.len() + 1));
        args.push(SqlArg::Text(p.to_string()));
    }
    if matches!(mode, ExpiryMode::ConsiderExpiry) {
        clauses.push(format!("utc_expiry < ?{}", args.len() + 1));
        args.push(SqlArg::Int(now));
    }
    if clauses.is_empty() {
        (String::new(), args)
    } else {
        (format!("WHERE {}", clauses.join(" AND ")), args)
    }
}

#[derive(Debug, Clone)]
enum SqlArg {
    Text(String),
    Int(i64),
}

impl ToSql for SqlArg {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        match self {
            SqlArg::Text(s) => s.to_sql(),
            SqlArg::Int(i) => i.to_sql(),
        }
    }
}

const ALL_COLUMNS: &str = "hash, partition, key, utc_expiry, interval, value, compressed, utc_creation, \
     parent_key_0, parent_key_1, parent_key_2, parent_key_3, parent_key_4";

fn select_by_hash(tx: &Transaction, table: &str, hash: i64) -> rusqlite::Result<Option<CacheEntry>> {
    tx.query_row(
        &format!("SELECT {ALL_COLUMNS} FROM {table} WHERE hash = ?1"),
        [hash],
        row_to_entry,
    )
    .optional()
}

fn select_all(
    tx: &Transaction,
    table: &str,
    partition: Option<&str>,
) -> rusqlite::Result<Vec<CacheEntry>> {
    let sql = match partition {
        Some(_) => format!("SELECT {ALL_COLUMNS} FROM {table} WHERE partition = ?1"),
        None => format!("SELECT {ALL_COLUMNS} FROM {table}"),
    };
    let mut stmt = tx.prepare(&sql)?;
    let rows = match partition {
        Some(p) => stmt.query_map([p], row_to_entry)?.collect::<rusqlite::Result<Vec<_>>>(),
        None => stmt.query_map([], row_to_entry)?.collect::<rusqlite::Result<Vec<_>>>(),
    };
    rows
}

fn row_to_entry(row: &Row) -> rusqlite::Result<CacheEntry> {
    let mut keys = Vec::new();
    for i in 0..MAX_PARENT_KEYS {
        let key: Option<String> = row.get(8 + i)?;
        if let Some(key) = key {
            keys.push(key);
        }
    }
    Ok(CacheEntry {
        hash: row.get(0)?,
        partition: row.get(1)?,
        key: row.get(2)?,
        utc_expiry: row.get(3)?,
        interval: row.get(4)?,
        value: row.get(5)?,
        compressed: row.get(6)?,
        utc_creation: row.get(7)?,
        parent_keys: ParentKeys::new(keys, MAX_PARENT_KEYS)
            .expect("a row's own parent-key count never exceeds the driver's slot count"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheSettings;
    use crate::driver::sqlite::SqliteDriver;

    fn store() -> EntryStore<SqliteDriver> {
        let settings = CacheSettings::builder("test").unwrap().build().unwrap();
        let driver = SqliteDriver::memory(&settings).unwrap();
        EntryStore::new(driver, settings.qualified_table_name())
    }

    /// A file-backed store, for tests that exercise `peek`/`peek_items`:
    /// the in-memory driver advertises `can_peek() == false` (§4.4/§7).
    fn file_store(name: &str) -> (EntryStore<SqliteDriver>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let settings = CacheSettings::builder(name).unwrap().build().unwrap();
        let driver = SqliteDriver::file(dir.path().join("kvlite.sqlite3"), &settings).unwrap();
        (EntryStore::new(driver, settings.qualified_table_name()), dir)
    }

    fn entry<'a>(partition: &'a str, key: &'a str, value: &str, parents: &'a ParentKeys) -> NewEntry<'a> {
        NewEntry {
            partition,
            key,
            value: value.as_bytes().to_vec(),
            compressed: false,
            utc_expiry: 100,
            interval: 0,
            now: 0,
            parent_keys: parents,
        }
    }

    #[test]
    fn upsert_then_get_round_trips() {
        let store = store();
        let none = ParentKeys::none();
        store.upsert(entry("p", "k", "v1", &none)).unwrap();
        let got = store.get("p", "k", 0).unwrap().unwrap();
        assert_eq!(got.value, b"v1");
    }

    #[test]
    fn upsert_replaces_existing_row() {
        let store = store();
        let none = ParentKeys::none();
        store.upsert(entry("p", "k", "v1", &none)).unwrap();
        store.upsert(entry("p", "k", "v2", &none)).unwrap();
        assert_eq!(store.count(None, ExpiryMode::IgnoreExpiry, 0).unwrap(), 1);
        let got = store.get("p", "k", 0).unwrap().unwrap();
        assert_eq!(got.value, b"v2");
    }

    #[test]
    fn get_on_expired_row_is_a_miss() {
        let store = store();
        let none = ParentKeys::none();
        store.upsert(entry("p", "k", "v1", &none)).unwrap();
        assert!(store.get("p", "k", 101).unwrap().is_none());
        assert!(!store.contains("p", "k", 101).unwrap());
    }

    #[test]
    fn sliding_get_extends_expiry_but_peek_never_does() {
        let (store, _dir) = file_store("sliding-peek");
        let none = ParentKeys::none();
        let mut e = entry("p", "k", "v1", &none);
        e.interval = 10;
        e.utc_expiry = 10;
        store.upsert(e).unwrap();
        store.get("p", "k", 7).unwrap();
        let peeked = store.peek("p", "k", 7).unwrap().unwrap();
        assert_eq!(peeked.utc_expiry, 17);
    }

    #[test]
    fn peek_on_the_in_memory_driver_is_not_supported() {
        let store = store();
        let none = ParentKeys::none();
        store.upsert(entry("p", "k", "v1", &none)).unwrap();
        let err = store.peek("p", "k", 0).unwrap_err();
        assert!(matches!(err, CacheError::NotSupported(_)));
        let err = store.peek_items(Some("p"), 0).unwrap_err();
        assert!(matches!(err, CacheError::NotSupported(_)));
    }

    #[test]
    fn parent_tree_depth_walks_the_chain() {
        let store = store();
        let none = ParentKeys::none();
        store.upsert(entry("p", "grandparent", "1", &none)).unwrap();
        let one_up = ParentKeys::new(vec!["grandparent".to_string()], MAX_PARENT_KEYS).unwrap();
        store.upsert(entry("p", "parent", "2", &one_up)).unwrap();
        let two_up = ParentKeys::new(vec!["parent".to_string()], MAX_PARENT_KEYS).unwrap();

        assert_eq!(store.parent_tree_depth("p", &none, 10).unwrap(), 0);
        assert_eq!(store.parent_tree_depth("p", &one_up, 10).unwrap(), 1);
        assert_eq!(store.parent_tree_depth("p", &two_up, 10).unwrap(), 2);
    }

    #[test]
    fn parent_tree_depth_stops_at_the_bound() {
        let store = store();
        let none = ParentKeys::none();
        store.upsert(entry("p", "grandparent", "1", &none)).unwrap();
        let one_up = ParentKeys::new(vec!["grandparent".to_string()], MAX_PARENT_KEYS).unwrap();
        store.upsert(entry("p", "parent", "2", &one_up)).unwrap();
        let two_up = ParentKeys::new(vec!["parent".to_string()], MAX_PARENT_KEYS).unwrap();

        assert_eq!(store.parent_tree_depth("p", &two_up, 1).unwrap(), 2);
    }

    #[test]
    fn parent_cascade_removes_children() {
        let store = store();
        let none = ParentKeys::none();
        store.upsert(entry("p", "parent", "1", &none)).unwrap();
        let parents = ParentKeys::new(vec!["parent".to_string()], MAX_PARENT_KEYS).unwrap();
        store.upsert(entry("p", "child", "2", &parents)).unwrap();
        store.remove("p", "parent").unwrap();
        assert!(!store.contains("p", "child", 0).unwrap());
    }

    #[test]
    fn upsert_with_missing_parent_fails() {
        let store = store();
        let parents = ParentKeys::new(vec!["nope".to_string()], MAX_PARENT_KEYS).unwrap();
        let err = store.upsert(entry("p", "child", "v", &parents)).unwrap_err();
        assert!(matches!(err, CacheError::ParentMissing { .. }));
    }

    #[test]
    fn partition_scoped_count() {
        let store = store();
        let none = ParentKeys::none();
        for k in ["a1", "a2", "a3"] {
            store.upsert(entry("A", k, "v", &none)).unwrap();
        }
        for k in ["b1", "b2"] {
            store.upsert(entry("B", k, "v", &none)).unwrap();
        }
        assert_eq!(store.count(None, ExpiryMode::IgnoreExpiry, 0).unwrap(), 5);
        assert_eq!(store.count(Some("A"), ExpiryMode::IgnoreExpiry, 0).unwrap(), 3);
        assert_eq!(store.count(Some("B"), ExpiryMode::IgnoreExpiry, 0).unwrap(), 2);
    }

    #[test]
    fn clear_with_consider_expiry_removes_only_expired_rows() {
        let store = store();
        let none = ParentKeys::none();
        let mut fresh = entry("p", "fresh", "v", &none);
        fresh.utc_expiry = 1000;
        store.upsert(fresh).unwrap();
        let mut stale = entry("p", "stale", "v", &none);
        stale.utc_expiry = 1;
        store.upsert(stale).unwrap();

        let removed = store.clear(None, ExpiryMode::ConsiderExpiry, 50).unwrap();
        assert_eq!(removed, 1);
        assert!(store.contains("p", "fresh", 50).unwrap());
        assert!(!store.contains("p", "stale", 50).unwrap());
    }

    #[test]
    fn clear_is_idempotent() {
        let store = store();
        let none = ParentKeys::none();
        let mut stale = entry("p", "stale", "v", &none);
        stale.utc_expiry = 1;
        store.upsert(stale).unwrap();

        assert_eq!(store.clear(None, ExpiryMode::ConsiderExpiry, 50).unwrap(), 1);
        assert_eq!(store.clear(None, ExpiryMode::ConsiderExpiry, 50).unwrap(), 0);
    }

    #[test]
    fn size_in_bytes_sums_value_lengths() {
        let store = store();
        let none = ParentKeys::none();
        store.upsert(entry("p", "k1", "abcd", &none)).unwrap();
        store.upsert(entry("p", "k2", "xy", &none)).unwrap();
        assert_eq!(store.size_in_bytes(None).unwrap(), 6);
    }

    #[test]
    fn get_items_touches_every_sliding_row_in_partition() {
        let store = store();
        let none = ParentKeys::none();
        let mut e1 = entry("p", "k1", "v", &none);
        e1.interval = 10;
        e1.utc_expiry = 10;
        store.upsert(e1).unwrap();
        let mut e2 = entry("p", "k2", "v", &none);
        e2.interval = 10;
        e2.utc_expiry = 10;
        store.upsert(e2).unwrap();

        let items = store.get_items(Some("p"), 5).unwrap();
        assert_eq!(items.len(), 2);
        for item in items {
            assert_eq!(item.utc_expiry, 15);
        }
    }

    #[test]
    fn update_expiry_sets_the_row_directly() {
        let (store, _dir) = file_store("update-expiry");
        let none = ParentKeys::none();
        let hash = store.upsert(entry("p", "k", "v", &none)).unwrap();
        store.update_expiry(hash, 999).unwrap();
        let got = store.peek("p", "k", 0).unwrap().unwrap();
        assert_eq!(got.utc_expiry, 999);
    }
}
