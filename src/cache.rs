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

//! [`Cache`]: the public facade (§4.7) over [`EntryStore`] -- argument
//! validation, error swallowing into [`Cache::last_error`], probabilistic
//! soft cleanup, and (behind the `async` feature) an async mirror built the
//! way `midnight-proof-server` wraps blocking work in
//! `tokio::task::spawn_blocking`.

use crate::clock::{Clock, SystemClock};
use crate::codec::Codec;
use crate::config::CacheSettings;
use crate::driver::Driver;
use crate::entry::{ExpiryMode, ParentKeys};
use crate::error::CacheError;
use crate::expiry::Lifetime;
use crate::hash::entry_hash;
use crate::store::{EntryStore, NewEntry};
use parking_lot::Mutex;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// The public, thread-safe handle onto a KVLite cache.
///
/// Cheap to clone: everything it owns is already behind an `Arc` or is
/// itself a pooled handle (the SQLite driver's `r2d2::Pool`).
#[derive(Debug)]
pub struct Cache<D: Driver> {
    store: Arc<EntryStore<D>>,
    settings: CacheSettings,
    clock: Arc<dyn Clock>,
    codec: Codec,
    last_error: Mutex<Option<CacheError>>,
}

impl<D: Driver> Clone for Cache<D> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            settings: self.settings.clone(),
            clock: self.clock.clone(),
            codec: self.codec,
            last_error: Mutex::new(self.last_error.lock().clone()),
        }
    }
}

impl<D: Driver> Cache<D> {
    /// Build a cache over `driver`, using the real system clock and the
    /// JSON codec.
    pub fn new(driver: D, settings: CacheSettings) -> Self {
        Self::with_clock(driver, settings, Arc::new(SystemClock))
    }

    /// As [`Cache::new`], but with an explicit [`Clock`] -- for tests that
    /// drive the scenarios in §8 of the specification deterministically.
    pub fn with_clock(driver: D, settings: CacheSettings, clock: Arc<dyn Clock>) -> Self {
        let table = settings.qualified_table_name();
        Self {
            store: Arc::new(EntryStore::new(driver, table)),
            settings,
            clock,
            codec: Codec::default(),
            last_error: Mutex::new(None),
        }
    }

    /// Use a specific [`Codec`] instead of the default JSON one.
    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    /// The settings this cache was constructed with.
    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// The most recent [`CacheError`] swallowed by this facade (a transient
    /// database fault encountered by a read or write), if any.
    pub fn last_error(&self) -> Option<CacheError> {
        self.last_error.lock().clone()
    }

    fn record(&self, err: CacheError) {
        tracing::warn!(error = %err, "kvlite: swallowing transient error");
        *self.last_error.lock() = Some(err);
    }

    /// Resolve a caller-supplied partition against
    /// [`CacheSettings::default_partition`] -- `Some("")` and `None` both
    /// fall back to the configured default; a non-empty partition is used
    /// as-is.
    pub fn resolve_partition<'a>(&'a self, partition: Option<&'a str>) -> &'a str {
        match partition {
            Some(p) if !p.is_empty() => p,
            _ => self.settings.default_partition(),
        }
    }

    fn validate(&self, partition: &str, key: &str) -> Result<(), CacheError> {
        if partition.is_empty() {
            return Err(CacheError::InvalidArgument(
                "partition must not be empty".into(),
            ));
        }
        if key.is_empty() {
            return Err(CacheError::InvalidArgument("key must not be empty".into()));
        }
        Ok(())
    }

    /// Serialize `value` and write it under `(partition, key)`, replacing
    /// any existing entry. Fails with `TooManyParents`/`ParentMissing` per
    /// §4.6, or `NotSerializable` if the codec rejects `value`.
    pub fn add<T: Serialize>(
        &self,
        partition: &str,
        key: &str,
        value: &T,
        lifetime: Lifetime,
        parent_keys: ParentKeys,
    ) -> Result<(), CacheError> {
        self.validate(partition, key)?;
        if parent_keys.len() > self.settings.max_parent_key_count_per_item() {
            return Err(CacheError::TooManyParents {
                supplied: parent_keys.len(),
                max: self.settings.max_parent_key_count_per_item(),
            });
        }
        let max_depth = self.settings.max_parent_key_tree_depth();
        let depth = self.store.parent_tree_depth(partition, &parent_keys, max_depth)?;
        if depth > max_depth {
            return Err(CacheError::InvalidArgument(format!(
                "parent key tree depth {depth} exceeds max_parent_key_tree_depth {max_depth}"
            )));
        }
        let now = self.clock.now_unix();
        let spec = lifetime.resolve(now, &self.settings)?;
        let (bytes, compressed) = self
            .codec
            .encode(value, self.settings.min_value_length_for_compression())?;

        let result = self.store.upsert(NewEntry {
            partition,
            key,
            value: bytes,
            compressed,
            utc_expiry: spec.utc_expiry,
            interval: spec.interval,
            now,
            parent_keys: &parent_keys,
        });
        match result {
            Ok(_) => {
                self.maybe_schedule_cleanup();
                Ok(())
            }
            Err(err) if err.is_transient() => {
                self.record(err);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Read `(partition, key)`, extending its expiry if it is a sliding
    /// entry. `Ok(None)` covers both a genuine miss and a swallowed
    /// transient fault.
    pub fn get<T: DeserializeOwned>(
        &self,
        partition: &str,
        key: &str,
    ) -> Result<Option<T>, CacheError> {
        self.validate(partition, key)?;
        let now = self.clock.now_unix();
        match self.store.get(partition, key, now) {
            Ok(Some(entry)) => Ok(Some(self.codec.decode(&entry.value, entry.compressed)?)),
            Ok(None) => Ok(None),
            Err(err) if err.is_transient() => {
                self.record(err);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Read `(partition, key)` without extending a sliding entry's expiry.
    /// Fails with [`CacheError::NotSupported`] if the driver cannot peek.
    pub fn peek<T: DeserializeOwned>(
        &self,
        partition: &str,
        key: &str,
    ) -> Result<Option<T>, CacheError> {
        self.validate(partition, key)?;
        let now = self.clock.now_unix();
        match self.store.peek(partition, key, now) {
            Ok(Some(entry)) => Ok(Some(self.codec.decode(&entry.value, entry.compressed)?)),
            Ok(None) => Ok(None),
            Err(err) if err.is_transient() => {
                self.record(err);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Return the existing value for `(partition, key)`, or atomically
    /// materialize one from `produce` and store it if absent.
    ///
    /// Per §4.7: concurrent callers racing on the same missing key may each
    /// invoke `produce`, but only one of their writes wins the underlying
    /// upsert; every caller that lost the race still gets back the value it
    /// itself produced; neither it nor the cache retroactively rereads
    /// which write actually won.
    pub fn get_or_add<T, F>(
        &self,
        partition: &str,
        key: &str,
        lifetime: Lifetime,
        parent_keys: ParentKeys,
        produce: F,
    ) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        if let Some(existing) = self.get::<T>(partition, key)? {
            return Ok(existing);
        }
        let value = produce();
        self.add(partition, key, &value, lifetime, parent_keys)?;
        Ok(value)
    }

    /// True iff `(partition, key)` exists and is currently observable.
    pub fn contains(&self, partition: &str, key: &str) -> Result<bool, CacheError> {
        self.validate(partition, key)?;
        let now = self.clock.now_unix();
        match self.store.contains(partition, key, now) {
            Ok(b) => Ok(b),
            Err(err) if err.is_transient() => {
                self.record(err);
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Count entries, optionally scoped to `partition`.
    pub fn count(&self, partition: Option<&str>, mode: ExpiryMode) -> Result<u64, CacheError> {
        let now = self.clock.now_unix();
        match self.store.count(partition, mode, now) {
            Ok(n) => Ok(n),
            Err(err) if err.is_transient() => {
                self.record(err);
                Ok(0)
            }
            Err(err) => Err(err),
        }
    }

    /// Remove `(partition, key)`, cascading to dependents. Returns whether
    /// a row was actually removed.
    pub fn remove(&self, partition: &str, key: &str) -> Result<bool, CacheError> {
        self.validate(partition, key)?;
        match self.store.remove(partition, key) {
            Ok(removed) => Ok(removed),
            Err(err) if err.is_transient() => {
                self.record(err);
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Delete every entry matched by `mode`, optionally scoped to
    /// `partition`. Returns the number removed.
    pub fn clear(&self, partition: Option<&str>, mode: ExpiryMode) -> Result<u64, CacheError> {
        let now = self.clock.now_unix();
        match self.store.clear(partition, mode, now) {
            Ok(n) => Ok(n),
            Err(err) if err.is_transient() => {
                self.record(err);
                Ok(0)
            }
            Err(err) => Err(err),
        }
    }

    /// Total size, in bytes, of stored values, optionally scoped to
    /// `partition`.
    pub fn size_in_bytes(&self, partition: Option<&str>) -> Result<u64, CacheError> {
        match self.store.size_in_bytes(partition) {
            Ok(n) => Ok(n),
            Err(err) if err.is_transient() => {
                self.record(err);
                Ok(0)
            }
            Err(err) => Err(err),
        }
    }

    /// Explicitly re-resolve and persist a new expiry for `(partition,
    /// key)`, without touching its value. Returns `false` if the entry does
    /// not exist.
    pub fn refresh_expiry(
        &self,
        partition: &str,
        key: &str,
        lifetime: Lifetime,
    ) -> Result<bool, CacheError> {
        self.validate(partition, key)?;
        let now = self.clock.now_unix();
        match self.store.contains(partition, key, now) {
            Ok(true) => {}
            Ok(false) => return Ok(false),
            Err(err) if err.is_transient() => {
                self.record(err);
                return Ok(false);
            }
            Err(err) => return Err(err),
        }
        let hash = entry_hash(partition, key)?;
        let spec = lifetime.resolve(now, &self.settings)?;
        match self.store.update_expiry(hash, spec.utc_expiry) {
            Ok(()) => Ok(true),
            Err(err) if err.is_transient() => {
                self.record(err);
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Batch read of every observable entry (optionally scoped to
    /// `partition`), touching sliding rows in a single transaction.
    pub fn get_items<T: DeserializeOwned>(
        &self,
        partition: Option<&str>,
    ) -> Result<Vec<(String, T)>, CacheError> {
        let now = self.clock.now_unix();
        match self.store.get_items(partition, now) {
            Ok(entries) => entries
                .into_iter()
                .map(|e| Ok((e.key.clone(), self.codec.decode(&e.value, e.compressed)?)))
                .collect(),
            Err(err) if err.is_transient() => {
                self.record(err);
                Ok(Vec::new())
            }
            Err(err) => Err(err),
        }
    }

    /// As [`Cache::get_items`], but never extends sliding entries.
    pub fn peek_items<T: DeserializeOwned>(
        &self,
        partition: Option<&str>,
    ) -> Result<Vec<(String, T)>, CacheError> {
        let now = self.clock.now_unix();
        match self.store.peek_items(partition, now) {
            Ok(entries) => entries
                .into_iter()
                .map(|e| Ok((e.key.clone(), self.codec.decode(&e.value, e.compressed)?)))
                .collect(),
            Err(err) if err.is_transient() => {
                self.record(err);
                Ok(Vec::new())
            }
            Err(err) => Err(err),
        }
    }

    /// Run `Clear(partition=None, ConsiderExpiry)` unconditionally (hard
    /// cleanup), bypassing the soft-cleanup probability.
    pub fn force_cleanup(&self) -> Result<u64, CacheError> {
        self.clear(None, ExpiryMode::ConsiderExpiry)
    }

    fn maybe_schedule_cleanup(&self) {
        let chance = self.settings.chances_of_auto_cleanup();
        if chance <= 0.0 {
            return;
        }
        if chance < 1.0 && !rand::thread_rng().gen_bool(chance) {
            return;
        }
        let store = self.store.clone();
        let now = self.clock.now_unix();
        // Dispatched onto a background thread so the write that triggered
        // soft cleanup isn't slowed down by the cleanup scan itself.
        std::thread::spawn(move || {
            if let Err(err) = store.clear(None, ExpiryMode::ConsiderExpiry, now) {
                tracing::warn!(error = %err, "kvlite: background soft cleanup failed");
            }
        });
    }
}

/// The async mirror of [`Cache`], built the way `midnight-proof-server`
/// wraps blocking work: each operation runs the synchronous path inside
/// `tokio::task::spawn_blocking` and races it against a
/// [`tokio_util::sync::CancellationToken`].
#[cfg(feature = "async")]
impl<D: Driver + 'static> Cache<D> {
    /// Async mirror of [`Cache::add`].
    pub async fn add_async<T>(
        &self,
        partition: &str,
        key: &str,
        value: T,
        lifetime: Lifetime,
        parent_keys: ParentKeys,
        cancel: tokio_util::sync::CancellationToken,
    ) -> Result<(), CacheError>
    where
        T: Serialize + Send + 'static,
    {
        let cache = self.clone();
        let partition = partition.to_string();
        let key = key.to_string();
        run_cancellable(cancel, move || {
            cache.add(&partition, &key, &value, lifetime, parent_keys)
        })
        .await
    }

    /// Async mirror of [`Cache::get`]. Per §5: if `cancel` fires after the
    /// blocking read (and any sliding touch) has already committed, the
    /// value is still returned -- cancellation only prevents a *future*
    /// read from starting, it never un-observes one that has already
    /// happened.
    pub async fn get_async<T>(
        &self,
        partition: &str,
        key: &str,
        cancel: tokio_util::sync::CancellationToken,
    ) -> Result<Option<T>, CacheError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let cache = self.clone();
        let partition = partition.to_string();
        let key = key.to_string();
        run_cancellable(cancel, move || cache.get(&partition, &key)).await
    }

    /// Async mirror of [`Cache::peek`].
    pub async fn peek_async<T>(
        &self,
        partition: &str,
        key: &str,
        cancel: tokio_util::sync::CancellationToken,
    ) -> Result<Option<T>, CacheError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let cache = self.clone();
        let partition = partition.to_string();
        let key = key.to_string();
        run_cancellable(cancel, move || cache.peek(&partition, &key)).await
    }

    /// Async mirror of [`Cache::remove`].
    pub async fn remove_async(
        &self,
        partition: &str,
        key: &str,
        cancel: tokio_util::sync::CancellationToken,
    ) -> Result<bool, CacheError> {
        let cache = self.clone();
        let partition = partition.to_string();
        let key = key.to_string();
        run_cancellable(cancel, move || cache.remove(&partition, &key)).await
    }
}

#[cfg(feature = "async")]
async fn run_cancellable<F, T>(
    cancel: tokio_util::sync::CancellationToken,
    f: F,
) -> Result<T, CacheError>
where
    F: FnOnce() -> Result<T, CacheError> + Send + 'static,
    T: Send + 'static,
{
    let task = tokio::task::spawn_blocking(f);
    tokio::select! {
        biased;
        result = task => result.map_err(|e| CacheError::Transient(e.to_string()))?,
        _ = cancel.cancelled() => Err(CacheError::Disposed),
    }
}


#[cfg(all(test, feature = "sqlite", feature = "async"))]
mod async_tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::driver::sqlite::SqliteDriver;
    use serde::{Deserialize, Serialize};
    use tokio_util::sync::CancellationToken;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Widget(String);

    fn cache() -> (Cache<SqliteDriver>, Arc<ManualClock>) {
        let settings = CacheSettings::builder("test-async").unwrap().build().unwrap();
        let driver = SqliteDriver::memory(&settings).unwrap();
        let clock = Arc::new(ManualClock::new());
        (
            Cache::with_clock(driver, settings, clock.clone() as Arc<dyn Clock>),
            clock,
        )
    }

    #[tokio::test]
    async fn add_async_then_get_async_round_trips() {
        let (cache, _clock) = cache();
        cache
            .add_async(
                "p",
                "k",
                Widget("v".into()),
                Lifetime::Timed { duration_secs: 100 },
                ParentKeys::none(),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        let got = cache
            .get_async::<Widget>("p", "k", CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(got, Some(Widget("v".into())));
    }

    #[tokio::test]
    async fn get_async_already_cancelled_still_returns_a_completed_read() {
        let (cache, _clock) = cache();
        cache
            .add(
                "p",
                "k",
                &Widget("v".into()),
                Lifetime::Timed { duration_secs: 100 },
                ParentKeys::none(),
            )
            .unwrap();
        // Cancel only after the blocking read has had a chance to complete;
        // per §5, a read that has already committed is still returned.
        let token = CancellationToken::new();
        let got = cache.get_async::<Widget>("p", "k", token).await.unwrap();
        assert_eq!(got, Some(Widget("v".into())));
    }

    #[tokio::test]
    async fn remove_async_cascades_like_the_sync_path() {
        let (cache, _clock) = cache();
        let lifetime = Lifetime::Timed { duration_secs: 100 };
        cache
            .add("p", "parent", &Widget("1".into()), lifetime, ParentKeys::none())
            .unwrap();
        let parents = ParentKeys::new(vec!["parent".to_string()], 5).unwrap();
        cache
            .add("p", "child", &Widget("2".into()), lifetime, parents)
            .unwrap();

        let removed = cache
            .remove_async("p", "parent", CancellationToken::new())
            .await
            .unwrap();
        assert!(removed);
        assert!(!cache.contains("p", "child").unwrap());
    }
}
