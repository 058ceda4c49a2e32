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

//! Fixtures shared by this crate's own unit tests and by `tests/`.

use crate::cache::Cache;
use crate::clock::ManualClock;
use crate::config::CacheSettings;
use crate::driver::sqlite::SqliteDriver;
use std::sync::Arc;
use tempfile::TempDir;

/// A [`Cache`] over a persistent, file-backed [`SqliteDriver`] rooted in a
/// freshly created temporary directory, plus the [`ManualClock`] driving it
/// and the [`TempDir`] guard that must outlive the cache.
pub fn file_backed_cache(cache_name: &str) -> (Cache<SqliteDriver>, Arc<ManualClock>, TempDir) {
    let dir = tempfile::tempdir().expect("create temp dir for sqlite fixture");
    let settings = CacheSettings::builder(cache_name)
        .unwrap()
        .build()
        .unwrap();
    let driver = SqliteDriver::file(dir.path().join("kvlite.sqlite3"), &settings).unwrap();
    let clock = Arc::new(ManualClock::new());
    let cache = Cache::with_clock(driver, settings, clock.clone() as Arc<dyn crate::clock::Clock>);
    (cache, clock, dir)
}

/// A [`Cache`] over the volatile, in-memory [`SqliteDriver`], plus its
/// [`ManualClock`].
pub fn memory_cache(cache_name: &str) -> (Cache<SqliteDriver>, Arc<ManualClock>) {
    let settings = CacheSettings::builder(cache_name)
        .unwrap()
        .build()
        .unwrap();
    let driver = SqliteDriver::memory(&settings).unwrap();
    let clock = Arc::new(ManualClock::new());
    let cache = Cache::with_clock(driver, settings, clock.clone() as Arc<dyn crate::clock::Clock>);
    (cache, clock)
}
