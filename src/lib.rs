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

#![deny(unreachable_pub)]
//! A partition-based, expiring key/value cache on top of a relational
//! database.
//!
//! The public surface is [`Cache`](cache::Cache): a facade over an
//! [`EntryStore`](store::EntryStore) that adds argument validation, error
//! swallowing, and probabilistic cleanup. Everything below the facade --
//! hashing, the codec, the SQLite driver, the expiry state machine and the
//! parent-key cascade -- is the storage engine this crate exists to provide.

pub mod clock;
pub mod codec;
pub mod config;
pub mod entry;
pub mod error;
pub mod expiry;
pub mod hash;

#[cfg(feature = "sqlite")]
pub mod driver;
#[cfg(feature = "sqlite")]
pub mod store;
#[cfg(feature = "sqlite")]
pub mod cache;

pub use config::CacheSettings;
pub use error::{CacheError, CacheResult};
pub use expiry::Lifetime;

#[cfg(feature = "sqlite")]
pub use cache::Cache;
#[cfg(feature = "sqlite")]
pub use driver::sqlite::SqliteDriver;

/// Fixtures for this crate's own `#[cfg(test)]` modules: a temp-dir-backed
/// `SqliteDriver` and a `ManualClock`, wired into a `Cache`.
#[cfg(all(test, feature = "sqlite"))]
mod test_support;
