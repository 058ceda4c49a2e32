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

//! A monotonic wall-clock source, abstracted so the expiry engine's
//! scenarios (§8 of the specification) can be driven deterministically in
//! tests instead of by sleeping real time.

use std::fmt::Debug;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// A source of "seconds since the Unix epoch".
///
/// All entry-store timestamps (`utc_creation`, `utc_expiry`) are derived
/// from a single call to [`Clock::now_unix`] per operation, so that a read
/// and its touch-update agree on `now` within one transaction.
pub trait Clock: Debug + Send + Sync {
    /// Current time, in whole seconds since the Unix epoch.
    fn now_unix(&self) -> i64;
}

/// The real-time clock, backed by [`SystemTime::now`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is before the Unix epoch")
            .as_secs() as i64
    }
}

/// A clock whose value is set explicitly, for deterministically driving the
/// scenarios in §8 of the specification (e.g. "at t=0 add ...; at t=9,
/// `Get` returns ...; at t=11, `Get` returns miss").
#[derive(Debug, Default)]
pub struct ManualClock(AtomicI64);

impl ManualClock {
    /// Create a clock starting at `t=0`.
    pub fn new() -> Self {
        Self(AtomicI64::new(0))
    }

    /// Create a clock starting at the given Unix timestamp.
    pub fn at(unix_secs: i64) -> Self {
        Self(AtomicI64::new(unix_secs))
    }

    /// Advance the clock by `delta_secs` (may be negative) and return the
    /// new value.
    pub fn advance(&self, delta_secs: i64) -> i64 {
        self.0.fetch_add(delta_secs, Ordering::SeqCst) + delta_secs
    }

    /// Set the clock to an absolute Unix timestamp.
    pub fn set(&self, unix_secs: i64) {
        self.0.store(unix_secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_unix(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}
