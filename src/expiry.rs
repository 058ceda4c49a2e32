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

//! The expiry / refresh state machine (§4.5): three lifetime modes, each a
//! convenience over the primitive `(utc_expiry, interval)` pair actually
//! stored in the row.

use crate::config::CacheSettings;
use crate::error::CacheError;

/// How an entry's lifetime behaves on an observing read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    /// Absolute expiry; reads never change it. Persists as `interval = 0`.
    Timed {
        /// Seconds from now until the entry expires.
        duration_secs: i64,
    },
    /// `utc_expiry` is reset to `now + duration_secs` on every observing
    /// read. Persists as `interval = duration_secs`.
    Sliding {
        /// Seconds an observing read extends the expiry by.
        duration_secs: i64,
    },
    /// A sliding entry using the cache-wide `static_interval_secs` default.
    Static,
}

/// The `(utc_expiry, interval)` pair actually persisted for a given
/// `Lifetime`, computed relative to `now`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpirySpec {
    /// Initial `utc_expiry` to store.
    pub utc_expiry: i64,
    /// `interval` to store: 0 for timed, >0 for sliding/static.
    pub interval: i64,
}

impl Lifetime {
    /// Resolve this lifetime into the `(utc_expiry, interval)` pair to
    /// persist, given the current time and the cache's settings (for
    /// `Static`'s default duration).
    ///
    /// Fails with [`CacheError::InvalidArgument`] if a negative duration is
    /// supplied (§7: "negative lifetime").
    pub fn resolve(&self, now: i64, settings: &CacheSettings) -> Result<ExpirySpec, CacheError> {
        let (duration_secs, interval) = match *self {
            Lifetime::Timed { duration_secs } => (duration_secs, 0),
            Lifetime::Sliding { duration_secs } => (duration_secs, duration_secs),
            Lifetime::Static => {
                let d = settings.static_interval_secs();
                (d, d)
            }
        };
        if duration_secs < 0 {
            return Err(CacheError::InvalidArgument(
                "lifetime duration must not be negative".into(),
            ));
        }
        Ok(ExpirySpec {
            utc_expiry: now + duration_secs,
            interval,
        })
    }
}

/// Compute the new `utc_expiry` for an observing read against a row with
/// the given `interval`/`utc_expiry`, or `None` if the touch should be a
/// no-op (timed entry, or the row does not need rewriting).
///
/// Per §3 invariant 3, a sliding entry is only refreshed if it is still
/// observable (`now <= utc_expiry`) at the moment of the read -- an already
/// expired row is never resurrected by a touch.
pub fn touch(now: i64, interval: i64, utc_expiry: i64) -> Option<i64> {
    if interval > 0 && now <= utc_expiry {
        Some(now + interval)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> CacheSettings {
        CacheSettings::builder("test").unwrap().build().unwrap()
    }

    #[test]
    fn timed_persists_zero_interval() {
        let spec = Lifetime::Timed { duration_secs: 10 }
            .resolve(0, &settings())
            .unwrap();
        assert_eq!(spec, ExpirySpec {
            utc_expiry: 10,
            interval: 0
        });
    }

    #[test]
    fn sliding_persists_its_duration_as_interval() {
        let spec = Lifetime::Sliding { duration_secs: 10 }
            .resolve(5, &settings())
            .unwrap();
        assert_eq!(spec, ExpirySpec {
            utc_expiry: 15,
            interval: 10
        });
    }

    #[test]
    fn static_uses_settings_default() {
        let spec = Lifetime::Static.resolve(0, &settings()).unwrap();
        assert_eq!(spec.interval, settings().static_interval_secs());
    }

    #[test]
    fn negative_duration_is_rejected() {
        let err = Lifetime::Timed { duration_secs: -1 }.resolve(0, &settings());
        assert!(matches!(err, Err(CacheError::InvalidArgument(_))));
    }

    #[test]
    fn touch_extends_observable_sliding_entries() {
        assert_eq!(touch(7, 10, 10), Some(17));
    }

    #[test]
    fn touch_is_noop_for_timed_entries() {
        assert_eq!(touch(7, 0, 10), None);
    }

    #[test]
    fn touch_does_not_resurrect_expired_entries() {
        assert_eq!(touch(11, 10, 10), None);
    }
}
