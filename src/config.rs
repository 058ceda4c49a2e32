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

//! The configuration options the engine recognizes (§6).

use crate::entry::MAX_PARENT_KEYS;
use crate::error::CacheError;

const CACHE_NAME_RE_CHARS: fn(char) -> bool =
    |c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ' ');

/// `cache_entries_table_name`/`cache_schema_name` are interpolated directly
/// into the SQL templates `driver::sqlite` builds (there is no
/// parameterized way to name a table in SQLite), so unlike `cache_name`
/// they are restricted to a plain SQL identifier rather than the more
/// permissive cache-name charset.
fn is_sql_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Validated configuration for a [`crate::cache::Cache`].
///
/// Constructed via [`CacheSettings::builder`]; `connection_string` is
/// derived from the other fields and is not independently settable.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    cache_name: String,
    cache_entries_table_name: String,
    cache_schema_name: Option<String>,
    default_partition: String,
    static_interval_secs: i64,
    max_cache_size_mb: Option<u64>,
    min_value_length_for_compression: usize,
    chances_of_auto_cleanup: f64,
    max_parent_key_count_per_item: usize,
    max_parent_key_tree_depth: usize,
}

impl CacheSettings {
    /// Start building settings for a cache named `cache_name`.
    ///
    /// Fails with [`CacheError::InvalidArgument`] if `cache_name` does not
    /// match `^[A-Za-z0-9_\-. ]*$`.
    pub fn builder(cache_name: impl Into<String>) -> Result<CacheSettingsBuilder, CacheError> {
        let cache_name = cache_name.into();
        if !cache_name.chars().all(CACHE_NAME_RE_CHARS) {
            return Err(CacheError::InvalidArgument(format!(
                "cache name {cache_name:?} must match ^[A-Za-z0-9_\\-. ]*$"
            )));
        }
        Ok(CacheSettingsBuilder {
            cache_name,
            cache_entries_table_name: "kvl_cache_entries".to_string(),
            cache_schema_name: None,
            default_partition: "default".to_string(),
            static_interval_secs: 30 * 24 * 3600,
            max_cache_size_mb: None,
            min_value_length_for_compression: 4096,
            chances_of_auto_cleanup: 0.01,
            max_parent_key_count_per_item: MAX_PARENT_KEYS,
            max_parent_key_tree_depth: 8,
        })
    }

    /// The cache's identifier.
    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    /// Name of the cache-entries table.
    pub fn cache_entries_table_name(&self) -> &str {
        &self.cache_entries_table_name
    }

    /// Schema the cache-entries table lives in, if the driver supports
    /// schemas.
    pub fn cache_schema_name(&self) -> Option<&str> {
        self.cache_schema_name.as_deref()
    }

    /// Partition used when the caller omits one.
    pub fn default_partition(&self) -> &str {
        &self.default_partition
    }

    /// Default sliding interval, in seconds, for [`crate::expiry::Lifetime::Static`] entries.
    pub fn static_interval_secs(&self) -> i64 {
        self.static_interval_secs
    }

    /// Advisory upper bound on cache size, in megabytes.
    pub fn max_cache_size_mb(&self) -> Option<u64> {
        self.max_cache_size_mb
    }

    /// Values serialized above this many bytes are gzip-compressed.
    pub fn min_value_length_for_compression(&self) -> usize {
        self.min_value_length_for_compression
    }

    /// Probability, in `[0.0, 1.0]`, that a successful write triggers soft
    /// cleanup.
    pub fn chances_of_auto_cleanup(&self) -> f64 {
        self.chances_of_auto_cleanup
    }

    /// Engine-enforced cap on parent keys per item (driver-capped at
    /// [`MAX_PARENT_KEYS`] for the SQLite driver).
    pub fn max_parent_key_count_per_item(&self) -> usize {
        self.max_parent_key_count_per_item
    }

    /// Engine-enforced cap on the depth of the parent-key tree reachable
    /// from a single entry (i.e. parents of parents), checked before an
    /// `Add*` is dispatched to the entry store.
    pub fn max_parent_key_tree_depth(&self) -> usize {
        self.max_parent_key_tree_depth
    }

    /// The computed, read-only connection string fragment identifying this
    /// cache's table (schema-qualified if a schema name is set).
    pub fn qualified_table_name(&self) -> String {
        match &self.cache_schema_name {
            Some(schema) => format!("{schema}.{}", self.cache_entries_table_name),
            None => self.cache_entries_table_name.clone(),
        }
    }
}

/// Builder for [`CacheSettings`], obtained from [`CacheSettings::builder`].
#[derive(Debug, Clone)]
pub struct CacheSettingsBuilder {
    cache_name: String,
    cache_entries_table_name: String,
    cache_schema_name: Option<String>,
    default_partition: String,
    static_interval_secs: i64,
    max_cache_size_mb: Option<u64>,
    min_value_length_for_compression: usize,
    chances_of_auto_cleanup: f64,
    max_parent_key_count_per_item: usize,
    max_parent_key_tree_depth: usize,
}

impl CacheSettingsBuilder {
    /// Override the cache-entries table name.
    pub fn cache_entries_table_name(mut self, name: impl Into<String>) -> Self {
        self.cache_entries_table_name = name.into();
        self
    }

    /// Set the schema the cache-entries table lives in.
    pub fn cache_schema_name(mut self, name: impl Into<String>) -> Self {
        self.cache_schema_name = Some(name.into());
        self
    }

    /// Override the partition used when the caller omits one.
    pub fn default_partition(mut self, partition: impl Into<String>) -> Self {
        self.default_partition = partition.into();
        self
    }

    /// Override the default interval for [`crate::expiry::Lifetime::Static`] entries.
    pub fn static_interval_secs(mut self, secs: i64) -> Self {
        self.static_interval_secs = secs;
        self
    }

    /// Set an advisory upper bound on cache size, in megabytes.
    pub fn max_cache_size_mb(mut self, mb: u64) -> Self {
        self.max_cache_size_mb = Some(mb);
        self
    }

    /// Override the compression threshold, in bytes.
    pub fn min_value_length_for_compression(mut self, bytes: usize) -> Self {
        self.min_value_length_for_compression = bytes;
        self
    }

    /// Override the soft-cleanup probability.
    pub fn chances_of_auto_cleanup(mut self, probability: f64) -> Self {
        self.chances_of_auto_cleanup = probability;
        self
    }

    /// Override the engine-enforced parent-key cap. Values above
    /// [`MAX_PARENT_KEYS`] are rejected at [`Self::build`] time, since the
    /// SQLite driver cannot honor them.
    pub fn max_parent_key_count_per_item(mut self, max: usize) -> Self {
        self.max_parent_key_count_per_item = max;
        self
    }

    /// Override the engine-enforced cap on parent-key tree depth (how many
    /// levels of "parent of a parent" an `Add*` is allowed to create).
    pub fn max_parent_key_tree_depth(mut self, max: usize) -> Self {
        self.max_parent_key_tree_depth = max;
        self
    }

    /// Validate and finalize the settings.
    pub fn build(self) -> Result<CacheSettings, CacheError> {
        if !(0.0..=1.0).contains(&self.chances_of_auto_cleanup) {
            return Err(CacheError::InvalidArgument(format!(
                "chances_of_auto_cleanup must be in [0.0, 1.0], got {}",
                self.chances_of_auto_cleanup
            )));
        }
        if self.static_interval_secs < 0 {
            return Err(CacheError::InvalidArgument(
                "static_interval_secs must not be negative".into(),
            ));
        }
        if self.max_parent_key_count_per_item > MAX_PARENT_KEYS {
            return Err(CacheError::TooManyParents {
                supplied: self.max_parent_key_count_per_item,
                max: MAX_PARENT_KEYS,
            });
        }
        if !is_sql_identifier(&self.cache_entries_table_name) {
            return Err(CacheError::InvalidArgument(format!(
                "cache_entries_table_name {:?} must be a plain SQL identifier",
                self.cache_entries_table_name
            )));
        }
        if let Some(schema) = &self.cache_schema_name {
            if !is_sql_identifier(schema) {
                return Err(CacheError::InvalidArgument(format!(
                    "cache_schema_name {schema:?} must be a plain SQL identifier"
                )));
            }
        }
        Ok(CacheSettings {
            cache_name: self.cache_name,
            cache_entries_table_name: self.cache_entries_table_name,
            cache_schema_name: self.cache_schema_name,
            default_partition: self.default_partition,
            static_interval_secs: self.static_interval_secs,
            max_cache_size_mb: self.max_cache_size_mb,
            min_value_length_for_compression: self.min_value_length_for_compression,
            chances_of_auto_cleanup: self.chances_of_auto_cleanup,
            max_parent_key_count_per_item: self.max_parent_key_count_per_item,
            max_parent_key_tree_depth: self.max_parent_key_tree_depth,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let settings = CacheSettings::builder("test").unwrap().build().unwrap();
        assert_eq!(settings.cache_entries_table_name(), "kvl_cache_entries");
        assert_eq!(settings.min_value_length_for_compression(), 4096);
        assert_eq!(settings.static_interval_secs(), 30 * 24 * 3600);
        assert_eq!(settings.max_parent_key_count_per_item(), MAX_PARENT_KEYS);
        assert_eq!(settings.max_parent_key_tree_depth(), 8);
    }

    #[test]
    fn max_parent_key_tree_depth_is_overridable() {
        let settings = CacheSettings::builder("test")
            .unwrap()
            .max_parent_key_tree_depth(2)
            .build()
            .unwrap();
        assert_eq!(settings.max_parent_key_tree_depth(), 2);
    }

    #[test]
    fn rejects_invalid_cache_name() {
        assert!(CacheSettings::builder("bad name!").is_err());
        assert!(CacheSettings::builder("good_name-1.2 3").is_ok());
    }

    #[test]
    fn rejects_out_of_range_cleanup_probability() {
        let err = CacheSettings::builder("test")
            .unwrap()
            .chances_of_auto_cleanup(1.5)
            .build();
        assert!(err.is_err());
    }

    #[test]
    fn rejects_non_identifier_table_or_schema_names() {
        assert!(CacheSettings::builder("test")
            .unwrap()
            .cache_entries_table_name("entries; DROP TABLE entries")
            .build()
            .is_err());
        assert!(CacheSettings::builder("test")
            .unwrap()
            .cache_schema_name("bad schema")
            .build()
            .is_err());
        assert!(CacheSettings::builder("test")
            .unwrap()
            .cache_entries_table_name("my_table_2")
            .build()
            .is_ok());
    }

    #[test]
    fn qualified_table_name_includes_schema_when_set() {
        let settings = CacheSettings::builder("test")
            .unwrap()
            .cache_schema_name("myschema")
            .build()
            .unwrap();
        assert_eq!(settings.qualified_table_name(), "myschema.kvl_cache_entries");
    }
}
