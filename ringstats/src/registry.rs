// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! A concurrent registry of meters keyed by name and tags.
//!
//! # Usage
//!
//! ```rust
//! # use ringstats::registry::Registry;
//! let registry = Registry::builder().buffer_size(2).build().unwrap();
//! registry.get_or_create("requests", [("host", "a")]).add_at(1_000, 1);
//! registry.meter("errors").add_at(1_000, 2);
//!
//! assert_eq!(
//!     registry.to_json(),
//!     r#"{"meters":{"errors":[1000,2,0],"requests host=a":[1000,1,0]}}"#
//! );
//! ```

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;
use serde::Serialize;
use serde::Serializer;

use crate::error::Error;
use crate::key::Key;
use crate::key::Tags;
use crate::meter::DEFAULT_BUFFER_SIZE;
use crate::meter::Meter;

/// A map from [`Key`] to [`Meter`], safe to share between threads.
///
/// Entries are created on first access and never removed. The map lock only guards the
/// structure of the map; every meter carries its own lock.
#[derive(Debug)]
pub struct Registry {
    meters: RwLock<HashMap<Key, Arc<Meter>>>,
    buffer_size: usize,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Creates an empty registry whose meters hold [`DEFAULT_BUFFER_SIZE`] seconds.
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    /// Returns a builder with the default configuration.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            meters: RwLock::new(HashMap::new()),
            buffer_size,
        }
    }

    /// Rebuilds a registry from the output of [`Registry::to_json`].
    ///
    /// Restored meters keep the size of their snapshot; meters created later hold
    /// [`DEFAULT_BUFFER_SIZE`] seconds.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        Self::builder().build_from_json(json)
    }

    /// Returns the size of newly created meters, in seconds.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Returns the meter of `name` qualified by `tags`, creating it on first access.
    pub fn get_or_create<I, K, V>(&self, name: &str, tags: I) -> Arc<Meter>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.get_or_create_key(Key::new(name, tags))
    }

    /// Returns the untagged meter of `name`, creating it on first access.
    pub fn meter(&self, name: &str) -> Arc<Meter> {
        self.get_or_create_key(Key::from(name))
    }

    /// Returns the meter of `key`, creating it on first access.
    pub fn get_or_create_key(&self, key: Key) -> Arc<Meter> {
        if let Some(meter) = self.meters.read().get(&key) {
            return Arc::clone(meter);
        }
        let mut meters = self.meters.write();
        // another writer may have created it between the two locks
        let meter = meters.entry(key).or_insert_with_key(|key| {
            log::debug!("creating meter {key} of {} seconds", self.buffer_size);
            Arc::new(Meter::new(self.buffer_size))
        });
        Arc::clone(meter)
    }

    /// Returns the meter of `key` without creating it.
    pub fn get(&self, key: &Key) -> Option<Arc<Meter>> {
        self.meters.read().get(key).cloned()
    }

    /// Returns the number of meters.
    pub fn len(&self) -> usize {
        self.meters.read().len()
    }

    /// Returns true if no meter has been created.
    pub fn is_empty(&self) -> bool {
        self.meters.read().is_empty()
    }

    /// Returns every key in sorted order.
    pub fn keys(&self) -> Vec<Key> {
        let mut keys: Vec<Key> = self.meters.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Adds every meter of `other` into the meter of the same key in this registry.
    ///
    /// Meters are merged one at a time, so a concurrent reader may observe a partially merged
    /// registry.
    pub fn merge(&self, other: &Registry) {
        self.merge_since(other, i64::MIN);
    }

    /// Like [`Registry::merge`], keeping only the seconds not older than `since_sec`.
    pub fn merge_since(&self, other: &Registry, since_sec: i64) {
        let entries = other.entries();
        log::debug!("merging {} meters since {since_sec}", entries.len());
        for (key, theirs) in entries {
            self.get_or_create_key(key).merge_since(&theirs, since_sec);
        }
    }

    /// Like [`Registry::merge`], adding `tags` to every key of `other` first.
    ///
    /// Fails without merging anything if a key of `other` cannot be decoded.
    pub fn merge_with_tags(&self, other: &Registry, tags: &Tags) -> Result<(), Error> {
        let entries = other
            .entries()
            .into_iter()
            .map(|(key, meter)| Ok((key.with_tags(tags)?, meter)))
            .collect::<Result<Vec<_>, Error>>()?;
        log::debug!("merging {} meters with {} extra tags", entries.len(), tags.len());
        for (key, theirs) in entries {
            self.get_or_create_key(key).merge(&theirs);
        }
        Ok(())
    }

    /// Renders `{"meters":{"<key>":[window_start, values...]}}` with keys in sorted order.
    pub fn to_json(&self) -> String {
        match serde_json::to_string(self) {
            Ok(json) => json,
            Err(err) => unreachable!("string keyed maps always serialize: {err}"),
        }
    }

    // Clones the map under the read lock so that merging never holds a lock on `other` while
    // locking `self`, which may be the same registry.
    fn entries(&self) -> Vec<(Key, Arc<Meter>)> {
        self.meters
            .read()
            .iter()
            .map(|(key, meter)| (key.clone(), Arc::clone(meter)))
            .collect()
    }
}

impl fmt::Display for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_json())
    }
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    meters: BTreeMap<&'a Key, &'a Meter>,
}

#[derive(Deserialize)]
struct Snapshot {
    meters: BTreeMap<Key, Meter>,
}

impl Serialize for Registry {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let meters = self.meters.read();
        SnapshotRef {
            meters: meters.iter().map(|(k, m)| (k, m.as_ref())).collect(),
        }
        .serialize(serializer)
    }
}

/// Builder for [`Registry`].
#[derive(Debug, Clone)]
pub struct RegistryBuilder {
    buffer_size: usize,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl RegistryBuilder {
    /// Sets the number of seconds held by newly created meters.
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Builds an empty registry.
    ///
    /// Fails if the buffer size is zero.
    pub fn build(self) -> Result<Registry, Error> {
        if self.buffer_size == 0 {
            return Err(Error::invalid_argument("buffer size must be positive"));
        }
        Ok(Registry::with_buffer_size(self.buffer_size))
    }

    /// Builds a registry holding the meters of a [`Registry::to_json`] snapshot.
    pub fn build_from_json(self, json: &str) -> Result<Registry, Error> {
        let registry = self.build()?;
        let snapshot: Snapshot = serde_json::from_str(json)
            .map_err(|err| Error::deserial("invalid registry snapshot").set_source(err))?;
        let meters = snapshot
            .meters
            .into_iter()
            .map(|(key, meter)| (key, Arc::new(meter)))
            .collect();
        *registry.meters.write() = meters;
        Ok(registry)
    }
}
