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

use std::collections::HashMap;
use std::io::Read;
use std::io::Write;

use crate::codec::SketchReader;
use crate::codec::SketchWriter;
use crate::codec::assert::ensure_len;
use crate::error::Error;
use crate::sketch::Sketch;
use crate::sketch::serialize_with;

/// Exact 8-bit counters for up to `cap_limit` distinct keys.
///
/// Once the capacity is reached new keys are ignored, and a counter that reached 255 stays
/// there. Neither case is an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExactMapSketch {
    counts: HashMap<Vec<u8>, u8>,
    cap_limit: usize,
}

impl ExactMapSketch {
    /// Creates an empty sketch that tracks at most `cap_limit` distinct keys.
    pub fn new(cap_limit: usize) -> Self {
        Self {
            counts: HashMap::new(),
            cap_limit,
        }
    }

    /// Returns the maximum number of distinct keys.
    pub fn cap_limit(&self) -> usize {
        self.cap_limit
    }

    /// Returns the number of distinct keys being tracked.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Returns true if no key is tracked.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Serializes this sketch into a byte vector.
    pub fn serialize(&self) -> Vec<u8> {
        serialize_with(|w| self.write_to(w))
    }

    /// Deserializes a sketch with capacity `cap_limit` from bytes.
    pub fn deserialize(bytes: &[u8], cap_limit: usize) -> Result<Self, Error> {
        let mut sketch = Self::new(cap_limit);
        sketch.read_from(&mut SketchReader::new(bytes))?;
        Ok(sketch)
    }
}

impl Sketch for ExactMapSketch {
    fn inc(&mut self, key: &[u8]) {
        if let Some(count) = self.counts.get_mut(key) {
            *count = count.saturating_add(1);
        } else if self.counts.len() < self.cap_limit {
            self.counts.insert(key.to_vec(), 1);
        }
    }

    fn get(&self, key: &[u8]) -> f64 {
        self.counts.get(key).copied().map(f64::from).unwrap_or(0.0)
    }

    fn reset(&mut self) {
        self.counts.clear();
    }

    /// Adds the counters of `other`, under the same capacity and saturation rules as `inc`.
    fn merge(&mut self, other: &Self) -> Result<(), Error> {
        for (key, &count) in &other.counts {
            if let Some(ours) = self.counts.get_mut(key) {
                *ours = ours.saturating_add(count);
            } else if self.counts.len() < self.cap_limit {
                self.counts.insert(key.clone(), count);
            }
        }
        Ok(())
    }

    fn write_to<W: Write>(&self, w: &mut SketchWriter<W>) -> Result<(), Error> {
        let mut entries: Vec<_> = self.counts.iter().collect();
        entries.sort_unstable();
        w.write_i64(entries.len() as i64)?;
        for (key, &count) in entries {
            w.write_bytes(key)?;
            w.write_u8(count)?;
        }
        Ok(())
    }

    fn read_from<R: Read>(&mut self, r: &mut SketchReader<R>) -> Result<(), Error> {
        let len = r.read_i64("entry count")?;
        let len = ensure_len(len, "entry count")
            .map_err(|e| e.with_context("processed", r.processed()))?;
        let mut counts = HashMap::with_capacity(len.min(self.cap_limit));
        let mut dropped = 0usize;
        for _ in 0..len {
            let key = r.read_bytes("key")?;
            let count = r.read_u8("count")?;
            if counts.len() < self.cap_limit || counts.contains_key(&key) {
                counts.insert(key, count);
            } else {
                dropped += 1;
            }
        }
        if dropped > 0 {
            log::warn!(
                "dropped {dropped} of {len} keys over the capacity of {}",
                self.cap_limit
            );
        }
        self.counts = counts;
        Ok(())
    }
}
