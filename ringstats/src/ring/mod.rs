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

//! Sketches over a sliding window of time buckets.
//!
//! [`RingSketch`] keeps one [`Sketch`] per bucket. Bucket indexes are absolute and
//! application-defined (e.g. hours since the epoch). The window covers
//! `[offset, offset + ring_size)`; incrementing a later bucket slides the window forward,
//! resetting exactly the buckets that fall out of it, and buckets before the window are
//! ignored.
//!
//! [`RegisterRingSketch`] applies the same discipline to every register of a count-min-log
//! matrix instead of to whole sketches.
//!
//! # Usage
//!
//! ```rust
//! # use ringstats::ring::RingSketch;
//! let mut ring = RingSketch::exact_map(24, 1024, 0);
//! ring.inc(3, b"login");
//! ring.inc(3, b"login");
//! assert_eq!(ring.get(3, b"login"), 2.0);
//!
//! ring.inc(27, b"login");
//! assert_eq!(ring.offset(), 4);
//! assert_eq!(ring.get(3, b"login"), 0.0);
//! ```

mod register;

use std::fmt;
use std::io::Read;
use std::io::Write;

pub use self::register::RegisterRingSketch;
pub use self::register::RingRegister;
use crate::codec::SketchReader;
use crate::codec::SketchWriter;
use crate::codec::assert::ensure_positive;
use crate::error::Error;
use crate::sketch::CountMinLogSketch;
use crate::sketch::ExactMapSketch;
use crate::sketch::Sketch;
use crate::sketch::serialize_with;
use crate::window::Placement;
use crate::window::place;
use crate::window::slide;
use crate::window::start_ending_at;

type Factory<S> = Box<dyn Fn() -> S + Send + Sync>;

/// A ring of sketches indexed by absolute time bucket.
///
/// Not internally synchronized; wrap it in a lock to share it between threads.
pub struct RingSketch<S> {
    start: usize,
    offset: i64,
    buckets: Vec<S>,
    factory: Factory<S>,
}

impl<S: Sketch> RingSketch<S> {
    /// Creates a ring over `buckets` whose first bucket represents `offset`.
    ///
    /// `factory` must build empty sketches shaped like `buckets`; it is used to rebuild the
    /// buckets when decoding.
    ///
    /// # Panics
    ///
    /// Panics if `buckets` is empty.
    pub fn new<F>(offset: i64, buckets: Vec<S>, factory: F) -> Self
    where
        F: Fn() -> S + Send + Sync + 'static,
    {
        assert!(!buckets.is_empty(), "must have at least 1 sketch");
        Self {
            start: 0,
            offset,
            buckets,
            factory: Box::new(factory),
        }
    }

    /// Creates a ring of `ring_size` empty sketches built by `factory`.
    ///
    /// # Panics
    ///
    /// Panics if `ring_size` is zero.
    pub fn with_factory<F>(ring_size: usize, offset: i64, factory: F) -> Self
    where
        F: Fn() -> S + Send + Sync + 'static,
    {
        let buckets = (0..ring_size).map(|_| factory()).collect();
        Self::new(offset, buckets, factory)
    }

    /// Returns the first bucket of the window.
    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Returns the number of buckets in the window.
    pub fn ring_size(&self) -> usize {
        self.buckets.len()
    }

    /// Returns the sketch of `bucket`, or `None` outside the window.
    pub fn bucket(&self, bucket: i64) -> Option<&S> {
        self.position(bucket).map(|pos| &self.buckets[pos])
    }

    /// Counts one occurrence of `key` in `bucket`.
    ///
    /// Slides the window forward when `bucket` is past its end; a no-op when `bucket` is before
    /// it.
    pub fn inc(&mut self, bucket: i64, key: &[u8]) {
        if let Some(pos) = self.advance_to(bucket) {
            self.buckets[pos].inc(key);
        }
    }

    /// Returns the estimated count of `key` in `bucket`, or zero outside the window.
    pub fn get(&self, bucket: i64, key: &[u8]) -> f64 {
        self.bucket(bucket).map_or(0.0, |s| s.get(key))
    }

    /// Merges `other` into this ring bucket by bucket.
    ///
    /// Like [`RingSketch::inc`], buckets of `other` that are older than this window are
    /// dropped, and newer ones slide this window forward.
    pub fn merge(&mut self, other: &RingSketch<S>) -> Result<(), Error> {
        let len = other.buckets.len();
        for i in 0..len {
            // buckets past i64::MAX are never written
            let Some(bucket) = other.offset.checked_add(i as i64) else {
                break;
            };
            if let Some(pos) = self.advance_to(bucket) {
                self.buckets[pos].merge(&other.buckets[(other.start + i) % len])?;
            }
        }
        Ok(())
    }

    /// Writes `start`, `offset`, the bucket count and then every bucket in slot order.
    pub fn write_to<W: Write>(&self, w: &mut SketchWriter<W>) -> Result<(), Error> {
        w.write_i64(self.start as i64)?;
        w.write_i64(self.offset)?;
        w.write_i64(self.buckets.len() as i64)?;
        for bucket in &self.buckets {
            bucket.write_to(w)?;
        }
        Ok(())
    }

    /// Replaces the state of this ring with one written by [`RingSketch::write_to`].
    ///
    /// Every bucket is rebuilt with the factory before decoding into it.
    pub fn read_from<R: Read>(&mut self, r: &mut SketchReader<R>) -> Result<(), Error> {
        let start = r.read_i64("start")?;
        let offset = r.read_i64("offset")?;
        let count = ensure_positive(r.read_i64("bucket count")?, "bucket count")?;
        if !(0..count as i64).contains(&start) {
            return Err(Error::deserial(format!(
                "start {start} outside of {count} buckets"
            ))
            .with_context("processed", r.processed()));
        }
        // the count comes from the input, so buckets are only kept once they decode
        let mut buckets = Vec::new();
        for _ in 0..count {
            let mut bucket = (self.factory)();
            bucket.read_from(r)?;
            buckets.push(bucket);
        }
        self.start = start as usize;
        self.offset = offset;
        self.buckets = buckets;
        Ok(())
    }

    /// Serializes this ring into a byte vector.
    pub fn serialize(&self) -> Vec<u8> {
        serialize_with(|w| self.write_to(w))
    }

    /// Replaces the state of this ring with the serialized form in `bytes`.
    pub fn deserialize_into(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.read_from(&mut SketchReader::new(bytes))
    }

    fn position(&self, bucket: i64) -> Option<usize> {
        match place(self.offset, self.buckets.len(), bucket) {
            Placement::Inside(delta) => Some((self.start + delta) % self.buckets.len()),
            _ => None,
        }
    }

    // Slides the window until it holds `bucket` and returns its slot, or `None` if `bucket`
    // is older than the window.
    fn advance_to(&mut self, bucket: i64) -> Option<usize> {
        let len = self.buckets.len();
        let delta = match place(self.offset, len, bucket) {
            Placement::Before => return None,
            Placement::Inside(delta) => delta,
            Placement::After(steps) => {
                if slide(&mut self.buckets, &mut self.start, steps, S::reset) {
                    log::trace!("ring window jumps from {} by {steps} buckets", self.offset);
                }
                self.offset = start_ending_at(bucket, len);
                len - 1
            }
        };
        Some((self.start + delta) % len)
    }
}

impl RingSketch<CountMinLogSketch> {
    /// Creates a ring of `ring_size` count-min-log sketches sized for `capacity` events at
    /// relative error `error_rate`.
    ///
    /// Fails if `error_rate` is not in `[0.001, 1.0)`.
    ///
    /// # Panics
    ///
    /// Panics if `ring_size` is zero.
    pub fn count_min_log(
        ring_size: usize,
        capacity: u64,
        error_rate: f64,
        offset: i64,
    ) -> Result<Self, Error> {
        let (width, depth) = CountMinLogSketch::dimensions_for(capacity, error_rate)?;
        Ok(Self::with_factory(ring_size, offset, move || {
            CountMinLogSketch::new(width, depth)
        }))
    }
}

impl RingSketch<ExactMapSketch> {
    /// Creates a ring of `ring_size` exact-map sketches each holding up to `cap_limit` keys.
    ///
    /// # Panics
    ///
    /// Panics if `ring_size` is zero.
    pub fn exact_map(ring_size: usize, cap_limit: usize, offset: i64) -> Self {
        Self::with_factory(ring_size, offset, move || ExactMapSketch::new(cap_limit))
    }
}

impl<S: fmt::Debug> fmt::Debug for RingSketch<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingSketch")
            .field("start", &self.start)
            .field("offset", &self.offset)
            .field("buckets", &self.buckets)
            .finish_non_exhaustive()
    }
}
