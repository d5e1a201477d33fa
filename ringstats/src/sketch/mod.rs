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

//! Per-key frequency sketches.
//!
//! Two implementations share the [`Sketch`] interface:
//!
//! * [`CountMinLogSketch`] keeps a `depth x width` matrix of 16-bit logarithmic registers and
//!   answers with a bounded-error estimate in fixed memory.
//! * [`ExactMapSketch`] keeps exact 8-bit counters for up to a fixed number of distinct keys.
//!
//! Neither is internally synchronized; callers serialize access to a single instance.
//!
//! # Usage
//!
//! ```rust
//! # use ringstats::sketch::CountMinLogSketch;
//! # use ringstats::sketch::Sketch;
//! let mut sketch = CountMinLogSketch::with_seed(1024, 4, 7);
//! for _ in 0..10 {
//!     sketch.inc(b"apple");
//! }
//! assert!((sketch.get(b"apple") - 10.0).abs() < 1.0);
//! assert_eq!(sketch.get(b"banana"), 0.0);
//! ```

pub(crate) mod cml;
mod exact;

use std::io::Read;
use std::io::Write;

pub use self::cml::CountMinLogSketch;
pub use self::cml::CountMinLogSketchBuilder;
pub use self::cml::DEFAULT_EXP;
pub use self::exact::ExactMapSketch;
use crate::codec::SketchReader;
use crate::codec::SketchWriter;
use crate::error::Error;

/// A fixed-memory per-key frequency counter.
pub trait Sketch {
    /// Counts one occurrence of `key`.
    fn inc(&mut self, key: &[u8]);

    /// Returns the estimated number of occurrences of `key`.
    fn get(&self, key: &[u8]) -> f64;

    /// Forgets every key.
    fn reset(&mut self);

    /// Adds the counts held by `other` into this sketch.
    ///
    /// Fails if the two sketches are not shaped alike.
    fn merge(&mut self, other: &Self) -> Result<(), Error>
    where
        Self: Sized;

    /// Writes the state of this sketch.
    fn write_to<W: Write>(&self, w: &mut SketchWriter<W>) -> Result<(), Error>;

    /// Replaces the state of this sketch with one written by [`Sketch::write_to`].
    fn read_from<R: Read>(&mut self, r: &mut SketchReader<R>) -> Result<(), Error>;
}

pub(crate) fn serialize_with(
    write: impl FnOnce(&mut SketchWriter<Vec<u8>>) -> Result<(), Error>,
) -> Vec<u8> {
    let mut w = SketchWriter::new(Vec::new());
    match write(&mut w) {
        Ok(()) => w.into_inner(),
        Err(err) => unreachable!("writing into memory cannot fail: {err}"),
    }
}
