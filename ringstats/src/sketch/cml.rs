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

//! Count-Min-Log sketch with 16-bit logarithmic registers.
//!
//! Every register stores a count class `c` rather than a count. A register at class `c` is
//! raised with probability `exp^-c`, so the expected count it represents grows geometrically
//! and 16 bits cover very large counts. Updates are conservative: only the registers that hold
//! the current minimum for a key are raised.

use std::f64::consts::LN_2;
use std::io::Read;
use std::io::Write;

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use xxhash_rust::xxh3::xxh3_64;

use crate::codec::SketchReader;
use crate::codec::SketchWriter;
use crate::codec::assert::ensure_positive;
use crate::error::Error;
use crate::sketch::Sketch;
use crate::sketch::serialize_with;

/// Growth base of the register value function.
pub const DEFAULT_EXP: f64 = 1.00026;

const MIN_CAPACITY: u64 = 1_000_000;
const MIN_ERROR_RATE: f64 = 0.001;
const DEFAULT_CAPACITY: u64 = MIN_CAPACITY;
const DEFAULT_ERROR_RATE: f64 = 0.01;
// Largest register array accepted from serialized input.
const MAX_DECODED_REGISTERS: usize = 1 << 28;
pub(crate) const DEFAULT_SEED: u64 = 0x0ddc_0ffe_ebad_f00d;

/// Count-Min-Log sketch.
///
/// See [`crate::sketch`] for an overview.
#[derive(Debug, Clone)]
pub struct CountMinLogSketch {
    width: usize,
    depth: usize,
    exp: f64,
    registers: Vec<u16>,
    rng: StdRng,
}

impl CountMinLogSketch {
    /// Creates a sketch with `depth` rows of `width` registers each.
    ///
    /// # Panics
    ///
    /// Panics if `width` or `depth` is zero.
    pub fn new(width: usize, depth: usize) -> Self {
        Self::with_seed(width, depth, DEFAULT_SEED)
    }

    /// Creates a sketch whose update decisions are drawn from an RNG seeded with `seed`.
    ///
    /// # Panics
    ///
    /// Panics if `width` or `depth` is zero.
    pub fn with_seed(width: usize, depth: usize, seed: u64) -> Self {
        assert!(width > 0, "width must be positive");
        assert!(depth > 0, "depth must be positive");
        Self {
            width,
            depth,
            exp: DEFAULT_EXP,
            registers: vec![0; width * depth],
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Creates a sketch sized for `capacity` distinct events at relative error `error_rate`.
    ///
    /// Fails if `error_rate` is not in `[0.001, 1.0)`.
    pub fn with_capacity(capacity: u64, error_rate: f64) -> Result<Self, Error> {
        Self::builder()
            .capacity(capacity)
            .error_rate(error_rate)
            .build()
    }

    /// Returns a builder with the default capacity, error rate and seed.
    pub fn builder() -> CountMinLogSketchBuilder {
        CountMinLogSketchBuilder::default()
    }

    /// Computes `(width, depth)` for `capacity` events at relative error `error_rate`.
    ///
    /// The capacity is raised to at least one million before sizing. The total register count
    /// is `m = ceil(capacity * ln(e) / ln(2^-ln2))`, spread over `ceil(ln2 * m / capacity)`
    /// rows.
    pub fn dimensions_for(capacity: u64, error_rate: f64) -> Result<(usize, usize), Error> {
        if !(MIN_ERROR_RATE..1.0).contains(&error_rate) {
            return Err(Error::invalid_argument(format!(
                "error rate must be >= {MIN_ERROR_RATE} and < 1.0, got {error_rate}"
            )));
        }
        let capacity = capacity.max(MIN_CAPACITY) as f64;
        let m = (capacity * error_rate.ln() / (1.0 / 2f64.powf(LN_2)).ln()).ceil();
        let depth = (LN_2 * m / capacity).ceil();
        let width = (m / depth).floor();
        Ok((width as usize, depth as usize))
    }

    /// Returns the number of registers per row.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the number of rows, i.e. hash functions.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Returns the growth base of the register value function.
    pub fn exp(&self) -> f64 {
        self.exp
    }

    /// Returns true if no register has been raised.
    pub fn is_empty(&self) -> bool {
        self.registers.iter().all(|&r| r == 0)
    }

    /// Serializes this sketch into a byte vector.
    pub fn serialize(&self) -> Vec<u8> {
        serialize_with(|w| self.write_to(w))
    }

    /// Deserializes a sketch from bytes.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        let mut sketch = Self::new(1, 1);
        sketch.read_from(&mut SketchReader::new(bytes))?;
        Ok(sketch)
    }

    fn positions(&self, key: &[u8]) -> impl Iterator<Item = usize> + use<> {
        positions(key, self.width, self.depth)
    }

    fn min_register(&self, key: &[u8]) -> u16 {
        self.positions(key)
            .map(|pos| self.registers[pos])
            .min()
            .unwrap_or(0)
    }

    fn value(&self, c: u16) -> f64 {
        value(self.exp, c)
    }

    fn increase_decision(&mut self, c: u16) -> bool {
        increase_decision(&mut self.rng, self.exp, c)
    }
}

impl Sketch for CountMinLogSketch {
    fn inc(&mut self, key: &[u8]) {
        let positions: Vec<usize> = self.positions(key).collect();
        let c = positions
            .iter()
            .map(|&pos| self.registers[pos])
            .min()
            .unwrap_or(u16::MAX);
        if c == u16::MAX {
            return;
        }
        if self.increase_decision(c) {
            for pos in positions {
                if self.registers[pos] == c {
                    self.registers[pos] = c + 1;
                }
            }
        }
    }

    fn get(&self, key: &[u8]) -> f64 {
        self.value(self.min_register(key))
    }

    fn reset(&mut self) {
        self.registers.fill(0);
    }

    /// Adds the counts of `other` register by register.
    ///
    /// The merged register takes the class whose value is closest to the sum of both values.
    fn merge(&mut self, other: &Self) -> Result<(), Error> {
        if self.width != other.width || self.depth != other.depth {
            return Err(Error::invalid_argument(format!(
                "cannot merge a {}x{} sketch into a {}x{} sketch",
                other.width, other.depth, self.width, self.depth
            )));
        }
        let exp = self.exp;
        for (ours, &theirs) in self.registers.iter_mut().zip(&other.registers) {
            if theirs != 0 {
                *ours = class_for(exp, value(exp, *ours) + value(other.exp, theirs));
            }
        }
        Ok(())
    }

    fn write_to<W: Write>(&self, w: &mut SketchWriter<W>) -> Result<(), Error> {
        w.write_i32(self.width as i32)?;
        w.write_i32(self.depth as i32)?;
        w.write_f64(self.exp)?;
        w.write_u16_sparse(&self.registers)
    }

    fn read_from<R: Read>(&mut self, r: &mut SketchReader<R>) -> Result<(), Error> {
        let width = ensure_positive(r.read_i32("width")?.into(), "width")?;
        let depth = ensure_positive(r.read_i32("depth")?.into(), "depth")?;
        let exp = r.read_f64("exp")?;
        if !(exp > 1.0 && exp.is_finite()) {
            return Err(Error::deserial(format!("exp must be > 1.0, got {exp}")));
        }
        let expected = width
            .checked_mul(depth)
            .filter(|&n| n <= MAX_DECODED_REGISTERS)
            .ok_or_else(|| {
                Error::deserial(format!(
                    "{width}x{depth} registers exceed {MAX_DECODED_REGISTERS}"
                ))
                .with_context("processed", r.processed())
            })?;
        let registers = r.read_u16_sparse_exact(expected)?;
        self.width = width;
        self.depth = depth;
        self.exp = exp;
        self.registers = registers;
        Ok(())
    }
}

/// Builder for [`CountMinLogSketch`].
#[derive(Debug, Clone)]
pub struct CountMinLogSketchBuilder {
    capacity: u64,
    error_rate: f64,
    seed: u64,
}

impl Default for CountMinLogSketchBuilder {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            error_rate: DEFAULT_ERROR_RATE,
            seed: DEFAULT_SEED,
        }
    }
}

impl CountMinLogSketchBuilder {
    /// Sets the expected number of events. Values below one million are raised to one million.
    pub fn capacity(mut self, capacity: u64) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the relative error, in `[0.001, 1.0)`.
    pub fn error_rate(mut self, error_rate: f64) -> Self {
        self.error_rate = error_rate;
        self
    }

    /// Sets the seed of the RNG driving update decisions.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Builds the sketch.
    pub fn build(self) -> Result<CountMinLogSketch, Error> {
        let (width, depth) = CountMinLogSketch::dimensions_for(self.capacity, self.error_rate)?;
        Ok(CountMinLogSketch::with_seed(width, depth, self.seed))
    }
}

/// Returns the register index of `key` in each of the `depth` rows.
pub(crate) fn positions(
    key: &[u8],
    width: usize,
    depth: usize,
) -> impl Iterator<Item = usize> + use<> {
    let hash = xxh3_64(key);
    let h1 = hash as u32;
    let h2 = (hash >> 32) as u32;
    (0..depth).map(move |i| {
        let salted = h1.wrapping_add((i as u32).wrapping_mul(h2));
        i * width + salted as usize % width
    })
}

fn point_value(exp: f64, c: u16) -> f64 {
    if c == 0 {
        0.0
    } else {
        exp.powf(f64::from(c - 1))
    }
}

/// Returns the expected count represented by a register at class `c`.
pub(crate) fn value(exp: f64, c: u16) -> f64 {
    if c <= 1 {
        return point_value(exp, c);
    }
    // geometric sum of the point values up to `c`, i.e. (1 - point_value(c + 1)) / (1 - exp)
    (1.0 - exp.powf(f64::from(c))) / (1.0 - exp)
}

/// Returns the class whose value is closest to `count`, the inverse of [`value`].
pub(crate) fn class_for(exp: f64, count: f64) -> u16 {
    if count <= 0.0 {
        return 0;
    }
    let c = (1.0 + count * (exp - 1.0)).ln() / exp.ln();
    c.round().min(f64::from(u16::MAX)) as u16
}

pub(crate) fn increase_decision(rng: &mut StdRng, exp: f64, c: u16) -> bool {
    rng.random::<f64>() < 1.0 / exp.powf(f64::from(c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_dimensions() {
        assert_eq!(
            CountMinLogSketch::dimensions_for(1_000_000, 0.01).unwrap(),
            (1_369_294, 7)
        );
        // small capacities are raised to one million
        assert_eq!(
            CountMinLogSketch::dimensions_for(10, 0.01).unwrap(),
            CountMinLogSketch::dimensions_for(1_000_000, 0.01).unwrap()
        );
    }

    #[test]
    fn test_invalid_error_rate() {
        for e in [0.0, 0.0009, 1.0, 1.5, -0.1, f64::NAN] {
            let err = CountMinLogSketch::with_capacity(1_000_000, e).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{e}");
        }
        assert!(CountMinLogSketch::dimensions_for(1, 0.001).is_ok());
    }

    #[test]
    fn test_value_function() {
        let sketch = CountMinLogSketch::new(1, 1);
        assert_eq!(sketch.value(0), 0.0);
        assert_eq!(sketch.value(1), 1.0);
        assert!((sketch.value(2) - (1.0 + DEFAULT_EXP)).abs() < 1e-9);
        let mut last = 0.0;
        for c in 0..2000u16 {
            let v = sketch.value(c);
            assert!(v >= last, "value({c}) = {v} < {last}");
            last = v;
        }
    }

    #[test]
    fn test_saturated_register_is_never_raised() {
        let mut sketch = CountMinLogSketch::new(1, 1);
        sketch.registers[0] = u16::MAX;
        sketch.inc(b"x");
        assert_eq!(sketch.registers[0], u16::MAX);
    }

    #[test]
    fn test_conservative_update() {
        let mut sketch = CountMinLogSketch::new(8, 3);
        let positions: Vec<usize> = sketch.positions(b"k").collect();
        sketch.registers[positions[0]] = 5;
        // first increment always succeeds: 1 / exp^0 == 1
        sketch.inc(b"k");
        assert_eq!(sketch.registers[positions[0]], 5);
        assert_eq!(sketch.registers[positions[1]], 1);
        assert_eq!(sketch.registers[positions[2]], 1);
        assert_eq!(sketch.min_register(b"k"), 1);
    }

    #[test]
    fn test_class_for_inverts_value() {
        for c in [0u16, 1, 2, 10, 500, 30_000] {
            assert_eq!(class_for(DEFAULT_EXP, value(DEFAULT_EXP, c)), c);
        }
        assert_eq!(class_for(DEFAULT_EXP, f64::MAX), u16::MAX);
    }

    #[test]
    fn test_merge_adds_values() {
        let mut a = CountMinLogSketch::with_seed(64, 3, 1);
        let mut b = CountMinLogSketch::with_seed(64, 3, 2);
        for _ in 0..20 {
            a.inc(b"k");
            b.inc(b"k");
        }
        let expected = a.get(b"k") + b.get(b"k");
        a.merge(&b).unwrap();
        assert!((a.get(b"k") - expected).abs() <= 1.5, "{} vs {expected}", a.get(b"k"));

        let err = a.merge(&CountMinLogSketch::new(32, 3)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_reset() {
        let mut sketch = CountMinLogSketch::new(16, 2);
        sketch.inc(b"a");
        assert!(!sketch.is_empty());
        sketch.reset();
        assert!(sketch.is_empty());
        assert_eq!(sketch.get(b"a"), 0.0);
    }

    #[test]
    fn test_read_rejects_mismatched_registers() {
        let mut w = SketchWriter::new(Vec::new());
        w.write_i32(4).unwrap();
        w.write_i32(2).unwrap();
        w.write_f64(DEFAULT_EXP).unwrap();
        w.write_u16_sparse(&[0; 7]).unwrap();
        let err = CountMinLogSketch::deserialize(&w.into_inner()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn test_read_checks_register_count_before_decoding() {
        let mut w = SketchWriter::new(Vec::new());
        w.write_i32(1).unwrap();
        w.write_i32(1).unwrap();
        w.write_f64(DEFAULT_EXP).unwrap();
        w.write_i64(u32::MAX as i64).unwrap();
        let bytes = w.into_inner();
        assert_eq!(bytes.len(), 24);

        let err = CountMinLogSketch::deserialize(&bytes).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
        assert_eq!(err.context_value("processed"), Some("24"));

        let mut w = SketchWriter::new(Vec::new());
        w.write_i32(i32::MAX).unwrap();
        w.write_i32(i32::MAX).unwrap();
        w.write_f64(DEFAULT_EXP).unwrap();
        let err = CountMinLogSketch::deserialize(&w.into_inner()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }
}
