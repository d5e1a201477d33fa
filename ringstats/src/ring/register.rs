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

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::error::Error;
use crate::sketch::CountMinLogSketch;
use crate::sketch::DEFAULT_EXP;
use crate::sketch::cml::DEFAULT_SEED;
use crate::sketch::cml::increase_decision;
use crate::sketch::cml::positions;
use crate::sketch::cml::value;
use crate::window::Placement;
use crate::window::place;
use crate::window::slide;
use crate::window::start_ending_at;

/// A single 16-bit register remembered over a window of time buckets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingRegister {
    start: usize,
    offset: i64,
    values: Vec<u16>,
}

impl RingRegister {
    /// Creates a register covering `[offset, offset + ring_size)`.
    ///
    /// # Panics
    ///
    /// Panics if `ring_size` is zero.
    pub fn new(offset: i64, ring_size: usize) -> Self {
        assert!(ring_size > 0, "ring size must be positive");
        Self {
            start: 0,
            offset,
            values: vec![0; ring_size],
        }
    }

    /// Returns the first bucket of the window.
    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Returns the value held for `bucket`, or zero outside the window.
    pub fn get(&self, bucket: i64) -> u16 {
        self.position(bucket).map_or(0, |pos| self.values[pos])
    }

    /// Stores `value` for `bucket`, sliding the window forward if needed.
    ///
    /// A no-op when `bucket` is older than the window.
    pub fn set(&mut self, bucket: i64, value: u16) {
        let len = self.values.len();
        let delta = match place(self.offset, len, bucket) {
            Placement::Before => return,
            Placement::Inside(delta) => delta,
            Placement::After(steps) => {
                slide(&mut self.values, &mut self.start, steps, |v| *v = 0);
                self.offset = start_ending_at(bucket, len);
                len - 1
            }
        };
        self.values[(self.start + delta) % len] = value;
    }

    fn position(&self, bucket: i64) -> Option<usize> {
        match place(self.offset, self.values.len(), bucket) {
            Placement::Inside(delta) => Some((self.start + delta) % self.values.len()),
            _ => None,
        }
    }
}

/// A count-min-log sketch whose every register is a [`RingRegister`].
///
/// Unlike a [`super::RingSketch`] of count-min-log sketches, each register slides its own
/// window when it is written, so memory is `depth * width * ring_size` registers regardless
/// of how buckets are spread.
#[derive(Debug, Clone)]
pub struct RegisterRingSketch {
    width: usize,
    depth: usize,
    exp: f64,
    registers: Vec<RingRegister>,
    rng: StdRng,
}

impl RegisterRingSketch {
    /// Creates a `depth x width` sketch whose registers cover `ring_size` buckets from
    /// `offset`.
    ///
    /// # Panics
    ///
    /// Panics if `width`, `depth` or `ring_size` is zero.
    pub fn new(width: usize, depth: usize, ring_size: usize, offset: i64) -> Self {
        Self::with_seed(width, depth, ring_size, offset, DEFAULT_SEED)
    }

    /// Like [`RegisterRingSketch::new`] with update decisions drawn from an RNG seeded with
    /// `seed`.
    ///
    /// # Panics
    ///
    /// Panics if `width`, `depth` or `ring_size` is zero.
    pub fn with_seed(width: usize, depth: usize, ring_size: usize, offset: i64, seed: u64) -> Self {
        assert!(width > 0, "width must be positive");
        assert!(depth > 0, "depth must be positive");
        Self {
            width,
            depth,
            exp: DEFAULT_EXP,
            registers: vec![RingRegister::new(offset, ring_size); width * depth],
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Creates a sketch sized like [`CountMinLogSketch::with_capacity`].
    ///
    /// Fails if `error_rate` is not in `[0.001, 1.0)`.
    pub fn with_capacity(
        capacity: u64,
        error_rate: f64,
        ring_size: usize,
        offset: i64,
    ) -> Result<Self, Error> {
        let (width, depth) = CountMinLogSketch::dimensions_for(capacity, error_rate)?;
        Ok(Self::new(width, depth, ring_size, offset))
    }

    /// Returns the number of registers per row.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the number of rows.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Counts one occurrence of `key` in `bucket`.
    pub fn inc(&mut self, bucket: i64, key: &[u8]) {
        let positions: Vec<usize> = positions(key, self.width, self.depth).collect();
        let c = positions
            .iter()
            .map(|&pos| self.registers[pos].get(bucket))
            .min()
            .unwrap_or(u16::MAX);
        if c == u16::MAX {
            return;
        }
        if increase_decision(&mut self.rng, self.exp, c) {
            for pos in positions {
                let register = &mut self.registers[pos];
                if register.get(bucket) == c {
                    register.set(bucket, c + 1);
                }
            }
        }
    }

    /// Returns the estimated count of `key` in `bucket`.
    pub fn get(&self, bucket: i64, key: &[u8]) -> f64 {
        let c = positions(key, self.width, self.depth)
            .map(|pos| self.registers[pos].get(bucket))
            .min()
            .unwrap_or(0);
        value(self.exp, c)
    }
}
