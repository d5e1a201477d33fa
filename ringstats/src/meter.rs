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

//! Exact per-second event counters over a sliding window.
//!
//! A [`Meter`] is a fixed-size ring buffer in which every slot counts the events of one absolute
//! second. The buffer always holds the `size` most recent consecutive seconds ending at the
//! highest second ever written. Writes older than the window are dropped and reads outside the
//! window return zero.
//!
//! # Usage
//!
//! ```rust
//! # use ringstats::meter::Meter;
//! let meter = Meter::new(3);
//! meter.add_at(100, 1);
//! meter.add_at(101, 2);
//! meter.add_at(103, 5);
//! assert_eq!(meter.get(100), 0);
//! assert_eq!(meter.values(), vec![101, 2, 0, 5]);
//! assert_eq!(meter.to_string(), "[101,2,0,5]");
//! ```

use std::fmt;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use parking_lot::RwLock;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use serde::ser::SerializeSeq;

use crate::error::Error;
use crate::window::Placement;
use crate::window::place;
use crate::window::slide;
use crate::window::start_ending_at;

/// Number of seconds kept by a meter when no size is configured.
pub const DEFAULT_BUFFER_SIZE: usize = 600;

/// An exact event counter bucketed by second.
///
/// Every meter owns its own lock, so increments on different meters never contend.
///
/// Merging is additive but not commutative when the two windows differ: each side drops
/// seconds older than its own window, so `a.merge(&b)` can keep data that `b.merge(&a)` loses.
#[derive(Debug)]
pub struct Meter {
    window: RwLock<Window>,
}

#[derive(Debug, Clone)]
struct Window {
    slots: Vec<i64>,
    cursor: usize,
    start_sec: i64,
    anchored: bool,
}

impl Window {
    fn new(size: usize) -> Self {
        assert!(size > 0, "meter size must be positive");
        Self {
            slots: vec![0; size],
            cursor: 0,
            start_sec: 0,
            anchored: false,
        }
    }

    fn add(&mut self, sec: i64, delta: i64) {
        if !self.anchored {
            self.start_sec = sec;
            self.anchored = true;
        }
        let offset = match place(self.start_sec, self.slots.len(), sec) {
            Placement::Before => return,
            Placement::Inside(offset) => offset,
            Placement::After(steps) => {
                if slide(&mut self.slots, &mut self.cursor, steps, |v| *v = 0) {
                    log::trace!(
                        "meter window jumps from {} by {steps} seconds",
                        self.start_sec
                    );
                }
                self.start_sec = start_ending_at(sec, self.slots.len());
                self.slots.len() - 1
            }
        };
        let pos = (self.cursor + offset) % self.slots.len();
        self.slots[pos] = self.slots[pos].saturating_add(delta);
    }

    fn get(&self, sec: i64) -> i64 {
        match place(self.start_sec, self.slots.len(), sec) {
            Placement::Inside(offset) if self.anchored => {
                self.slots[(self.cursor + offset) % self.slots.len()]
            }
            _ => 0,
        }
    }

    fn chronological(&self) -> Vec<i64> {
        let len = self.slots.len();
        (0..len)
            .map(|i| {
                if self.anchored {
                    self.slots[(self.cursor + i) % len]
                } else {
                    0
                }
            })
            .collect()
    }
}

impl Meter {
    /// Creates a meter holding `size` seconds.
    ///
    /// The window is anchored at the second of the first write.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero.
    pub fn new(size: usize) -> Self {
        Self {
            window: RwLock::new(Window::new(size)),
        }
    }

    /// Creates a meter whose window already starts at `start_sec`.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero.
    pub fn anchored(start_sec: i64, size: usize) -> Self {
        let mut window = Window::new(size);
        window.start_sec = start_sec;
        window.anchored = true;
        Self {
            window: RwLock::new(window),
        }
    }

    /// Builds a meter from its `[window_start, value_0, ..., value_n]` form.
    ///
    /// The meter size is the number of values.
    pub fn from_values(values: &[i64]) -> Result<Self, Error> {
        if values.len() < 2 {
            return Err(Error::deserial(format!(
                "meter array needs a window start and at least one value, got {} elements",
                values.len()
            )));
        }
        let meter = Self::new(values.len() - 1);
        meter.restore(values);
        Ok(meter)
    }

    /// Returns the number of seconds held by this meter.
    pub fn size(&self) -> usize {
        self.window.read().slots.len()
    }

    /// Returns the first second of the window, or `None` before the first write.
    pub fn window_start(&self) -> Option<i64> {
        let window = self.window.read();
        window.anchored.then_some(window.start_sec)
    }

    /// Counts one event at `time`.
    pub fn inc(&self, time: SystemTime) {
        self.add(time, 1);
    }

    /// Adds `delta` events at `time`.
    pub fn add(&self, time: SystemTime, delta: i64) {
        self.add_at(unix_seconds(time), delta);
    }

    /// Adds `delta` events at the absolute second `sec`.
    ///
    /// Slides the window forward when `sec` is past its end; a no-op when `sec` is before it.
    pub fn add_at(&self, sec: i64, delta: i64) {
        self.window.write().add(sec, delta);
    }

    /// Returns the count at the absolute second `sec`, or zero outside the window.
    pub fn get(&self, sec: i64) -> i64 {
        self.window.read().get(sec)
    }

    /// Adds every second held by `other` into this meter.
    pub fn merge(&self, other: &Meter) {
        self.merge_since(other, i64::MIN);
    }

    /// Adds the seconds of `other` that are not older than `since_sec` into this meter.
    pub fn merge_since(&self, other: &Meter, since_sec: i64) {
        let (start, values) = {
            let theirs = other.window.read();
            if !theirs.anchored {
                return;
            }
            (theirs.start_sec, theirs.chronological())
        };
        let mut ours = self.window.write();
        for (i, value) in values.into_iter().enumerate() {
            // seconds past i64::MAX are never written, so they are all zero
            let Some(sec) = start.checked_add(i as i64) else {
                break;
            };
            if sec >= since_sec {
                ours.add(sec, value);
            }
        }
    }

    /// Returns `[window_start, value_0, ..., value_n]` in chronological order.
    pub fn values(&self) -> Vec<i64> {
        let window = self.window.read();
        let mut out = Vec::with_capacity(window.slots.len() + 1);
        out.push(window.start_sec);
        out.extend(window.chronological());
        out
    }

    /// Replaces the state of this meter with a `[window_start, value_0, ...]` array.
    ///
    /// Values beyond the meter size are dropped and missing values are zero. An empty array
    /// leaves the meter untouched.
    pub fn restore(&self, values: &[i64]) {
        let Some((&start, rest)) = values.split_first() else {
            return;
        };
        let mut window = self.window.write();
        if rest.len() > window.slots.len() {
            log::warn!(
                "meter snapshot holds {} seconds, keeping the first {}",
                rest.len(),
                window.slots.len()
            );
        }
        window.slots.fill(0);
        let n = rest.len().min(window.slots.len());
        window.slots[..n].copy_from_slice(&rest[..n]);
        window.cursor = 0;
        window.start_sec = start;
        window.anchored = true;
    }
}

impl Clone for Meter {
    fn clone(&self) -> Self {
        Self {
            window: RwLock::new(self.window.read().clone()),
        }
    }
}

impl fmt::Display for Meter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, v) in self.values().iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{v}")?;
        }
        write!(f, "]")
    }
}

impl Serialize for Meter {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let values = self.values();
        let mut seq = serializer.serialize_seq(Some(values.len()))?;
        for v in &values {
            seq.serialize_element(v)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Meter {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let values = Vec::<i64>::deserialize(deserializer)?;
        Meter::from_values(&values).map_err(serde::de::Error::custom)
    }
}

/// Converts `time` to whole seconds since the Unix epoch, rounding down.
pub fn unix_seconds(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(err) => {
            let d = err.duration();
            let secs = -(d.as_secs() as i64);
            if d.subsec_nanos() > 0 { secs - 1 } else { secs }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn window_of(meter: &Meter, start: i64, len: i64) -> Vec<i64> {
        (start..start + len).map(|sec| meter.get(sec)).collect()
    }

    #[test]
    fn test_window_slides() {
        let t0 = 1_500_000_000;
        let m = Meter::new(3);

        m.add_at(t0, 1);
        m.add_at(t0 - 1, 1);
        m.add_at(t0 + 1, 2);
        m.add_at(t0 + 2, 3);
        assert_eq!(window_of(&m, t0, 3), vec![1, 2, 3]);

        m.add_at(t0 + 3, 2);
        assert_eq!(window_of(&m, t0 + 1, 3), vec![2, 3, 2]);

        m.add_at(t0 + 13, 1);
        assert_eq!(window_of(&m, t0 + 11, 3), vec![0, 0, 1]);
        assert_eq!(m.window_start(), Some(t0 + 11));
    }

    #[test]
    fn test_get_outside_window_has_no_effect() {
        let m = Meter::anchored(10, 2);
        m.add_at(10, 4);
        assert_eq!(m.get(9), 0);
        assert_eq!(m.get(12), 0);
        assert_eq!(m.values(), vec![10, 4, 0]);
    }

    #[test]
    fn test_unanchored_meter() {
        let m = Meter::new(2);
        assert_eq!(m.window_start(), None);
        assert_eq!(m.get(0), 0);
        assert_eq!(m.to_string(), "[0,0,0]");
    }

    #[test]
    fn test_system_time() {
        let now = UNIX_EPOCH + Duration::from_secs(1_000);
        let m = Meter::new(2);
        m.inc(now);
        m.add(now + Duration::from_millis(1_500), 3);
        assert_eq!(m.values(), vec![1_000, 1, 3]);
        assert_eq!(unix_seconds(UNIX_EPOCH - Duration::from_millis(500)), -1);
        assert_eq!(unix_seconds(UNIX_EPOCH - Duration::from_secs(2)), -2);
    }

    #[test]
    fn test_merge_drops_older_seconds() {
        let now = 1_000;
        let m1 = Meter::anchored(now, 2);
        m1.add_at(now, 1);
        m1.add_at(now + 1, 2);

        let m2 = Meter::anchored(now, 2);
        m2.add_at(now + 1, 3);
        m2.add_at(now + 2, 4);
        m2.merge(&m1);
        assert_eq!(m2.to_string(), "[1001,5,4]");

        let m2 = Meter::anchored(now, 2);
        m2.add_at(now - 1, 3);
        m2.add_at(now, 4);
        m2.merge(&m1);
        assert_eq!(m2.to_string(), "[1000,5,2]");

        let m2 = Meter::anchored(now - 1, 2);
        m2.add_at(now - 1, 3);
        m2.add_at(now, 4);
        m2.merge(&m1);
        assert_eq!(m2.to_string(), "[1000,5,2]");
    }

    #[test]
    fn test_merge_since() {
        let src = Meter::anchored(100, 3);
        src.add_at(100, 1);
        src.add_at(101, 2);
        src.add_at(102, 3);

        let dst = Meter::anchored(100, 3);
        dst.merge_since(&src, 101);
        assert_eq!(dst.values(), vec![100, 0, 2, 3]);
    }

    #[test]
    fn test_merge_into_self() {
        let m = Meter::anchored(5, 2);
        m.add_at(5, 1);
        m.add_at(6, 2);
        m.merge(&m);
        assert_eq!(m.values(), vec![5, 2, 4]);
    }

    #[test]
    fn test_merge_unanchored_is_noop() {
        let m = Meter::anchored(5, 2);
        m.add_at(6, 1);
        m.merge(&Meter::new(4));
        assert_eq!(m.values(), vec![5, 0, 1]);
    }

    #[test]
    fn test_restore() {
        let m = Meter::new(3);
        m.restore(&[50, 1, 2]);
        assert_eq!(m.values(), vec![50, 1, 2, 0]);

        m.restore(&[60, 1, 2, 3, 4]);
        assert_eq!(m.values(), vec![60, 1, 2, 3]);

        m.restore(&[]);
        assert_eq!(m.values(), vec![60, 1, 2, 3]);
    }

    #[test]
    fn test_large_jump_clears_everything() {
        let m = Meter::anchored(0, 4);
        for sec in 0..4 {
            m.add_at(sec, 1);
        }
        m.add_at(1_000_000, 7);
        assert_eq!(m.values(), vec![999_997, 0, 0, 0, 7]);
    }

    #[test]
    fn test_json() {
        let m = Meter::anchored(1_000, 3);
        m.add_at(1_000, 1);
        m.add_at(1_001, 2);
        m.add_at(1_002, 3);
        m.add_at(1_003, 4);
        let json = serde_json::to_string(&m).unwrap();
        insta::assert_snapshot!(json, @"[1001,2,3,4]");

        let decoded: Meter = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.size(), 3);
        assert_eq!(serde_json::to_string(&decoded).unwrap(), json);

        assert!(serde_json::from_str::<Meter>("[1]").is_err());
    }

    #[test]
    #[should_panic(expected = "meter size must be positive")]
    fn test_zero_size_panics() {
        let _ = Meter::new(0);
    }
}
