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

//! Index arithmetic shared by the ring buffers keyed by absolute time.
//!
//! A window of `len` slots covers `[start, start + len)`. The end of the window may lie past
//! `i64::MAX`, so positions are always measured as unsigned distances from `start` and never
//! by adding to it.

/// Where an absolute index falls relative to a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Placement {
    /// Before the start of the window.
    Before,
    /// Inside the window, this many slots after its start.
    Inside(usize),
    /// Past the end of the window, which must slide forward by this many slots to hold it.
    After(u64),
}

pub(crate) fn place(start: i64, len: usize, at: i64) -> Placement {
    if at < start {
        return Placement::Before;
    }
    let distance = at.abs_diff(start);
    let len = len as u64;
    if distance < len {
        Placement::Inside(distance as usize)
    } else {
        Placement::After(distance - len + 1)
    }
}

/// Returns the start of the window of `len` slots whose last slot is `at`.
pub(crate) fn start_ending_at(at: i64, len: usize) -> i64 {
    // `at` lies past a window that started no lower than i64::MIN, so this cannot underflow
    at - (len as i64 - 1)
}

/// Slides a ring forward by `steps` slots, resetting every slot that leaves the window.
///
/// Returns true if the whole ring was reset at once.
pub(crate) fn slide<T>(
    slots: &mut [T],
    cursor: &mut usize,
    steps: u64,
    mut reset: impl FnMut(&mut T),
) -> bool {
    let len = slots.len();
    if steps >= len as u64 {
        slots.iter_mut().for_each(&mut reset);
        *cursor = (*cursor + (steps % len as u64) as usize) % len;
        return true;
    }
    for _ in 0..steps {
        reset(&mut slots[*cursor]);
        *cursor = (*cursor + 1) % len;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_place() {
        assert_eq!(place(10, 3, 9), Placement::Before);
        assert_eq!(place(10, 3, 12), Placement::Inside(2));
        assert_eq!(place(10, 3, 13), Placement::After(1));
        assert_eq!(place(i64::MAX, 3, i64::MAX), Placement::Inside(0));
        assert_eq!(place(i64::MIN, 2, i64::MAX), Placement::After(u64::MAX - 1));
    }

    #[test]
    fn test_start_ending_at() {
        assert_eq!(start_ending_at(12, 3), 10);
        assert_eq!(start_ending_at(i64::MAX, 1), i64::MAX);
    }

    #[test]
    fn test_slide() {
        let mut slots = [1, 2, 3];
        let mut cursor = 1;
        assert!(!slide(&mut slots, &mut cursor, 2, |v| *v = 0));
        assert_eq!((slots, cursor), ([1, 0, 0], 0));

        let mut slots = [1, 2, 3];
        let mut cursor = 0;
        assert!(!slide(&mut slots, &mut cursor, 1, |v| *v = 0));
        assert_eq!((slots, cursor), ([0, 2, 3], 1));

        assert!(slide(&mut slots, &mut cursor, u64::MAX, |v| *v = 9));
        assert_eq!(slots, [9, 9, 9]);
        assert_eq!(cursor, (1 + (u64::MAX % 3) as usize) % 3);
    }
}
