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

use googletest::prelude::*;
use ringstats::ErrorKind;
use ringstats::ring::RegisterRingSketch;
use ringstats::ring::RingSketch;
use ringstats::sketch::CountMinLogSketch;

fn small_cml() -> CountMinLogSketch {
    CountMinLogSketch::new(1024, 4)
}

#[test]
fn test_window_eviction() {
    let mut ring = RingSketch::with_factory(24, 0, small_cml);
    for bucket in 0..24 {
        ring.inc(bucket, b"key");
    }
    for bucket in [24, 25, 100] {
        assert_eq!(ring.get(bucket, b"key"), 0.0);
    }
    assert_eq!(ring.get(0, b"key"), 1.0);

    ring.inc(24, b"key");
    assert_eq!(ring.offset(), 1);
    assert_eq!(ring.get(0, b"key"), 0.0);
    assert_eq!(ring.get(1, b"key"), 1.0);
    assert_eq!(ring.get(24, b"key"), 1.0);
}

#[test]
fn test_ring_of_exact_maps_counts_exactly() {
    let mut ring = RingSketch::exact_map(24, 1_000, 0);
    for i in 0..50 {
        ring.inc(0, b"b");
        assert_eq!((ring.get(0, b"b") + 0.5) as i64, i + 1);
    }
}

#[test]
fn test_ring_of_count_min_log_converges() {
    let mut ring = RingSketch::with_factory(24, 0, small_cml);
    for _ in 0..50 {
        ring.inc(0, b"b");
    }
    assert_that!(ring.get(0, b"b"), near(50.0, 3.0));
    assert_that!(ring.get(1, b"b"), eq(0.0));
}

#[test]
fn test_count_min_log_ring_sizing() {
    let ring = RingSketch::count_min_log(1, 1_000_000, 0.1, 7).unwrap();
    assert_eq!(ring.ring_size(), 1);
    assert_eq!(ring.offset(), 7);
    let bucket = ring.bucket(7).unwrap();
    assert_eq!((bucket.width(), bucket.depth()), (1_198_132, 4));

    let err = RingSketch::count_min_log(24, 1_000_000, 1.5, 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn test_merge_drops_buckets_before_window() {
    let mut a = RingSketch::exact_map(3, 8, 0);
    a.inc(0, b"k");
    a.inc(2, b"k");
    let mut b = RingSketch::exact_map(3, 8, 1);
    b.inc(1, b"k");
    b.inc(3, b"k");

    a.merge(&b).unwrap();
    assert_eq!(a.offset(), 1);
    let counts: Vec<f64> = (0..4).map(|bucket| a.get(bucket, b"k")).collect();
    assert_eq!(counts, vec![0.0, 1.0, 1.0, 1.0]);

    let mut late = RingSketch::exact_map(2, 8, 10);
    late.inc(10, b"k");
    late.merge(&a).unwrap();
    assert_eq!(late.offset(), 10);
    assert_eq!(late.get(10, b"k"), 1.0);
}

#[test]
fn test_merge_rejects_mismatched_buckets() {
    let mut a = RingSketch::with_factory(2, 0, small_cml);
    let mut b = RingSketch::with_factory(2, 0, || CountMinLogSketch::new(16, 2));
    b.inc(0, b"k");
    a.inc(0, b"k");
    let err = a.merge(&b).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn test_serialization_keeps_window() {
    let mut ring = RingSketch::with_factory(4, 0, small_cml);
    for bucket in [0, 3, 5, 5, 6] {
        ring.inc(bucket, b"k");
    }
    let bytes = ring.serialize();

    let mut restored = RingSketch::with_factory(1, 0, small_cml);
    restored.deserialize_into(&bytes).unwrap();
    assert_eq!(restored.ring_size(), 4);
    assert_eq!(restored.offset(), 3);
    for bucket in 0..8 {
        assert_eq!(restored.get(bucket, b"k"), ring.get(bucket, b"k"));
    }
    assert_eq!(restored.serialize(), bytes);

    let err = restored.deserialize_into(&bytes[..bytes.len() - 1]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientData);
}

#[test]
fn test_register_ring_sketch() {
    let mut sketch = RegisterRingSketch::with_seed(1024, 4, 24, 0, 11);
    for _ in 0..50 {
        sketch.inc(3, b"b");
    }
    assert_that!(sketch.get(3, b"b"), near(50.0, 3.0));
    assert_that!(sketch.get(4, b"b"), eq(0.0));

    sketch.inc(30, b"b");
    assert_that!(sketch.get(3, b"b"), eq(0.0));
    assert_that!(sketch.get(30, b"b"), eq(1.0));
}
