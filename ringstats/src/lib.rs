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

//! Time-windowed event counters and frequency sketches.
//!
//! The crate provides:
//!
//! * [`meter::Meter`], an exact per-second counter over a sliding window;
//! * [`registry::Registry`], a concurrent map of meters keyed by name and tags;
//! * [`sketch::CountMinLogSketch`] and [`sketch::ExactMapSketch`], per-key frequency
//!   counters behind the [`sketch::Sketch`] trait;
//! * [`ring::RingSketch`] and [`ring::RegisterRingSketch`], which keep frequency counts over a
//!   sliding window of time buckets;
//! * [`codec`], the big-endian binary format every sketch is persisted with.
//!
//! # Usage
//!
//! ```rust
//! # use ringstats::registry::Registry;
//! # use ringstats::ring::RingSketch;
//! # use ringstats::sketch::CountMinLogSketch;
//! let registry = Registry::new();
//! registry.get_or_create("requests", [("path", "/")]).add_at(1_700_000_000, 1);
//! assert_eq!(registry.len(), 1);
//!
//! let cml = || CountMinLogSketch::new(4096, 4);
//! let mut hourly = RingSketch::with_factory(24, 0, cml);
//! hourly.inc(5, b"user-42");
//! assert_eq!(hourly.get(5, b"user-42"), 1.0);
//!
//! let restored = {
//!     let mut ring = RingSketch::with_factory(1, 0, cml);
//!     ring.deserialize_into(&hourly.serialize()).unwrap();
//!     ring
//! };
//! assert_eq!(restored.get(5, b"user-42"), 1.0);
//! ```

pub mod codec;
pub mod error;
pub mod key;
pub mod meter;
pub mod registry;
pub mod ring;
pub mod sketch;
mod window;

pub use self::error::Error;
pub use self::error::ErrorKind;
