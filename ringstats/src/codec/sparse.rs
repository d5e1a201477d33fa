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

//! Run-length "sparse" encoding for `u16` arrays that are mostly zero.
//!
//! Layout:
//!
//! ```text
//! i64 total_len
//! ( i64 start  u16 value* u16 0 )*   start is the 1-based index of the first value of a run
//! i64 0
//! ```
//!
//! Runs hold only nonzero values, so a literal `0` ends a run and a zero `start` ends the array.

use std::io::Read;
use std::io::Write;

use crate::codec::SketchReader;
use crate::codec::SketchWriter;
use crate::codec::assert::ensure_index_in;
use crate::codec::assert::ensure_len;
use crate::error::Error;
use crate::error::ErrorKind;

impl<W: Write> SketchWriter<W> {
    /// Writes `values` in the sparse run-length format.
    pub fn write_u16_sparse(&mut self, values: &[u16]) -> Result<(), Error> {
        self.write_i64(values.len() as i64)?;
        let mut i = 0;
        while i < values.len() {
            while i < values.len() && values[i] == 0 {
                i += 1;
            }
            if i == values.len() {
                break;
            }
            self.write_i64(i as i64 + 1)?;
            while i < values.len() && values[i] != 0 {
                self.write_u16(values[i])?;
                i += 1;
            }
            self.write_u16(0)?;
        }
        self.write_i64(0)
    }
}

impl<R: Read> SketchReader<R> {
    /// Reads an array written by [`SketchWriter::write_u16_sparse`].
    ///
    /// The stream may also end cleanly where a run marker or a run value is expected; whatever
    /// has been decoded up to that point is returned. A run that would write past the declared
    /// length fails with [`ErrorKind::OutOfRange`].
    pub fn read_u16_sparse(&mut self) -> Result<Vec<u16>, Error> {
        let len = self.read_i64("sparse length")?;
        let len = ensure_len(len, "sparse length")
            .map_err(|e| e.with_context("processed", self.processed()))?;
        self.read_u16_runs(len)
    }

    /// Like [`SketchReader::read_u16_sparse`], failing with [`ErrorKind::InvalidData`] unless
    /// the declared length is `expected`.
    pub fn read_u16_sparse_exact(&mut self, expected: usize) -> Result<Vec<u16>, Error> {
        let len = self.read_i64("sparse length")?;
        if usize::try_from(len).ok() != Some(expected) {
            return Err(Error::deserial(format!(
                "expected {expected} sparse values, got {len}"
            ))
            .with_context("processed", self.processed()));
        }
        self.read_u16_runs(expected)
    }

    // The declared length is untrusted, so the array only grows as values arrive and is
    // padded to `len` once the runs are exhausted.
    fn read_u16_runs(&mut self, len: usize) -> Result<Vec<u16>, Error> {
        let mut values = Vec::new();
        loop {
            let Some(start) = self.try_read_i64("sparse run start")? else {
                break;
            };
            if start == 0 {
                break;
            }
            if start < 0 {
                return Err(Error::new(
                    ErrorKind::OutOfRange,
                    format!("out of range {start} in {len}"),
                )
                .with_context("processed", self.processed()));
            }
            let mut i = (start - 1) as usize;
            loop {
                let Some(value) = self.try_read_u16("sparse run value")? else {
                    values.resize(len, 0);
                    return Ok(values);
                };
                if value == 0 {
                    break;
                }
                ensure_index_in(i, len)
                    .map_err(|e| e.with_context("processed", self.processed()))?;
                if values.len() <= i {
                    values.resize(i + 1, 0);
                }
                values[i] = value;
                i += 1;
            }
        }
        values.resize(len, 0);
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(values: &[u16]) -> Vec<u8> {
        let mut w = SketchWriter::new(Vec::new());
        w.write_u16_sparse(values).unwrap();
        let n = w.processed();
        let bytes = w.into_inner();
        assert_eq!(n, bytes.len());
        bytes
    }

    #[test]
    fn test_round_trip() {
        let cases: &[&[u16]] = &[
            &[],
            &[0],
            &[0xABCD],
            &[0, 1],
            &[1, 0],
            &[1, 1],
            &[1, 0, 1],
            &[0, 1, 0],
            &[1, 0, 1, 0],
            &[0, 1, 0, 1],
            &[0, 1, 1, 0],
            &[1, 1, 0, 1, 1],
            &[0, 0, 0, 0, 0, 0],
            &[u16::MAX; 5],
        ];
        for &case in cases {
            let bytes = encode(case);
            let mut r = SketchReader::new(bytes.as_slice());
            let decoded = r.read_u16_sparse().unwrap();
            assert_eq!(decoded, case, "case {case:?}");
            assert_eq!(r.processed(), bytes.len(), "case {case:?}");
        }
    }

    #[test]
    fn test_layout() {
        // len=3, run at 2 holding [5], terminator, end marker
        let bytes = encode(&[0, 5, 0]);
        let mut expected = Vec::new();
        expected.extend_from_slice(&3i64.to_be_bytes());
        expected.extend_from_slice(&2i64.to_be_bytes());
        expected.extend_from_slice(&5u16.to_be_bytes());
        expected.extend_from_slice(&0u16.to_be_bytes());
        expected.extend_from_slice(&0i64.to_be_bytes());
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_all_zero_is_compact() {
        assert_eq!(encode(&[0; 1000]).len(), 16);
    }

    #[test]
    fn test_run_past_end_is_out_of_range() {
        let mut w = SketchWriter::new(Vec::new());
        w.write_i64(2).unwrap();
        w.write_i64(2).unwrap();
        w.write_u16(1).unwrap();
        w.write_u16(2).unwrap();
        w.write_u16(0).unwrap();
        w.write_i64(0).unwrap();
        let bytes = w.into_inner();

        let err = SketchReader::new(bytes.as_slice())
            .read_u16_sparse()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfRange);
    }

    #[test]
    fn test_negative_run_start_is_out_of_range() {
        let mut w = SketchWriter::new(Vec::new());
        w.write_i64(2).unwrap();
        w.write_i64(-4).unwrap();
        let bytes = w.into_inner();

        let err = SketchReader::new(bytes.as_slice())
            .read_u16_sparse()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfRange);
    }

    #[test]
    fn test_clean_end_inside_run() {
        let mut w = SketchWriter::new(Vec::new());
        w.write_i64(3).unwrap();
        w.write_i64(1).unwrap();
        w.write_u16(9).unwrap();
        let bytes = w.into_inner();

        let decoded = SketchReader::new(bytes.as_slice())
            .read_u16_sparse()
            .unwrap();
        assert_eq!(decoded, vec![9, 0, 0]);
    }

    #[test]
    fn test_partial_marker_is_truncated() {
        let mut bytes = encode(&[1, 2]);
        bytes.truncate(bytes.len() - 3);
        let err = SketchReader::new(bytes.as_slice())
            .read_u16_sparse()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientData);
    }

    #[test]
    fn test_exact_length_is_checked_before_decoding() {
        let mut w = SketchWriter::new(Vec::new());
        w.write_i64(u32::MAX as i64).unwrap();
        let bytes = w.into_inner();
        let err = SketchReader::new(bytes.as_slice())
            .read_u16_sparse_exact(4)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
        assert_eq!(err.context_value("processed"), Some("8"));

        let bytes = encode(&[0, 3, 0, 4]);
        let mut r = SketchReader::new(bytes.as_slice());
        assert_eq!(r.read_u16_sparse_exact(4).unwrap(), vec![0, 3, 0, 4]);
    }

    #[test]
    fn test_huge_length_with_truncated_run() {
        let mut w = SketchWriter::new(Vec::new());
        w.write_i64(u32::MAX as i64).unwrap();
        w.write_i64(1).unwrap();
        let mut bytes = w.into_inner();
        bytes.push(7);

        let err = SketchReader::new(bytes.as_slice())
            .read_u16_sparse()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientData);
    }
}
