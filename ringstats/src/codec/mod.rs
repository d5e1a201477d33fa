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

//! Big-endian binary codec shared by every stateful component.
//!
//! All integers are written in network byte order with fixed widths: 2 bytes for 16-bit,
//! 4 bytes for 32-bit and 8 bytes for 64-bit values. Floats are written through their IEEE-754
//! bit pattern. Strings and dense arrays carry an 8-byte length prefix.
//!
//! The format has no version tag, so writers and readers must agree on field order.
//!
//! # Usage
//!
//! ```rust
//! # use ringstats::codec::SketchReader;
//! # use ringstats::codec::SketchWriter;
//! let mut writer = SketchWriter::new(Vec::new());
//! writer.write_i64(-42).unwrap();
//! writer.write_u16_sparse(&[0, 7, 0]).unwrap();
//! let bytes = writer.into_inner();
//!
//! let mut reader = SketchReader::new(bytes.as_slice());
//! assert_eq!(reader.read_i64("value").unwrap(), -42);
//! assert_eq!(reader.read_u16_sparse().unwrap(), vec![0, 7, 0]);
//! assert_eq!(reader.processed(), bytes.len());
//! ```

pub(crate) mod assert;
mod sparse;

use std::io;
use std::io::Read;
use std::io::Write;

use crate::codec::assert::ensure_len;
use crate::error::Error;

// Upper bound on what is allocated ahead of data actually read.
const READ_CHUNK: usize = 64 * 1024;

/// A writer that tracks how many bytes have been written so far.
///
/// Every failed write reports the number of bytes processed before the failure in the
/// `processed` context entry of the returned [`Error`].
#[derive(Debug)]
pub struct SketchWriter<W> {
    inner: W,
    written: usize,
}

impl<W: Write> SketchWriter<W> {
    /// Wraps `inner`.
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    /// Returns the number of bytes written so far.
    pub fn processed(&self) -> usize {
        self.written
    }

    /// Consumes the writer and returns the underlying sink.
    pub fn into_inner(self) -> W {
        self.inner
    }

    fn put(&mut self, mut bytes: &[u8], tag: &'static str) -> Result<(), Error> {
        while !bytes.is_empty() {
            match self.inner.write(bytes) {
                Ok(0) => {
                    let err = io::Error::from(io::ErrorKind::WriteZero);
                    return Err(Error::io(tag, err).with_context("processed", self.written));
                }
                Ok(n) => {
                    self.written += n;
                    bytes = &bytes[n..];
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    return Err(Error::io(tag, err).with_context("processed", self.written));
                }
            }
        }
        Ok(())
    }

    /// Writes a single byte.
    pub fn write_u8(&mut self, value: u8) -> Result<(), Error> {
        self.put(&[value], "u8")
    }

    /// Writes a big-endian `u16`.
    pub fn write_u16(&mut self, value: u16) -> Result<(), Error> {
        self.put(&value.to_be_bytes(), "u16")
    }

    /// Writes a big-endian `i16`.
    pub fn write_i16(&mut self, value: i16) -> Result<(), Error> {
        self.put(&value.to_be_bytes(), "i16")
    }

    /// Writes a big-endian `u32`.
    pub fn write_u32(&mut self, value: u32) -> Result<(), Error> {
        self.put(&value.to_be_bytes(), "u32")
    }

    /// Writes a big-endian `i32`.
    pub fn write_i32(&mut self, value: i32) -> Result<(), Error> {
        self.put(&value.to_be_bytes(), "i32")
    }

    /// Writes a big-endian `u64`.
    pub fn write_u64(&mut self, value: u64) -> Result<(), Error> {
        self.put(&value.to_be_bytes(), "u64")
    }

    /// Writes a big-endian `i64`.
    pub fn write_i64(&mut self, value: i64) -> Result<(), Error> {
        self.put(&value.to_be_bytes(), "i64")
    }

    /// Writes the IEEE-754 bit pattern of `value` as a big-endian `u64`.
    pub fn write_f64(&mut self, value: f64) -> Result<(), Error> {
        self.put(&value.to_bits().to_be_bytes(), "f64")
    }

    /// Writes a length-prefixed byte string.
    pub fn write_bytes(&mut self, value: &[u8]) -> Result<(), Error> {
        self.write_i64(value.len() as i64)?;
        self.put(value, "string payload")
    }

    /// Writes a length-prefixed UTF-8 string.
    pub fn write_str(&mut self, value: &str) -> Result<(), Error> {
        self.write_bytes(value.as_bytes())
    }

    /// Writes a length-prefixed dense array of `u16`.
    pub fn write_u16_array(&mut self, values: &[u16]) -> Result<(), Error> {
        self.write_i64(values.len() as i64)?;
        for &v in values {
            self.write_u16(v)?;
        }
        Ok(())
    }
}

/// A reader that tracks how many bytes have been consumed so far.
///
/// A field that ends early fails with [`ErrorKind::InsufficientData`]. The `try_*` variants
/// additionally accept a clean end of stream, i.e. no byte at all where the field would begin.
///
/// [`ErrorKind::InsufficientData`]: crate::error::ErrorKind::InsufficientData
#[derive(Debug)]
pub struct SketchReader<R> {
    inner: R,
    read: usize,
}

impl<R: Read> SketchReader<R> {
    /// Wraps `inner`.
    pub fn new(inner: R) -> Self {
        Self { inner, read: 0 }
    }

    /// Returns the number of bytes consumed so far.
    pub fn processed(&self) -> usize {
        self.read
    }

    /// Consumes the reader and returns the underlying source.
    pub fn into_inner(self) -> R {
        self.inner
    }

    // Reads until `buf` is full or the source is exhausted, returning the filled length.
    fn fill(&mut self, buf: &mut [u8], tag: &'static str) -> Result<usize, Error> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => {
                    filled += n;
                    self.read += n;
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    return Err(Error::io(tag, err).with_context("processed", self.read));
                }
            }
        }
        Ok(filled)
    }

    fn take<const N: usize>(&mut self, tag: &'static str) -> Result<[u8; N], Error> {
        self.try_take(tag)?.ok_or_else(|| {
            Error::insufficient_data(tag).with_context("processed", self.read)
        })
    }

    fn try_take<const N: usize>(&mut self, tag: &'static str) -> Result<Option<[u8; N]>, Error> {
        let mut buf = [0u8; N];
        match self.fill(&mut buf, tag)? {
            0 if N > 0 => Ok(None),
            n if n == N => Ok(Some(buf)),
            _ => Err(Error::insufficient_data(tag).with_context("processed", self.read)),
        }
    }

    /// Reads a single byte.
    pub fn read_u8(&mut self, tag: &'static str) -> Result<u8, Error> {
        self.take::<1>(tag).map(|b| b[0])
    }

    /// Reads a big-endian `u16`.
    pub fn read_u16(&mut self, tag: &'static str) -> Result<u16, Error> {
        self.take(tag).map(u16::from_be_bytes)
    }

    /// Reads a big-endian `u16`, or `None` on a clean end of stream.
    pub fn try_read_u16(&mut self, tag: &'static str) -> Result<Option<u16>, Error> {
        Ok(self.try_take(tag)?.map(u16::from_be_bytes))
    }

    /// Reads a big-endian `i16`.
    pub fn read_i16(&mut self, tag: &'static str) -> Result<i16, Error> {
        self.take(tag).map(i16::from_be_bytes)
    }

    /// Reads a big-endian `u32`.
    pub fn read_u32(&mut self, tag: &'static str) -> Result<u32, Error> {
        self.take(tag).map(u32::from_be_bytes)
    }

    /// Reads a big-endian `i32`.
    pub fn read_i32(&mut self, tag: &'static str) -> Result<i32, Error> {
        self.take(tag).map(i32::from_be_bytes)
    }

    /// Reads a big-endian `u64`.
    pub fn read_u64(&mut self, tag: &'static str) -> Result<u64, Error> {
        self.take(tag).map(u64::from_be_bytes)
    }

    /// Reads a big-endian `i64`.
    pub fn read_i64(&mut self, tag: &'static str) -> Result<i64, Error> {
        self.take(tag).map(i64::from_be_bytes)
    }

    /// Reads a big-endian `i64`, or `None` on a clean end of stream.
    pub fn try_read_i64(&mut self, tag: &'static str) -> Result<Option<i64>, Error> {
        Ok(self.try_take(tag)?.map(i64::from_be_bytes))
    }

    /// Reads an IEEE-754 `f64` from its big-endian bit pattern.
    pub fn read_f64(&mut self, tag: &'static str) -> Result<f64, Error> {
        self.take(tag).map(|b| f64::from_bits(u64::from_be_bytes(b)))
    }

    /// Reads a length-prefixed byte string.
    pub fn read_bytes(&mut self, tag: &'static str) -> Result<Vec<u8>, Error> {
        let len = self.read_i64(tag)?;
        let len = ensure_len(len, tag).map_err(|e| e.with_context("processed", self.read))?;
        // grow with the payload instead of trusting the prefix
        let mut buf = Vec::with_capacity(len.min(READ_CHUNK));
        while buf.len() < len {
            let filled = buf.len();
            buf.resize(len.min(filled + READ_CHUNK), 0);
            let want = buf.len() - filled;
            if self.fill(&mut buf[filled..], tag)? != want {
                return Err(Error::insufficient_data(tag).with_context("processed", self.read));
            }
        }
        Ok(buf)
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_string(&mut self, tag: &'static str) -> Result<String, Error> {
        let bytes = self.read_bytes(tag)?;
        String::from_utf8(bytes).map_err(|err| {
            Error::deserial(format!("invalid UTF-8 in {tag}"))
                .with_context("processed", self.read)
                .set_source(err)
        })
    }

    /// Reads a length-prefixed dense array of `u16`.
    pub fn read_u16_array(&mut self, tag: &'static str) -> Result<Vec<u16>, Error> {
        let len = self.read_i64(tag)?;
        let len = ensure_len(len, tag).map_err(|e| e.with_context("processed", self.read))?;
        let mut values = Vec::with_capacity(len.min(READ_CHUNK));
        for _ in 0..len {
            values.push(self.read_u16(tag)?);
        }
        Ok(values)
    }
}
