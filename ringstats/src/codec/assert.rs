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

use crate::error::Error;

// Upper bound for any decoded length prefix, in elements.
const MAX_DECODED_LEN: i64 = u32::MAX as i64;

pub(crate) fn ensure_len(len: i64, tag: &'static str) -> Result<usize, Error> {
    if (0..=MAX_DECODED_LEN).contains(&len) {
        Ok(len as usize)
    } else {
        Err(Error::deserial(format!(
            "invalid length for {tag}: expected [0, {MAX_DECODED_LEN}], got {len}"
        )))
    }
}

pub(crate) fn ensure_index_in(index: usize, len: usize) -> Result<(), Error> {
    if index < len {
        Ok(())
    } else {
        Err(Error::out_of_range(index, len))
    }
}

pub(crate) fn ensure_positive(value: i64, tag: &'static str) -> Result<usize, Error> {
    if value > 0 && value <= MAX_DECODED_LEN {
        Ok(value as usize)
    } else {
        Err(Error::deserial(format!(
            "invalid {tag}: expected a positive value, got {value}"
        )))
    }
}
