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

//! Binary serialization format constants for VarOpt sketches.
//!
//! The preamble-longs byte doubles as a mode tag: 1 means empty, 2 means the
//! sketch is still in warmup (no R region), 3 means the R region is present.
//! Modes 2 and 3 are followed by the explicit weights of the H region and then
//! the serde-encoded items, H region in heap slot order before the R region in
//! slot order. The M region is always empty between updates and is never
//! serialized.

/// Current serialization version.
pub const SER_VER: u8 = 1;

/// Preamble mode for an empty sketch.
pub const PREAMBLE_LONGS_EMPTY: u8 = 1;
/// Preamble mode for a sketch still in warmup (H region only).
pub const PREAMBLE_LONGS_WARMUP: u8 = 2;
/// Preamble mode for a sketch with an R region.
pub const PREAMBLE_LONGS_FULL: u8 = 3;

/// Flag bit: sketch is empty.
pub const EMPTY_FLAG_MASK: u8 = 1;

/// Byte offset of the preamble-longs mode tag.
pub const PREAMBLE_LONGS_BYTE: usize = 0;
/// Byte offset of the resize factor (stored as log base 2).
pub const RESIZE_FACTOR_BYTE: usize = 1;
/// Byte offset of the serialization version.
pub const SER_VER_BYTE: usize = 2;
/// Byte offset of the family ID.
pub const FAMILY_BYTE: usize = 3;
/// Byte offset of the flags byte.
pub const FLAGS_BYTE: usize = 4;
/// Byte offset of `k`, the maximum sample size.
pub const RESERVOIR_K_INT: usize = 8;
/// Byte offset of the H region item count (modes 2 and 3).
pub const H_COUNT_INT: usize = 12;
/// Byte offset of the R region item count (modes 2 and 3).
pub const R_COUNT_INT: usize = 16;
/// Byte offset of the total R region weight (mode 3 only).
pub const TOTAL_WT_R_DOUBLE: usize = 24;

/// Preamble size in bytes for an empty sketch.
pub const PREAMBLE_BYTES_EMPTY: usize = 16;
/// Preamble size in bytes for a warmup sketch.
pub const PREAMBLE_BYTES_WARMUP: usize = 24;
/// Preamble size in bytes for a sketch with an R region.
pub const PREAMBLE_BYTES_FULL: usize = 32;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preamble_field_offsets_are_disjoint() {
        assert!(PREAMBLE_LONGS_BYTE < RESIZE_FACTOR_BYTE);
        assert!(RESIZE_FACTOR_BYTE < SER_VER_BYTE);
        assert!(SER_VER_BYTE < FAMILY_BYTE);
        assert!(FAMILY_BYTE < FLAGS_BYTE);
        assert_eq!(RESERVOIR_K_INT, 8);
        assert_eq!(H_COUNT_INT, RESERVOIR_K_INT + 4);
        assert_eq!(R_COUNT_INT, H_COUNT_INT + 4);
        assert_eq!(TOTAL_WT_R_DOUBLE, PREAMBLE_BYTES_WARMUP);
        assert_eq!(PREAMBLE_BYTES_FULL, TOTAL_WT_R_DOUBLE + 8);
    }
}
