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

use googletest::assert_that;
use googletest::prelude::contains_substring;
use varopt::error::ErrorKind;
use varopt::sampling::serialization::*;
use varopt::sampling::I64Serde;
use varopt::sampling::StringSerde;
use varopt::sampling::VarOptItemsSketch;

fn unweighted_longs_sketch(k: u32, n: i64) -> VarOptItemsSketch<i64> {
    let mut sketch = VarOptItemsSketch::with_seed(k, 0xace).unwrap();
    for i in 0..n {
        sketch.update(i, 1.0).unwrap();
    }
    sketch
}

/// A sketch with both an H region and an R region: k unit items followed by
/// two heavy ones.
fn full_longs_sketch(k: u32) -> VarOptItemsSketch<i64> {
    let mut sketch = unweighted_longs_sketch(k, i64::from(k));
    sketch.update(100, 100.0).unwrap();
    sketch.update(101, 101.0).unwrap();
    sketch
}

fn assert_equal_sketches<T: PartialEq + Clone + std::fmt::Debug>(
    s1: &VarOptItemsSketch<T>,
    s2: &VarOptItemsSketch<T>,
) {
    assert_eq!(s1.k(), s2.k(), "sketches have different values of k");
    assert_eq!(
        s1.num_samples(),
        s2.num_samples(),
        "sketches have different sample counts"
    );
    match (s1.samples(), s2.samples()) {
        (None, None) => {}
        (Some(r1), Some(r2)) => {
            assert_eq!(r1.items(), r2.items(), "sampled items differ");
            assert_eq!(r1.weights(), r2.weights(), "sampled weights differ");
        }
        _ => panic!("one sketch is empty and the other is not"),
    }
}

#[test]
fn test_empty_sketch_round_trip() {
    let sketch = VarOptItemsSketch::<String>::new(5).unwrap();
    let bytes = sketch.serialize_with(&StringSerde);

    assert_eq!(bytes.len(), PREAMBLE_BYTES_EMPTY);
    assert_eq!(bytes[PREAMBLE_LONGS_BYTE], PREAMBLE_LONGS_EMPTY);
    assert_eq!(bytes[FLAGS_BYTE] & EMPTY_FLAG_MASK, EMPTY_FLAG_MASK);

    let rebuilt = VarOptItemsSketch::<String>::deserialize_with(&bytes, &StringSerde).unwrap();
    assert!(rebuilt.is_empty());
    assert_eq!(rebuilt.k(), 5);
    assert_eq!(rebuilt.num_samples(), 0);
    assert!(rebuilt.samples().is_none());
}

#[test]
fn test_underfull_sketch_serialization() {
    let sketch = unweighted_longs_sketch(2048, 10);
    assert_eq!(sketch.num_samples(), 10);

    let bytes = sketch.serialize_with(&I64Serde);
    assert_eq!(bytes[PREAMBLE_LONGS_BYTE], PREAMBLE_LONGS_WARMUP);

    let rebuilt = VarOptItemsSketch::deserialize_with(&bytes, &I64Serde).unwrap();
    assert_equal_sketches(&rebuilt, &sketch);

    // the image pins down the at-rest state, so a rebuilt sketch re-serializes
    // to the identical bytes
    assert_eq!(rebuilt.serialize_with(&I64Serde), bytes);
}

#[test]
fn test_full_sketch_serialization() {
    let sketch = full_longs_sketch(32);
    assert_eq!(sketch.num_samples(), 32);

    // the heavy items are in heap order at the front
    let samples = sketch.samples().unwrap();
    assert_eq!(samples.weights()[0], 100.0);
    assert_eq!(samples.weights()[1], 101.0);

    let bytes = sketch.serialize_with(&I64Serde);
    assert_eq!(bytes[PREAMBLE_LONGS_BYTE], PREAMBLE_LONGS_FULL);

    let rebuilt = VarOptItemsSketch::deserialize_with(&bytes, &I64Serde).unwrap();
    assert_equal_sketches(&rebuilt, &sketch);
    assert_eq!(rebuilt.serialize_with(&I64Serde), bytes);
}

#[test]
fn test_string_items_round_trip() {
    let mut sketch = VarOptItemsSketch::with_seed(4, 77).unwrap();
    for (i, name) in ["alpha", "beta", "gamma", "delta", "epsilon", "zeta"]
        .iter()
        .enumerate()
    {
        sketch.update(name.to_string(), (i + 1) as f64).unwrap();
    }

    let bytes = sketch.serialize_with(&StringSerde);
    let rebuilt = VarOptItemsSketch::<String>::deserialize_with(&bytes, &StringSerde).unwrap();
    assert_equal_sketches(&rebuilt, &sketch);
    assert_eq!(rebuilt.serialize_with(&StringSerde), bytes);
}

#[test]
fn test_bad_ser_ver() {
    let mut bytes = full_longs_sketch(16).serialize_with(&I64Serde);
    bytes[SER_VER_BYTE] = 0;

    let err = VarOptItemsSketch::<i64>::deserialize_with(&bytes, &I64Serde).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedVersion);
}

#[test]
fn test_bad_family() {
    let mut bytes = full_longs_sketch(16).serialize_with(&I64Serde);
    bytes[FAMILY_BYTE] = 0;

    let err = VarOptItemsSketch::<i64>::deserialize_with(&bytes, &I64Serde).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Corruption);
    assert_that!(err.message(), contains_substring("family"));
}

#[test]
fn test_bad_preamble_longs() {
    let bytes = full_longs_sketch(16).serialize_with(&I64Serde);

    for bad in [0u8, 4, 0x3f] {
        let mut corrupt = bytes.clone();
        corrupt[PREAMBLE_LONGS_BYTE] = bad;
        let err = VarOptItemsSketch::<i64>::deserialize_with(&corrupt, &I64Serde).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corruption);
    }
}

#[test]
fn test_bad_resize_factor() {
    let mut bytes = full_longs_sketch(16).serialize_with(&I64Serde);
    bytes[RESIZE_FACTOR_BYTE] = 7;

    let err = VarOptItemsSketch::<i64>::deserialize_with(&bytes, &I64Serde).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Corruption);
}

#[test]
fn test_full_preamble_with_empty_r_region() {
    let mut bytes = full_longs_sketch(16).serialize_with(&I64Serde);
    for b in &mut bytes[R_COUNT_INT..R_COUNT_INT + 4] {
        *b = 0;
    }

    let err = VarOptItemsSketch::<i64>::deserialize_with(&bytes, &I64Serde).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Corruption);
    assert_that!(err.message(), contains_substring("no items in R region"));
}

#[test]
fn test_region_counts_must_partition_k() {
    let mut bytes = full_longs_sketch(16).serialize_with(&I64Serde);
    let h_count = u32::from_le_bytes(bytes[H_COUNT_INT..H_COUNT_INT + 4].try_into().unwrap());
    bytes[H_COUNT_INT..H_COUNT_INT + 4].copy_from_slice(&(h_count + 1).to_le_bytes());

    let err = VarOptItemsSketch::<i64>::deserialize_with(&bytes, &I64Serde).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Corruption);
}

#[test]
fn test_stray_empty_flag() {
    let mut bytes = full_longs_sketch(16).serialize_with(&I64Serde);
    bytes[FLAGS_BYTE] |= EMPTY_FLAG_MASK;

    let err = VarOptItemsSketch::<i64>::deserialize_with(&bytes, &I64Serde).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Corruption);
}

#[test]
fn test_k_below_minimum() {
    let mut bytes = VarOptItemsSketch::<i64>::new(5)
        .unwrap()
        .serialize_with(&I64Serde);
    bytes[RESERVOIR_K_INT..RESERVOIR_K_INT + 4].copy_from_slice(&1u32.to_le_bytes());

    let err = VarOptItemsSketch::<i64>::deserialize_with(&bytes, &I64Serde).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Corruption);
}

#[test]
fn test_negative_stored_weight() {
    let mut bytes = full_longs_sketch(16).serialize_with(&I64Serde);
    // flip the sign bit of the first H region weight
    bytes[PREAMBLE_BYTES_FULL + 7] |= 0x80;

    let err = VarOptItemsSketch::<i64>::deserialize_with(&bytes, &I64Serde).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Corruption);
}

#[test]
fn test_truncated_image() {
    let bytes = full_longs_sketch(16).serialize_with(&I64Serde);

    for len in [0, 1, 4, 7, 8, 12, PREAMBLE_BYTES_WARMUP, PREAMBLE_BYTES_FULL, bytes.len() - 1] {
        let err = VarOptItemsSketch::<i64>::deserialize_with(&bytes[..len], &I64Serde).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corruption, "length {len}");
    }
}
