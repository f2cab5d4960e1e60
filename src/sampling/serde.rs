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

//! Serialization capability for items stored in a sampling sketch.

use crate::codec::SketchBytes;
use crate::codec::SketchSlice;
use crate::error::Error;

/// Serializer/deserializer for items stored in a sampling sketch.
///
/// The sketch core treats items as opaque; implementations of this trait
/// define the wire encoding of the item payload that follows the preamble.
pub trait ItemsSerde<T> {
    /// Serializes a slice of items to a byte buffer.
    fn serialize_items(&self, items: &[T]) -> Vec<u8>;

    /// Deserializes `num_items` from bytes, returning items and bytes consumed.
    fn deserialize_items(&self, bytes: &[u8], num_items: usize) -> Result<(Vec<T>, usize), Error>;
}

/// Serializer for i64 items compatible with ArrayOfLongsSerDe in Java.
#[derive(Debug, Default, Clone, Copy)]
pub struct I64Serde;

impl ItemsSerde<i64> for I64Serde {
    fn serialize_items(&self, items: &[i64]) -> Vec<u8> {
        let mut out = SketchBytes::with_capacity(items.len() * 8);
        for item in items {
            out.write_i64_le(*item);
        }
        out.into_bytes()
    }

    fn deserialize_items(&self, bytes: &[u8], num_items: usize) -> Result<(Vec<i64>, usize), Error> {
        let mut input = SketchSlice::new(bytes);
        let mut items = Vec::with_capacity(num_items);
        for _ in 0..num_items {
            let value = input
                .read_i64_le()
                .map_err(|e| Error::corruption("not enough bytes for i64 items").set_source(e))?;
            items.push(value);
        }
        Ok((items, num_items * 8))
    }
}

/// Serializer for UTF-8 strings compatible with ArrayOfStringsSerDe in Java.
///
/// Each item is a little-endian u32 byte length followed by the UTF-8 payload.
#[derive(Debug, Default, Clone, Copy)]
pub struct StringSerde;

impl ItemsSerde<String> for StringSerde {
    fn serialize_items(&self, items: &[String]) -> Vec<u8> {
        let mut out = SketchBytes::with_capacity(items.iter().map(|s| 4 + s.len()).sum());
        for item in items {
            out.write_u32_le(item.len() as u32);
            out.write(item.as_bytes());
        }
        out.into_bytes()
    }

    fn deserialize_items(
        &self,
        bytes: &[u8],
        num_items: usize,
    ) -> Result<(Vec<String>, usize), Error> {
        let mut input = SketchSlice::new(bytes);
        let mut items = Vec::with_capacity(num_items);
        let mut consumed = 0usize;
        for _ in 0..num_items {
            let len = input
                .read_u32_le()
                .map_err(|e| Error::corruption("not enough bytes for string length").set_source(e))?
                as usize;
            let mut buf = vec![0u8; len];
            input
                .read_exact(&mut buf)
                .map_err(|e| Error::corruption("not enough bytes for string payload").set_source(e))?;
            let value = String::from_utf8(buf)
                .map_err(|e| Error::corruption("invalid UTF-8 string payload").set_source(e))?;
            items.push(value);
            consumed += 4 + len;
        }
        Ok((items, consumed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_i64_round_trip() {
        let serde = I64Serde;
        let items = vec![0i64, -1, i64::MAX, i64::MIN, 42];
        let bytes = serde.serialize_items(&items);
        assert_eq!(bytes.len(), items.len() * 8);
        let (decoded, consumed) = serde.deserialize_items(&bytes, items.len()).unwrap();
        assert_eq!(decoded, items);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn test_i64_truncated_input() {
        let serde = I64Serde;
        let bytes = serde.serialize_items(&[1i64, 2, 3]);
        assert!(serde.deserialize_items(&bytes[..20], 3).is_err());
    }

    #[test]
    fn test_string_round_trip() {
        let serde = StringSerde;
        let items = vec!["".to_string(), "alpha".to_string(), "абвгд".to_string()];
        let bytes = serde.serialize_items(&items);
        let (decoded, consumed) = serde.deserialize_items(&bytes, items.len()).unwrap();
        assert_eq!(decoded, items);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn test_string_invalid_utf8() {
        let serde = StringSerde;
        let mut bytes = serde.serialize_items(&["ab".to_string()]);
        bytes[4] = 0xff;
        bytes[5] = 0xfe;
        assert!(serde.deserialize_items(&bytes, 1).is_err());
    }
}
