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

//! Shared random utilities for sketches.

use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// Random number source for sketches.
pub trait RandomSource {
    /// Returns the next random 64-bit value.
    fn next_u64(&mut self) -> u64;

    /// Returns a uniform value in `[0, 1)`.
    fn next_f64(&mut self) -> f64 {
        // 53 high bits give the full f64 mantissa
        (self.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Returns a uniform value in `(0, 1]`.
    ///
    /// Zero is excluded so that strict-inequality comparisons against a scaled
    /// draw stay unambiguous.
    fn next_f64_exclude_zero(&mut self) -> f64 {
        1.0 - self.next_f64()
    }

    /// Returns a uniform index in `[0, bound)`.
    ///
    /// # Panics
    ///
    /// Panics if `bound` is zero.
    fn next_index(&mut self, bound: usize) -> usize {
        assert!(bound > 0, "bound must be positive");
        // widening multiply avoids the modulo bias of `next_u64() % bound`
        (((self.next_u64() as u128) * (bound as u128)) >> 64) as usize
    }

    /// Returns a standard normal deviate via the Box-Muller transform.
    fn next_gaussian(&mut self) -> f64 {
        let u1 = self.next_f64_exclude_zero();
        let u2 = self.next_f64();
        (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
    }
}

/// Xorshift-based random generator for sketch operations.
#[derive(Debug, Clone, Copy)]
pub struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    /// Creates a new generator using the provided seed.
    pub fn seeded(seed: u64) -> Self {
        let state = if seed == 0 { 0x9e3779b97f4a7c15 } else { seed };
        Self { state }
    }
}

impl Default for XorShift64 {
    fn default() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let mut seed = nanos as u64 ^ (std::process::id() as u64);
        if seed == 0 {
            seed = 0x9e3779b97f4a7c15;
        }
        Self::seeded(seed)
    }
}

impl RandomSource for XorShift64 {
    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_is_deterministic() {
        let mut a = XorShift64::seeded(42);
        let mut b = XorShift64::seeded(42);
        for _ in 0..100 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn test_next_f64_exclude_zero_range() {
        let mut rng = XorShift64::seeded(7);
        for _ in 0..10_000 {
            let v = rng.next_f64_exclude_zero();
            assert!(v > 0.0 && v <= 1.0, "draw out of (0, 1]: {v}");
        }
    }

    #[test]
    fn test_next_index_bounds() {
        let mut rng = XorShift64::seeded(11);
        for bound in [1usize, 2, 3, 17, 1024] {
            for _ in 0..1_000 {
                assert!(rng.next_index(bound) < bound);
            }
        }
    }
}
