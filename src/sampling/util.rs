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

//! Allocation sizing for sampling buffers that grow toward a fixed capacity.

use crate::error::Error;

/// Growth multiple applied when a sampling buffer is reallocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResizeFactor {
    /// No geometric growth; the buffer starts at its final size.
    X1,
    /// Double on each growth step.
    X2,
    /// Quadruple on each growth step.
    X4,
    /// Grow by 8x on each growth step.
    #[default]
    X8,
}

impl ResizeFactor {
    /// The growth multiple.
    pub fn value(self) -> usize {
        1 << self.lg()
    }

    /// Log base 2 of the growth multiple.
    pub fn lg(self) -> u8 {
        match self {
            ResizeFactor::X1 => 0,
            ResizeFactor::X2 => 1,
            ResizeFactor::X4 => 2,
            ResizeFactor::X8 => 3,
        }
    }

    /// Reconstructs a factor from its serialized log base 2.
    pub fn from_lg(lg: u8) -> Result<Self, Error> {
        match lg {
            0 => Ok(ResizeFactor::X1),
            1 => Ok(ResizeFactor::X2),
            2 => Ok(ResizeFactor::X4),
            3 => Ok(ResizeFactor::X8),
            _ => Err(Error::corruption("resize factor out of range").with_context("lg", lg)),
        }
    }
}

/// Exact log base 2 of a power of two.
pub(crate) fn to_lg(n: usize) -> u8 {
    debug_assert!(n.is_power_of_two());
    n.trailing_zeros() as u8
}

/// Starting allocation exponent for a buffer that will grow by `2^lg_rf`
/// steps toward `2^lg_target`, never starting below `2^lg_min`.
///
/// The result is congruent to `lg_target` modulo `lg_rf`, so repeated growth
/// lands exactly on the target.
pub(crate) fn starting_sub_multiple(lg_target: u8, lg_rf: u8, lg_min: u8) -> u8 {
    if lg_target <= lg_min {
        lg_min
    } else if lg_rf == 0 {
        lg_target
    } else {
        (lg_target - lg_min) % lg_rf + lg_min
    }
}

/// Clamps a proposed allocation to `max_size` once doubling it again would
/// overshoot, skipping a final fractional growth step.
pub(crate) fn get_adjusted_size(max_size: usize, resize_target: usize) -> usize {
    if resize_target * 2 > max_size {
        max_size
    } else {
        resize_target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resize_factor_lg_round_trip() {
        for rf in [
            ResizeFactor::X1,
            ResizeFactor::X2,
            ResizeFactor::X4,
            ResizeFactor::X8,
        ] {
            assert_eq!(ResizeFactor::from_lg(rf.lg()).unwrap(), rf);
        }
        assert!(ResizeFactor::from_lg(4).is_err());
    }

    #[test]
    fn test_starting_sub_multiple() {
        // below the floor
        assert_eq!(starting_sub_multiple(3, 3, 4), 4);
        // no growth factor means start at the target
        assert_eq!(starting_sub_multiple(11, 0, 4), 11);
        // congruent to the target mod lg_rf
        assert_eq!(starting_sub_multiple(11, 3, 4), 5);
        assert_eq!(starting_sub_multiple(10, 3, 4), 4);
        assert_eq!(starting_sub_multiple(13, 3, 4), 4);
    }

    #[test]
    fn test_get_adjusted_size() {
        assert_eq!(get_adjusted_size(2048, 32), 32);
        assert_eq!(get_adjusted_size(5, 16), 5);
        assert_eq!(get_adjusted_size(32, 32), 32);
        assert_eq!(get_adjusted_size(100, 64), 100);
    }
}
