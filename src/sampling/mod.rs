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

//! Weighted sampling sketches for data streams.
//!
//! This module implements the VarOpt (variance-optimal) sampling sketch of
//! Cohen, Duffield, Lund, and Thorup. It maintains at most `k` items from a
//! stream of `(item, weight)` pairs, with adjusted weights chosen so that the
//! sample is an unbiased weighted sample of everything seen so far: the
//! expected total of the reported weights equals the total input weight, and
//! subset-sum estimates built from the sample have variance-optimal error.
//!
//! # Usage
//!
//! ```rust
//! # use varopt::sampling::VarOptItemsSketch;
//! let mut sketch = VarOptItemsSketch::new(32).unwrap();
//! for i in 0..1000i64 {
//!     sketch.update(i, 1.0 + (i % 10) as f64).unwrap();
//! }
//! let samples = sketch.samples().unwrap();
//! assert_eq!(samples.len(), 32);
//! ```
//!
//! # Serialization
//!
//! ```rust
//! # use varopt::sampling::{I64Serde, VarOptItemsSketch};
//! let mut sketch = VarOptItemsSketch::new(32).unwrap();
//! sketch.update(42i64, 2.5).unwrap();
//!
//! let bytes = sketch.serialize_with(&I64Serde);
//! let decoded = VarOptItemsSketch::<i64>::deserialize_with(&bytes, &I64Serde).unwrap();
//! assert_eq!(decoded.num_samples(), 1);
//! ```

mod serde;
pub mod serialization;
mod sketch;
mod util;

#[cfg(feature = "case-profiling")]
pub use self::sketch::DeleteCaseCounts;
pub use self::serde::I64Serde;
pub use self::serde::ItemsSerde;
pub use self::serde::StringSerde;
pub use self::sketch::VarOptItemsSketch;
pub use self::sketch::VarOptSamples;
pub use self::util::ResizeFactor;
