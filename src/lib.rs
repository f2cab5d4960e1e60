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

//! Variance-optimal weighted reservoir sampling.
//!
//! The [`sampling`] module provides the VarOpt items sketch: a bounded-size,
//! statistically unbiased weighted sample over an unbounded stream of
//! `(item, weight)` pairs. Item encoding for serialization is pluggable
//! through [`sampling::ItemsSerde`].
//!
//! ```rust
//! use varopt::sampling::VarOptItemsSketch;
//!
//! let mut sketch = VarOptItemsSketch::new(16).unwrap();
//! sketch.update("page-a", 12.0).unwrap();
//! sketch.update("page-b", 3.5).unwrap();
//! assert_eq!(sketch.num_samples(), 2);
//! ```

pub(crate) mod codec;
pub mod common;
pub mod error;
pub mod sampling;
