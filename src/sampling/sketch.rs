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

//! Variance-optimal (VarOpt) weighted sampling sketch.

use std::fmt;

use super::serde::ItemsSerde;
use super::serialization::*;
use super::util::get_adjusted_size;
use super::util::starting_sub_multiple;
use super::util::to_lg;
use super::util::ResizeFactor;
use crate::codec::family::Family;
use crate::codec::SketchBytes;
use crate::codec::SketchSlice;
use crate::common::random::RandomSource;
use crate::common::random::XorShift64;
use crate::error::Error;

/// The smallest sampling array allocated: 16 slots.
const MIN_LG_ARR_ITEMS: u8 = 4;

/// Per-instance tallies of which branch the delete-slot choice resolved to.
///
/// Profiling aid only; compiled under the `case-profiling` feature and not
/// part of the sketch contract.
#[cfg(feature = "case-profiling")]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteCaseCounts {
    /// A heavy item landed and nothing was pulled from the heap.
    pub heavy_no_middle: u64,
    /// A lone M item survived the keep test; an R item was deleted.
    pub keep_middle: u64,
    /// A lone M item lost the keep test and was deleted.
    pub delete_middle: u64,
    /// The weighted scan ran off the M region into R.
    pub scan_hit_reservoir: u64,
    /// The weighted scan chose an M slot.
    pub scan_hit_middle: u64,
}

/// A read-only snapshot of the sample set.
///
/// Weights for H region items are the original per-item weights; every R
/// region item reports the shared adjusted weight.
#[derive(Debug, Clone, PartialEq)]
pub struct VarOptSamples<T> {
    items: Vec<T>,
    weights: Vec<f64>,
}

impl<T> VarOptSamples<T> {
    /// The sampled items.
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Adjusted weights, parallel to [`items`](Self::items).
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Number of samples in the snapshot.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the snapshot holds no samples.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// VarOpt sampling sketch: a fixed-budget, statistically unbiased weighted
/// sample of a stream of `(item, weight)` pairs.
///
/// The sketch keeps at most `k` items. Items heavy relative to the current
/// threshold keep their exact weights and live in a min-heap occupying the
/// low slots of the buffer ("H region"); the remaining items share a single
/// adjusted weight ("R region"). One extra slot holds the item in flight
/// during an update. The expected total of the reported weights equals the
/// total of all input weights, which is what makes subset-sum estimates from
/// the sample unbiased.
///
/// See the [module level documentation](crate::sampling) for usage.
#[derive(Debug, Clone)]
pub struct VarOptItemsSketch<T> {
    k: usize,
    curr_items_alloc: usize,
    rf: ResizeFactor,
    data: Vec<Option<T>>,
    weights: Vec<f64>,
    /// Number of items in the heap (H region), slots `[0, h)`.
    h: usize,
    /// Number of items in the middle region, slots `[h, h + m)`.
    m: usize,
    /// Number of items in the reservoir-like area.
    r: usize,
    /// Total weight of items in the reservoir-like area.
    total_wt_r: f64,
    rng: XorShift64,
    #[cfg(feature = "case-profiling")]
    case_counts: DeleteCaseCounts,
}

impl<T> VarOptItemsSketch<T> {
    /// Creates a sketch holding at most `k` samples, with the default resize
    /// factor.
    ///
    /// Fails with [`ErrorKind::InvalidArgument`](crate::error::ErrorKind) if
    /// `k < 2`.
    pub fn new(k: u32) -> Result<Self, Error> {
        Self::with_resize_factor(k, ResizeFactor::default())
    }

    /// Creates a sketch with an explicit buffer growth factor.
    pub fn with_resize_factor(k: u32, rf: ResizeFactor) -> Result<Self, Error> {
        Self::build(k, rf, XorShift64::default())
    }

    /// Creates a sketch whose random draws are reproducible from `seed`.
    pub fn with_seed(k: u32, seed: u64) -> Result<Self, Error> {
        Self::build(k, ResizeFactor::default(), XorShift64::seeded(seed))
    }

    fn build(k: u32, rf: ResizeFactor, rng: XorShift64) -> Result<Self, Error> {
        // k = 1 breaks a lightness theorem the downsampling step relies on
        if k < 2 {
            return Err(Error::invalid_argument("k must be at least 2").with_context("k", k));
        }
        let k = k as usize;

        let ceiling_lg_k = to_lg(k.next_power_of_two());
        let initial_lg = starting_sub_multiple(ceiling_lg_k, rf.lg(), MIN_LG_ARR_ITEMS);
        let mut curr_items_alloc = get_adjusted_size(k, 1 << initial_lg);
        if curr_items_alloc == k {
            curr_items_alloc += 1;
        }

        Ok(Self {
            k,
            curr_items_alloc,
            rf,
            data: (0..curr_items_alloc).map(|_| None).collect(),
            weights: vec![-1.0; curr_items_alloc],
            h: 0,
            m: 0,
            r: 0,
            total_wt_r: 0.0,
            rng,
            #[cfg(feature = "case-profiling")]
            case_counts: DeleteCaseCounts::default(),
        })
    }

    /// The maximum number of samples this sketch stores. The current number
    /// of samples may be lower.
    pub fn k(&self) -> u32 {
        self.k as u32
    }

    /// The current number of samples, which may be smaller than `k`.
    pub fn num_samples(&self) -> usize {
        self.k.min(self.h + self.r)
    }

    /// Returns true if the sketch has seen no items.
    pub fn is_empty(&self) -> bool {
        self.h == 0 && self.r == 0
    }

    /// Delete-slot branch tallies accumulated so far.
    #[cfg(feature = "case-profiling")]
    pub fn delete_case_counts(&self) -> DeleteCaseCounts {
        self.case_counts
    }

    /// Randomly decides whether to include an item in the sample set.
    ///
    /// Fails with [`ErrorKind::InvalidWeight`](crate::error::ErrorKind) if
    /// `weight` is not strictly positive and finite; the sketch is unchanged
    /// on failure.
    ///
    /// The word "pseudo" in the internal path names refers to comparisons
    /// made against the old threshold tau, whereas true lightness or
    /// heaviness during a sampling event depends on the new tau, which has
    /// yet to be determined.
    pub fn update(&mut self, item: T, weight: f64) -> Result<(), Error> {
        if !weight.is_finite() || weight <= 0.0 {
            return Err(Error::invalid_weight("item weights must be strictly positive")
                .with_context("weight", weight));
        }

        if self.r == 0 {
            self.update_warmup_phase(item, weight);
        } else {
            let avg_wt_r = self.total_wt_r / self.r as f64;

            if weight <= avg_wt_r {
                self.update_pseudo_light(item, weight);
            } else if self.r == 1 {
                self.update_pseudo_heavy_r_eq_1(item, weight);
            } else {
                self.update_pseudo_heavy_general(item, weight);
            }
        }
        Ok(())
    }

    fn update_warmup_phase(&mut self, item: T, weight: f64) {
        debug_assert!(self.r == 0 && self.m == 0 && self.h <= self.k);

        if self.h == self.curr_items_alloc {
            self.grow_data_arrays();
        }

        // store items as they come in, until full
        self.data[self.h] = Some(item);
        self.weights[self.h] = weight;
        self.h += 1;

        // lazy heapification
        if self.h > self.k {
            self.convert_to_heap();
            self.transition_from_warmup();
        }
    }

    fn grow_data_arrays(&mut self) {
        debug_assert!(self.curr_items_alloc <= self.k);
        self.curr_items_alloc = get_adjusted_size(self.k, self.curr_items_alloc * self.rf.value());
        if self.curr_items_alloc == self.k {
            self.curr_items_alloc += 1;
        }
        self.data.resize_with(self.curr_items_alloc, || None);
        self.weights.resize(self.curr_items_alloc, -1.0);
    }

    fn transition_from_warmup(&mut self) {
        // Move the 2 lightest items from H to M, then reinterpret the lighter
        // of them as the R-region singleton
        self.pop_min_to_m_region();
        self.pop_min_to_m_region();
        self.m -= 1;
        self.r += 1;

        debug_assert_eq!(self.h, self.k - 1);
        debug_assert_eq!(self.m, 1);
        debug_assert_eq!(self.r, 1);

        // Grab the R weight, then overwrite the slot so stale reads are obvious
        self.total_wt_r = self.weights[self.k];
        self.weights[self.k] = -1.0;

        // Any two items can be downsampled to one, so the two lightest items
        // are a valid starting candidate set
        self.grow_candidate_set(self.weights[self.k - 1] + self.total_wt_r, 2);
    }

    /* In the "pseudo-light" case the new item has weight <= old tau, so it is
    provably light enough to be part of this round's downsampling. */
    fn update_pseudo_light(&mut self, item: T, weight: f64) {
        debug_assert!(self.r >= 1);
        debug_assert_eq!(self.r + self.h, self.k);

        // the slot vacated by the last downsample becomes the M region
        let m_slot = self.h;
        self.data[m_slot] = Some(item);
        self.weights[m_slot] = weight;
        self.m += 1;

        self.grow_candidate_set(self.total_wt_r + weight, self.r + 1);
    }

    /* In the "pseudo-heavy" case the new item has weight > old tau and might
    or might not be light under the new tau. The item goes into H whether it
    needs to be there or not; it may come right back out during candidate
    growth. Pseudo-heavy items cannot predominate in long streams unless
    (max wt) / (min wt) grows exponentially with the stream. */
    fn update_pseudo_heavy_general(&mut self, item: T, weight: f64) {
        debug_assert_eq!(self.m, 0);
        debug_assert!(self.r >= 2);
        debug_assert_eq!(self.r + self.h, self.k);

        self.push(item, weight);
        self.grow_candidate_set(self.total_wt_r, self.r);
    }

    /* Same analysis as the general pseudo-heavy case, but with R = 1 the
    candidate set needs an M item to reach the minimum size of two. */
    fn update_pseudo_heavy_r_eq_1(&mut self, item: T, weight: f64) {
        debug_assert_eq!(self.m, 0);
        debug_assert_eq!(self.r, 1);
        debug_assert_eq!(self.r + self.h, self.k);

        self.push(item, weight); // new item into H
        self.pop_min_to_m_region(); // lightest heap item back out into M

        // the buffer is k+1 slots with 1 in R, so the M item sits at k-1
        let m_slot = self.k - 1;
        self.grow_candidate_set(self.weights[m_slot] + self.total_wt_r, 2);
    }

    /* Converts the data and weight arrays into a min-heap over the first h
    weights. Nothing to do with on- or off-heap storage. */
    fn convert_to_heap(&mut self) {
        if self.h < 2 {
            return;
        }

        let last_slot = self.h - 1;
        let last_non_leaf = ((last_slot + 1) / 2) - 1;
        for j in (0..=last_non_leaf).rev() {
            self.sift_down(j);
        }
    }

    fn sift_down(&mut self, slot_in: usize) {
        debug_assert!(self.h > 0);
        let last_slot = self.h - 1;
        debug_assert!(slot_in <= last_slot);

        let mut slot = slot_in;
        let mut child = 2 * slot + 1; // might be invalid, need to check

        while child <= last_slot {
            let child2 = child + 1; // might also be invalid
            if child2 <= last_slot && self.weights[child2] < self.weights[child] {
                // switch to the other child if it's both valid and smaller
                child = child2;
            }

            if self.weights[slot] <= self.weights[child] {
                // invariant holds so we're done
                break;
            }

            self.swap_slots(slot, child);
            slot = child;
            child = 2 * slot + 1;
        }
    }

    fn sift_up(&mut self, slot_in: usize) {
        let mut slot = slot_in;
        while slot > 0 {
            let parent = (slot - 1) / 2;
            if self.weights[parent] <= self.weights[slot] {
                break;
            }
            self.swap_slots(slot, parent);
            slot = parent;
        }
    }

    fn push(&mut self, item: T, weight: f64) {
        self.data[self.h] = Some(item);
        self.weights[self.h] = weight;
        self.h += 1;

        self.sift_up(self.h - 1);
    }

    fn peek_min(&self) -> f64 {
        debug_assert!(self.h > 0);
        self.weights[0]
    }

    fn pop_min_to_m_region(&mut self) {
        debug_assert!(self.h > 0);
        debug_assert_eq!(self.h + self.m + self.r, self.k + 1);

        if self.h == 1 {
            // the lone heap item is already adjacent to M, so only the
            // bookkeeping moves
            self.h -= 1;
            self.m += 1;
        } else {
            let tgt = self.h - 1; // last heap slot, will swap with the root
            self.swap_slots(0, tgt);
            self.h -= 1;
            self.m += 1;

            self.sift_down(0);
        }
    }

    /* On entry the new item has been placed in either H or M, the buffer is
    completely full, and the candidate set (M plus R, right-justified, at
    least 2 items) is a valid but not necessarily maximal sampling plan. Grow
    the candidate set as much as possible by pulling strictly light items out
    of the heap. */
    fn grow_candidate_set(&mut self, mut wt_cands: f64, mut num_cands: usize) {
        debug_assert_eq!(self.h + self.m + self.r, self.k + 1);
        debug_assert!(num_cands >= 2);
        debug_assert_eq!(num_cands, self.m + self.r);
        debug_assert!(self.m <= 1);

        while self.h > 0 {
            let next_wt = self.peek_min();
            let next_tot_wt = wt_cands + next_wt;

            // strict lightness of the next prospect against the provisional
            // new tau, with the denominator multiplied through
            if next_wt * (num_cands as f64) < next_tot_wt {
                wt_cands = next_tot_wt;
                num_cands += 1;
                self.pop_min_to_m_region();
            } else {
                break;
            }
        }

        self.downsample_candidate_set(wt_cands, num_cands);
    }

    fn pick_random_slot_in_r(&mut self) -> usize {
        debug_assert!(self.r > 0);
        let offset = self.h + self.m;
        if self.r == 1 {
            offset
        } else {
            offset + self.rng.next_index(self.r)
        }
    }

    fn choose_delete_slot(&mut self, wt_cand: f64, num_cand: usize) -> usize {
        debug_assert!(self.r > 0);

        if self.m == 0 {
            // a really heavy item landed; nothing was pulled from the heap
            #[cfg(feature = "case-profiling")]
            {
                self.case_counts.heavy_no_middle += 1;
            }
            self.pick_random_slot_in_r()
        } else if self.m == 1 {
            // keep the M item with probability (num_cand - 1) * wt_m / wt_cand
            let wt_m_cand = self.weights[self.h]; // slot of the item in M
            if wt_cand * self.rng.next_f64_exclude_zero() < (num_cand - 1) as f64 * wt_m_cand {
                #[cfg(feature = "case-profiling")]
                {
                    self.case_counts.keep_middle += 1;
                }
                self.pick_random_slot_in_r()
            } else {
                #[cfg(feature = "case-profiling")]
                {
                    self.case_counts.delete_middle += 1;
                }
                self.h
            }
        } else {
            // general case
            let delete_slot = self.choose_weighted_delete_slot(wt_cand, num_cand);
            let first_r_slot = self.h + self.m;
            if delete_slot == first_r_slot {
                #[cfg(feature = "case-profiling")]
                {
                    self.case_counts.scan_hit_reservoir += 1;
                }
                self.pick_random_slot_in_r()
            } else {
                #[cfg(feature = "case-profiling")]
                {
                    self.case_counts.scan_hit_middle += 1;
                }
                delete_slot
            }
        }
    }

    fn choose_weighted_delete_slot(&mut self, wt_cand: f64, num_cand: usize) -> usize {
        debug_assert!(self.m >= 1);

        let offset = self.h;
        let final_m = offset + self.m - 1;
        let num_to_keep = num_cand - 1;

        let mut left_subtotal = 0.0;
        let mut right_subtotal = -wt_cand * self.rng.next_f64_exclude_zero();

        for i in offset..=final_m {
            left_subtotal += num_to_keep as f64 * self.weights[i];
            right_subtotal += wt_cand;

            if left_subtotal < right_subtotal {
                return i;
            }
        }

        // the virtual slot just past M tells the caller to delete out of R
        final_m + 1
    }

    fn downsample_candidate_set(&mut self, wt_cands: f64, num_cands: usize) {
        debug_assert!(num_cands >= 2);
        debug_assert_eq!(self.h + num_cands, self.k + 1);

        // must happen before any weights are overwritten
        let delete_slot = self.choose_delete_slot(wt_cands, num_cands);
        let leftmost_cand_slot = self.h;
        debug_assert!(delete_slot >= leftmost_cand_slot && delete_slot <= self.k);

        // overwrite weights of items moving from M into R so stale reads are
        // obvious
        for j in leftmost_cand_slot..leftmost_cand_slot + self.m {
            self.weights[j] = -1.0;
        }

        // the leftmost candidate moves into the vacated slot; when the two
        // coincide the item itself is the one being dropped
        let survivor = self.data[leftmost_cand_slot].take();
        if delete_slot != leftmost_cand_slot {
            self.data[delete_slot] = survivor;
        }

        self.m = 0;
        self.r = num_cands - 1;
        self.total_wt_r = wt_cands;
    }

    /* swap values of data and weights between src and dst */
    fn swap_slots(&mut self, src: usize, dst: usize) {
        self.data.swap(src, dst);
        self.weights.swap(src, dst);
    }

    #[cfg(test)]
    fn validate_heap(&self) {
        for j in 1..self.h {
            let p = (j - 1) / 2;
            assert!(
                self.weights[p] <= self.weights[j],
                "heap violated at slot {j}"
            );
        }
    }

    #[cfg(test)]
    fn validate_regions(&self) {
        assert_eq!(self.m, 0);
        if self.r == 0 {
            assert!(self.h <= self.k);
            assert_eq!(self.total_wt_r, 0.0);
        } else {
            assert_eq!(self.h + self.r, self.k);
            assert!(self.total_wt_r > 0.0);
            // the slot vacated by downsampling stays empty between updates
            assert!(self.data[self.h].is_none());
        }
    }
}

impl<T: Clone> VarOptItemsSketch<T> {
    /// Returns a snapshot of the current samples, or `None` if the sketch is
    /// empty.
    ///
    /// Items appear H region first (heap slot order), then the R region; an
    /// underfull sketch reports its items in insertion order with their
    /// original weights.
    pub fn samples(&self) -> Option<VarOptSamples<T>> {
        if self.h == 0 && self.r == 0 {
            return None;
        }

        let n = self.num_samples();
        let mut items = Vec::with_capacity(n);
        let mut weights = Vec::with_capacity(n);

        for i in 0..self.h {
            items.push(self.cloned_item(i));
            weights.push(self.weights[i]);
        }
        if self.r > 0 {
            let r_weight = self.total_wt_r / self.r as f64;
            for i in (self.h + 1)..=self.k {
                items.push(self.cloned_item(i));
                weights.push(r_weight);
            }
        }

        Some(VarOptSamples { items, weights })
    }

    /// Serializes this sketch into a byte vector using the provided item
    /// serializer.
    ///
    /// The layout is described in [`serialization`](super::serialization).
    pub fn serialize_with<S: ItemsSerde<T>>(&self, serde: &S) -> Vec<u8> {
        let empty = self.is_empty();
        let pre_longs = if empty {
            PREAMBLE_LONGS_EMPTY
        } else if self.r == 0 {
            PREAMBLE_LONGS_WARMUP
        } else {
            PREAMBLE_LONGS_FULL
        };

        let mut out = SketchBytes::with_capacity(PREAMBLE_BYTES_FULL + self.h * 8);
        out.write_u8(pre_longs);
        out.write_u8(self.rf.lg());
        out.write_u8(SER_VER);
        out.write_u8(Family::VAROPT.id);
        out.write_u8(if empty { EMPTY_FLAG_MASK } else { 0 });
        out.write(&[0u8; 3]);
        out.write_u32_le(self.k as u32);

        if empty {
            // pad the trailing int so the image stays long-aligned
            out.write_u32_le(0);
            return out.into_bytes();
        }

        out.write_u32_le(self.h as u32);
        out.write_u32_le(self.r as u32);
        out.write_u32_le(0); // reserved
        if self.r > 0 {
            out.write_f64_le(self.total_wt_r);
        }

        // explicit weights of the H region, in heap slot order
        for i in 0..self.h {
            out.write_f64_le(self.weights[i]);
        }

        // items: H region in heap slot order, then R region in slot order
        let mut items = Vec::with_capacity(self.num_samples());
        for i in 0..self.h {
            items.push(self.cloned_item(i));
        }
        if self.r > 0 {
            for i in (self.h + 1)..=self.k {
                items.push(self.cloned_item(i));
            }
        }
        out.write(&serde.serialize_items(&items));
        out.into_bytes()
    }

    fn cloned_item(&self, slot: usize) -> T {
        self.data[slot]
            .as_ref()
            .expect("live region slot is occupied")
            .clone()
    }
}

impl<T> VarOptItemsSketch<T> {
    /// Deserializes a sketch from bytes using the provided item serializer.
    ///
    /// Fails with [`ErrorKind::Corruption`](crate::error::ErrorKind) if the
    /// image violates the layout, or
    /// [`ErrorKind::UnsupportedVersion`](crate::error::ErrorKind) if it was
    /// written by an unknown serialization version.
    pub fn deserialize_with<S: ItemsSerde<T>>(bytes: &[u8], serde: &S) -> Result<Self, Error> {
        let mut input = SketchSlice::new(bytes);

        let pre_longs = read_preamble_byte(&mut input)?;
        let rf_lg = read_preamble_byte(&mut input)?;
        let ser_ver = read_preamble_byte(&mut input)?;
        let family_id = read_preamble_byte(&mut input)?;
        let flags = read_preamble_byte(&mut input)?;
        input.skip(3);

        if ser_ver != SER_VER {
            return Err(Error::unsupported_version(SER_VER, ser_ver));
        }
        Family::VAROPT.validate_id(family_id)?;
        if pre_longs < Family::VAROPT.min_pre_longs || pre_longs > Family::VAROPT.max_pre_longs {
            return Err(Error::corruption("preamble longs out of range")
                .with_context("min", Family::VAROPT.min_pre_longs)
                .with_context("max", Family::VAROPT.max_pre_longs)
                .with_context("found", pre_longs));
        }
        let rf = ResizeFactor::from_lg(rf_lg)?;

        let k = read_preamble_u32(&mut input)? as usize;
        if k < 2 {
            return Err(Error::corruption("k below the sketch minimum").with_context("k", k));
        }

        let is_empty = (flags & EMPTY_FLAG_MASK) != 0;
        if is_empty != (pre_longs == PREAMBLE_LONGS_EMPTY) {
            return Err(Error::corruption("empty flag disagrees with preamble longs")
                .with_context("flags", flags)
                .with_context("pre_longs", pre_longs));
        }
        if is_empty {
            return Self::build(k as u32, rf, XorShift64::default());
        }

        let h_count = read_preamble_u32(&mut input)? as usize;
        let r_count = read_preamble_u32(&mut input)? as usize;
        let _reserved = read_preamble_u32(&mut input)?;

        if pre_longs == PREAMBLE_LONGS_WARMUP {
            if r_count != 0 {
                return Err(Error::corruption("2 preamble longs but items in R region")
                    .with_context("r_count", r_count));
            }
            if h_count == 0 || h_count > k {
                return Err(Error::corruption("warmup item count out of range")
                    .with_context("h_count", h_count)
                    .with_context("k", k));
            }
        } else {
            if r_count == 0 {
                return Err(Error::corruption("3 preamble longs but no items in R region"));
            }
            if h_count + r_count != k {
                return Err(Error::corruption("H and R counts do not partition k")
                    .with_context("h_count", h_count)
                    .with_context("r_count", r_count)
                    .with_context("k", k));
            }
        }

        let total_wt_r = if pre_longs == PREAMBLE_LONGS_FULL {
            let wt = input
                .read_f64_le()
                .map_err(|e| Error::corruption("truncated preamble").set_source(e))?;
            if !wt.is_finite() || wt <= 0.0 {
                return Err(
                    Error::corruption("total R weight must be positive").with_context("weight", wt)
                );
            }
            wt
        } else {
            0.0
        };

        let mut h_weights = Vec::with_capacity(h_count);
        for _ in 0..h_count {
            let wt = input
                .read_f64_le()
                .map_err(|e| Error::corruption("truncated weight array").set_source(e))?;
            if !wt.is_finite() || wt <= 0.0 {
                return Err(
                    Error::corruption("stored weight must be positive").with_context("weight", wt)
                );
            }
            h_weights.push(wt);
        }

        let num_items = h_count + r_count;
        let (items, _consumed) = serde.deserialize_items(input.remaining(), num_items)?;
        if items.len() != num_items {
            return Err(Error::corruption("item count mismatch during deserialization")
                .with_context("expected", num_items)
                .with_context("found", items.len()));
        }

        // An underfull warmup buffer restarts partway up the growth
        // staircase; a sampling-mode buffer is always fully grown.
        let curr_items_alloc = if r_count == 0 && h_count < k {
            let ceiling_lg_k = to_lg(k.next_power_of_two());
            let min_lg = to_lg(h_count.next_power_of_two());
            let initial_lg =
                starting_sub_multiple(ceiling_lg_k, rf.lg(), min_lg.max(MIN_LG_ARR_ITEMS));
            let adjusted = get_adjusted_size(k, 1 << initial_lg);
            if adjusted == k {
                adjusted + 1
            } else {
                adjusted
            }
        } else {
            k + 1
        };

        let mut data: Vec<Option<T>> = (0..curr_items_alloc).map(|_| None).collect();
        let mut weights = vec![-1.0; curr_items_alloc];
        let mut items = items.into_iter();
        for (slot, wt) in h_weights.iter().enumerate() {
            data[slot] = items.next();
            weights[slot] = *wt;
        }
        if r_count > 0 {
            // restore the at-rest layout: a vacant slot at h, R items after it
            for slot in (h_count + 1)..=k {
                data[slot] = items.next();
            }
        }

        Ok(Self {
            k,
            curr_items_alloc,
            rf,
            data,
            weights,
            h: h_count,
            m: 0,
            r: r_count,
            total_wt_r,
            rng: XorShift64::default(),
            #[cfg(feature = "case-profiling")]
            case_counts: DeleteCaseCounts::default(),
        })
    }
}

fn read_preamble_byte(input: &mut SketchSlice<'_>) -> Result<u8, Error> {
    input
        .read_u8()
        .map_err(|e| Error::corruption("truncated preamble").set_source(e))
}

fn read_preamble_u32(input: &mut SketchSlice<'_>) -> Result<u32, Error> {
    input
        .read_u32_le()
        .map_err(|e| Error::corruption("truncated preamble").set_source(e))
}

impl<T> fmt::Display for VarOptItemsSketch<T> {
    /// Human-readable summary of the sketch, without data.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "### VarOptItemsSketch SUMMARY:")?;
        writeln!(f, "   k            : {}", self.k)?;
        writeln!(f, "   h            : {}", self.h)?;
        writeln!(f, "   r            : {}", self.r)?;
        writeln!(f, "   weight_r     : {}", self.total_wt_r)?;
        writeln!(f, "   Current size : {}", self.curr_items_alloc)?;
        writeln!(f, "   Resize factor: {:?}", self.rf)?;
        writeln!(f, "### END SKETCH SUMMARY")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unweighted_sketch(k: u32, n: u64) -> VarOptItemsSketch<u64> {
        let mut sketch = VarOptItemsSketch::with_seed(k, 0xc0ffee).unwrap();
        for i in 0..n {
            sketch.update(i, 1.0).unwrap();
        }
        sketch
    }

    #[test]
    fn test_invalid_k() {
        assert!(VarOptItemsSketch::<u64>::new(0).is_err());
        assert!(VarOptItemsSketch::<u64>::new(1).is_err());
        assert!(VarOptItemsSketch::<u64>::new(2).is_ok());
    }

    #[test]
    fn test_warmup_keeps_exact_state() {
        let sketch = unweighted_sketch(10, 5);
        assert_eq!(sketch.h, 5);
        assert_eq!(sketch.m, 0);
        assert_eq!(sketch.r, 0);
        assert_eq!(sketch.num_samples(), 5);
        assert_eq!(sketch.total_wt_r, 0.0);
    }

    #[test]
    fn test_transition_from_warmup() {
        let k = 8;
        let sketch = unweighted_sketch(k, u64::from(k) + 1);

        // with equal weights every item is light, so the candidate set grows
        // to the whole buffer and the heap drains completely
        assert_eq!(sketch.h, 0);
        assert_eq!(sketch.m, 0);
        assert_eq!(sketch.r, k as usize);
        assert!((sketch.total_wt_r - (k as f64 + 1.0)).abs() < 1e-12);
        sketch.validate_regions();
    }

    #[test]
    fn test_invariants_across_mixed_updates() {
        let mut sketch = VarOptItemsSketch::with_seed(32, 99).unwrap();
        let mut rng = XorShift64::seeded(123);
        for i in 0..1000u64 {
            let weight = (5.0 * rng.next_gaussian()).exp();
            sketch.update(i, weight).unwrap();
            sketch.validate_heap();
            sketch.validate_regions();
        }
    }

    #[test]
    fn test_heavy_items_enter_heap() {
        let mut sketch = unweighted_sketch(32, 32);
        sketch.update(100, 100.0).unwrap();
        sketch.update(101, 101.0).unwrap();

        assert_eq!(sketch.h, 2);
        assert_eq!(sketch.r, 30);
        assert_eq!(sketch.weights[0], 100.0);
        assert_eq!(sketch.weights[1], 101.0);
        sketch.validate_heap();
        sketch.validate_regions();
    }

    #[test]
    fn test_allocation_staircase() {
        let mut sketch = VarOptItemsSketch::<u64>::with_resize_factor(100, ResizeFactor::X2)
            .unwrap();
        assert_eq!(sketch.curr_items_alloc, 16);
        for i in 0..100u64 {
            sketch.update(i, 1.0).unwrap();
        }
        // 16 -> 32 -> 64 -> clamped to k, then the spare update slot
        assert_eq!(sketch.curr_items_alloc, 101);
        assert_eq!(sketch.num_samples(), 100);
    }

    #[test]
    fn test_single_allocation_with_x1() {
        let sketch = VarOptItemsSketch::<u64>::with_resize_factor(100, ResizeFactor::X1).unwrap();
        assert_eq!(sketch.curr_items_alloc, 101);
    }

    #[test]
    fn test_update_failure_leaves_state_unchanged() {
        let mut sketch = unweighted_sketch(8, 20);
        let before = sketch.samples().unwrap();
        assert!(sketch.update(999, 0.0).is_err());
        assert!(sketch.update(999, -3.0).is_err());
        assert!(sketch.update(999, f64::NAN).is_err());
        assert!(sketch.update(999, f64::INFINITY).is_err());
        assert_eq!(sketch.samples().unwrap(), before);
    }

    #[test]
    fn test_weight_sum_is_conserved() {
        let mut sketch = VarOptItemsSketch::with_seed(64, 7).unwrap();
        let mut rng = XorShift64::seeded(8);
        let mut input_sum = 0.0;
        for i in 0..2000u64 {
            let weight = (2.0 * rng.next_gaussian()).exp();
            input_sum += weight;
            sketch.update(i, weight).unwrap();
        }
        let output_sum: f64 = sketch.samples().unwrap().weights().iter().sum();
        assert!((output_sum / input_sum - 1.0).abs() < 1e-10);
    }

    #[cfg(feature = "case-profiling")]
    #[test]
    fn test_delete_case_counts_accumulate() {
        let mut sketch = unweighted_sketch(16, 16);
        assert_eq!(sketch.delete_case_counts(), DeleteCaseCounts::default());
        for i in 0..100u64 {
            sketch.update(i, 1.0 + (i % 7) as f64).unwrap();
        }
        let counts = sketch.delete_case_counts();
        let total = counts.heavy_no_middle
            + counts.keep_middle
            + counts.delete_middle
            + counts.scan_hit_reservoir
            + counts.scan_hit_middle;
        assert_eq!(total, 100);
    }
}
